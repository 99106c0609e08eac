//! Shared helpers for parsing header blocks with `httparse`.

use crate::ensure;
use crate::protocol::ParseError;
use serde::Deserialize;

/// Default upper bound of header bytes, request/status line included.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Default upper bound of header fields in one message.
pub const MAX_HEADER_NUM: usize = 64;

/// Size caps applied while parsing a header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HeaderLimits {
    pub max_header_bytes: usize,
    pub max_header_count: usize,
}

impl Default for HeaderLimits {
    fn default() -> Self {
        Self { max_header_bytes: MAX_HEADER_BYTES, max_header_count: MAX_HEADER_NUM }
    }
}

/// Returns the offset just past the blank line that terminates a header block.
///
/// Both `\r\n\r\n` and bare `\n\n` terminators are accepted.
pub(crate) fn find_headers_end(buf: &[u8]) -> Option<usize> {
    // an empty block, as seen in chunked trailers
    if buf.starts_with(b"\r\n") {
        return Some(2);
    }
    if buf.starts_with(b"\n") {
        return Some(1);
    }

    let mut i = 0;
    while let Some(pos) = memchr_newline(&buf[i..]) {
        let nl = i + pos;
        let next = nl + 1;
        if buf.get(next) == Some(&b'\n') {
            return Some(next + 1);
        }
        if buf.get(next) == Some(&b'\r') && buf.get(next + 1) == Some(&b'\n') {
            return Some(next + 2);
        }
        i = next;
    }
    None
}

#[inline]
fn memchr_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|b| *b == b'\n')
}

/// Enforces the byte limit on a block whose end has been located (`Some`) or is still
/// outstanding (`None`, the whole buffer counts).
pub(crate) fn check_header_size(end: Option<usize>, buffered: usize, limits: &HeaderLimits) -> Result<(), ParseError> {
    let size = end.unwrap_or(buffered);
    ensure!(size <= limits.max_header_bytes, ParseError::too_large_header(size, limits.max_header_bytes));
    Ok(())
}

/// Replaces obsolete line folding (a line starting with SP or HT continues the previous
/// field) with single spaces. Returns `None` when the block has no folded lines.
pub(crate) fn unfold(block: &[u8]) -> Option<Vec<u8>> {
    let has_fold = block.windows(2).enumerate().any(|(idx, w)| {
        // the first line can't be a continuation, and the blank terminator isn't one
        idx > 0 && w[0] == b'\n' && (w[1] == b' ' || w[1] == b'\t')
    });
    if !has_fold {
        return None;
    }

    let mut out = Vec::with_capacity(block.len());
    let mut i = 0;
    while i < block.len() {
        let b = block[i];
        if b == b'\r' || b == b'\n' {
            let nl_len = if b == b'\r' && block.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
            let after = i + nl_len;
            if matches!(block.get(after), Some(b' ' | b'\t')) {
                let mut j = after;
                while matches!(block.get(j), Some(b' ' | b'\t')) {
                    j += 1;
                }
                out.push(b' ');
                i = j;
                continue;
            }
            out.extend_from_slice(&block[i..after]);
            i = after;
            continue;
        }
        out.push(b);
        i += 1;
    }
    Some(out)
}

pub(crate) fn map_httparse_error(e: httparse::Error, limits: &HeaderLimits) -> ParseError {
    match e {
        httparse::Error::TooManyHeaders => ParseError::too_many_headers(limits.max_header_count),
        httparse::Error::Version => ParseError::InvalidVersion(None),
        httparse::Error::Token => ParseError::InvalidMethod,
        e => ParseError::invalid_header(e.to_string()),
    }
}

/// Parses a comma separated value list such as `Trailer: a, b`.
pub(crate) fn split_comma(value: &[u8]) -> impl Iterator<Item = &[u8]> {
    value.split(|b| *b == b',').map(<[u8]>::trim_ascii).filter(|s| !s.is_empty())
}

/// Whether `value` contains `token` as one of its comma separated elements.
pub(crate) fn has_token(value: &[u8], token: &[u8]) -> bool {
    split_comma(value).any(|t| t.eq_ignore_ascii_case(token))
}

/// Whether `chunked` is the final coding of a `Transfer-Encoding` value.
pub(crate) fn is_chunked(value: &[u8]) -> bool {
    value.rsplit(|b| *b == b',').next().is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}

/// Parses a decimal `Content-Length` value.
pub(crate) fn parse_content_length(value: &[u8]) -> Result<i64, ParseError> {
    let trimmed = value.trim_ascii();
    ensure!(
        !trimmed.is_empty() && trimmed.iter().all(u8::is_ascii_digit),
        ParseError::invalid_content_length(format!("value {} is not a number", String::from_utf8_lossy(value)))
    );
    std::str::from_utf8(trimmed)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ParseError::invalid_content_length("value overflows"))
}
