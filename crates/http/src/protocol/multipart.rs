//! `multipart/form-data` bodies.

use crate::ensure;
use crate::protocol::{Args, ParseError};
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const MAX_PART_HEADERS: usize = 16;

/// A file part of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormFile {
    pub field_name: String,
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// A parsed `multipart/form-data` body: plain values plus file parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartForm {
    values: Args,
    files: Vec<FormFile>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, name: &str) -> Option<&[u8]> {
        self.values.peek(name.as_bytes())
    }

    pub fn values(&self) -> &Args {
        &self.values
    }

    pub fn add_value(&mut self, name: &str, value: impl AsRef<[u8]>) {
        self.values.add(name.as_bytes(), value.as_ref());
    }

    pub fn file(&self, field_name: &str) -> Option<&FormFile> {
        self.files.iter().find(|f| f.field_name == field_name)
    }

    pub fn files(&self) -> &[FormFile] {
        &self.files
    }

    pub fn add_file(&mut self, file: FormFile) {
        self.files.push(file);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.files.is_empty()
    }

    /// Parses `body` split by `boundary`. The body is shared, file data is sliced from it.
    pub fn parse(body: &Bytes, boundary: &str) -> Result<Self, ParseError> {
        ensure!(!boundary.is_empty(), ParseError::invalid_multipart("empty boundary"));
        let delimiter = format!("--{boundary}").into_bytes();
        let mut close_delimiter = b"\r\n".to_vec();
        close_delimiter.extend_from_slice(&delimiter);

        let mut form = MultipartForm::new();
        let start = find(body, &delimiter).ok_or_else(|| ParseError::invalid_multipart("missing first boundary"))?;
        let mut pos = start + delimiter.len();

        loop {
            let rest = &body[pos..];
            if rest.starts_with(b"--") {
                return Ok(form);
            }
            ensure!(rest.starts_with(b"\r\n"), ParseError::invalid_multipart("boundary not followed by CRLF"));
            pos += 2;

            let mut headers = [httparse::EMPTY_HEADER; MAX_PART_HEADERS];
            let (header_len, parsed) = match httparse::parse_headers(&body[pos..], &mut headers) {
                Ok(httparse::Status::Complete(complete)) => complete,
                Ok(httparse::Status::Partial) => return Err(ParseError::invalid_multipart("incomplete part header")),
                Err(e) => return Err(ParseError::invalid_multipart(e)),
            };

            let mut disposition = None;
            let mut content_type = "application/octet-stream".to_string();
            for h in parsed.iter() {
                if h.name.eq_ignore_ascii_case("content-disposition") {
                    disposition = Some(parse_disposition(h.value)?);
                } else if h.name.eq_ignore_ascii_case("content-type") {
                    content_type = String::from_utf8_lossy(h.value).into_owned();
                }
            }
            let (name, file_name) =
                disposition.ok_or_else(|| ParseError::invalid_multipart("part without content-disposition"))?;
            pos += header_len;

            let end = find(&body[pos..], &close_delimiter)
                .ok_or_else(|| ParseError::invalid_multipart("part without closing boundary"))?;
            let data = body.slice(pos..pos + end);
            pos += end + close_delimiter.len();

            match file_name {
                Some(file_name) => form.files.push(FormFile { field_name: name, file_name, content_type, data }),
                None => form.values.add(name.as_bytes(), &data),
            }
        }
    }

    /// Serializes the form with `boundary`, values first, then files.
    pub fn write(&self, boundary: &str, dst: &mut BytesMut) {
        for (name, value) in self.values.iter() {
            put_delimiter(dst, boundary);
            dst.put_slice(b"Content-Disposition: form-data; name=\"");
            dst.put_slice(&escape_quotes(name));
            dst.put_slice(b"\"\r\n\r\n");
            dst.put_slice(value);
            dst.put_slice(b"\r\n");
        }
        for file in &self.files {
            put_delimiter(dst, boundary);
            dst.put_slice(b"Content-Disposition: form-data; name=\"");
            dst.put_slice(&escape_quotes(file.field_name.as_bytes()));
            dst.put_slice(b"\"; filename=\"");
            dst.put_slice(&escape_quotes(file.file_name.as_bytes()));
            dst.put_slice(b"\"\r\nContent-Type: ");
            dst.put_slice(file.content_type.as_bytes());
            dst.put_slice(b"\r\n\r\n");
            dst.put_slice(&file.data);
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"--");
        dst.put_slice(boundary.as_bytes());
        dst.put_slice(b"--\r\n");
    }
}

/// A boundary unlikely to collide with form content.
pub(crate) fn generate_boundary() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.subsec_nanos());
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("----MicroWireFormBoundary{nanos:08x}{seq:08x}")
}

fn put_delimiter(dst: &mut BytesMut, boundary: &str) {
    dst.put_slice(b"--");
    dst.put_slice(boundary.as_bytes());
    dst.put_slice(b"\r\n");
}

fn escape_quotes(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    for &b in src {
        match b {
            b'"' => out.extend_from_slice(b"%22"),
            b'\r' => out.extend_from_slice(b"%0D"),
            b'\n' => out.extend_from_slice(b"%0A"),
            b => out.push(b),
        }
    }
    out
}

/// Returns the `name` and the optional `filename` of a `form-data` disposition.
fn parse_disposition(value: &[u8]) -> Result<(String, Option<String>), ParseError> {
    let value = std::str::from_utf8(value).map_err(ParseError::invalid_multipart)?;
    let mut parts = value.split(';').map(str::trim);
    let kind = parts.next().unwrap_or_default();
    ensure!(kind.eq_ignore_ascii_case("form-data"), ParseError::invalid_multipart(format!("unexpected disposition {kind}")));

    let mut name = None;
    let mut file_name = None;
    for param in parts {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let unquoted = raw.trim().trim_matches('"').to_string();
        match key.trim() {
            k if k.eq_ignore_ascii_case("name") => name = Some(unquoted),
            k if k.eq_ignore_ascii_case("filename") => file_name = Some(unquoted),
            _ => {}
        }
    }
    let name = name.ok_or_else(|| ParseError::invalid_multipart("form-data part without name"))?;
    Ok((name, file_name))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn parse_values_and_files() {
        let body = indoc! {r#"
            preamble
            --xyz
            Content-Disposition: form-data; name="user"

            alice
            --xyz
            Content-Disposition: form-data; name="avatar"; filename="a.png"
            Content-Type: image/png

            PNGDATA
            --xyz--
        "#}
        .replace('\n', "\r\n");

        let form = MultipartForm::parse(&Bytes::from(body), "xyz").unwrap();
        assert_eq!(form.value("user"), Some(&b"alice"[..]));
        let file = form.file("avatar").unwrap();
        assert_eq!(file.file_name, "a.png");
        assert_eq!(file.content_type, "image/png");
        assert_eq!(&file.data[..], b"PNGDATA");
    }

    #[test]
    fn write_then_parse() {
        let mut form = MultipartForm::new();
        form.add_value("a", "1");
        form.add_value("b", "two\r\nlines");
        form.add_file(FormFile {
            field_name: "doc".into(),
            file_name: "doc.txt".into(),
            content_type: "text/plain".into(),
            data: Bytes::from_static(b"contents"),
        });

        let boundary = generate_boundary();
        let mut dst = BytesMut::new();
        form.write(&boundary, &mut dst);

        let parsed = MultipartForm::parse(&dst.freeze(), &boundary).unwrap();
        assert_eq!(parsed, form);
    }

    #[test]
    fn reject_broken_bodies() {
        assert!(MultipartForm::parse(&Bytes::from_static(b"no boundary here"), "xyz").is_err());
        let unterminated = Bytes::from_static(b"--xyz\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nvalue");
        assert!(MultipartForm::parse(&unterminated, "xyz").is_err());
        let no_name = Bytes::from_static(b"--xyz\r\nContent-Disposition: form-data\r\n\r\nv\r\n--xyz--\r\n");
        assert!(MultipartForm::parse(&no_name, "xyz").is_err());
    }

    #[test]
    fn boundaries_differ() {
        assert_ne!(generate_boundary(), generate_boundary());
    }
}
