//! Ordered key/value storage shared by headers, cookies, trailers and form arguments.
//!
//! [`Args`] keeps its entry storage across [`Args::reset`]: the logical length is truncated
//! while the backing byte vectors are kept, so a pooled message reuses the same allocations
//! for the next exchange.

use std::fmt;

#[derive(Clone, Default, PartialEq, Eq)]
pub(crate) struct Entry {
    key: Vec<u8>,
    value: Vec<u8>,
}

/// An ordered multimap of byte keys to byte values.
///
/// Keys may repeat. Lookups are exact unless the collection was built with
/// [`Args::ignore_case`], which is what header collections use.
#[derive(Clone, Default)]
pub struct Args {
    entries: Vec<Entry>,
    len: usize,
    ignore_case: bool,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collection whose key lookups are ASCII case-insensitive.
    pub fn ignore_case() -> Self {
        Self { ignore_case: true, ..Self::default() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Truncates the collection, keeping the allocated entries for reuse.
    pub fn reset(&mut self) {
        self.len = 0;
    }

    fn key_eq(&self, a: &[u8], b: &[u8]) -> bool {
        if self.ignore_case { a.eq_ignore_ascii_case(b) } else { a == b }
    }

    fn position(&self, key: &[u8]) -> Option<usize> {
        self.entries[..self.len].iter().position(|e| self.key_eq(&e.key, key))
    }

    /// Appends a new entry, keeping existing entries with the same key.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        if self.len < self.entries.len() {
            let entry = &mut self.entries[self.len];
            entry.key.clear();
            entry.key.extend_from_slice(key);
            entry.value.clear();
            entry.value.extend_from_slice(value);
        } else {
            self.entries.push(Entry { key: key.to_vec(), value: value.to_vec() });
        }
        self.len += 1;
    }

    /// Replaces the first entry with `key` and drops any later duplicates.
    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        match self.position(key) {
            Some(idx) => {
                let entry = &mut self.entries[idx];
                entry.value.clear();
                entry.value.extend_from_slice(value);
                self.del_from(key, idx + 1);
            }
            None => self.add(key, value),
        }
    }

    pub fn peek(&self, key: &[u8]) -> Option<&[u8]> {
        self.position(key).map(|idx| self.entries[idx].value.as_slice())
    }

    pub fn peek_all(&self, key: &[u8]) -> Vec<&[u8]> {
        self.iter().filter(|(k, _)| self.key_eq(k, key)).map(|(_, v)| v).collect()
    }

    pub fn has(&self, key: &[u8]) -> bool {
        self.position(key).is_some()
    }

    /// Removes every entry with `key`.
    pub fn del(&mut self, key: &[u8]) {
        self.del_from(key, 0);
    }

    fn del_from(&mut self, key: &[u8], start: usize) {
        let mut idx = start;
        while idx < self.len {
            if self.key_eq(&self.entries[idx].key, key) {
                // keep the removed entry's buffers past the logical end for reuse
                self.entries[idx..self.len].rotate_left(1);
                self.len -= 1;
            } else {
                idx += 1;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries[..self.len].iter().map(|e| (e.key.as_slice(), e.value.as_slice()))
    }

    pub fn visit_all<F>(&self, mut f: F)
    where
        F: FnMut(&[u8], &[u8]),
    {
        for (k, v) in self.iter() {
            f(k, v);
        }
    }

    /// Parses `application/x-www-form-urlencoded` bytes and appends every pair.
    pub fn parse_urlencoded(&mut self, src: &[u8]) -> Result<(), serde_urlencoded::de::Error> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(src)?;
        for (k, v) in &pairs {
            self.add(k.as_bytes(), v.as_bytes());
        }
        Ok(())
    }

    /// Serializes the collection as `application/x-www-form-urlencoded`.
    pub fn to_urlencoded(&self) -> Result<String, serde_urlencoded::ser::Error> {
        let pairs: Vec<(String, String)> = self
            .iter()
            .map(|(k, v)| (String::from_utf8_lossy(k).into_owned(), String::from_utf8_lossy(v).into_owned()))
            .collect();
        serde_urlencoded::to_string(pairs)
    }
}

impl PartialEq for Args {
    fn eq(&self, other: &Self) -> bool {
        self.ignore_case == other.ignore_case && self.entries[..self.len] == other.entries[..other.len]
    }
}

impl Eq for Args {}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(k, v)| (String::from_utf8_lossy(k), String::from_utf8_lossy(v))))
            .finish()
    }
}
