//! DNS-SD TXT record decoding and encoding.
//!
//! Wire format: a sequence of `[len: 1 byte][entry: len bytes]`, where each
//! entry is `key=value` or a bare `key` (RFC 6763 section 6).

use crate::error::TxtError;
use std::collections::HashMap;

/// A validated, borrowed TXT record.
#[derive(Debug, Clone, Copy)]
pub struct TxtRecord<'a> {
    data: &'a [u8],
}

impl<'a> TxtRecord<'a> {
    /// Open `data` as a TXT record.
    ///
    /// Every length prefix must fit in the buffer and every non-empty entry
    /// must start with a non-empty UTF-8 key.
    pub fn parse(data: &'a [u8]) -> Result<Self, TxtError> {
        let mut i = 0;

        while i < data.len() {
            let len = data[i] as usize;
            let start = i + 1;
            let remaining = data.len() - start;

            if len > remaining {
                return Err(TxtError::Truncated {
                    offset: i,
                    len,
                    remaining,
                });
            }

            if len > 0 {
                let entry = &data[start..start + len];
                let key = split_entry(entry).0;
                if key.is_empty() {
                    return Err(TxtError::EmptyKey { offset: i });
                }
                if std::str::from_utf8(key).is_err() {
                    return Err(TxtError::InvalidKey { offset: i });
                }
            }

            i = start + len;
        }

        Ok(Self { data })
    }

    /// Iterate over `(key, value)` pairs in wire order.
    ///
    /// Each call starts from the beginning of the record.
    pub fn iter(&self) -> TxtIter<'a> {
        TxtIter {
            data: self.data,
            pos: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Collapse into a map; the last occurrence of a key wins.
    pub fn to_map(&self) -> HashMap<&'a str, &'a [u8]> {
        self.iter().collect()
    }
}

impl<'a> IntoIterator for &TxtRecord<'a> {
    type Item = (&'a str, &'a [u8]);
    type IntoIter = TxtIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the entries of a [`TxtRecord`].
#[derive(Debug, Clone)]
pub struct TxtIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for TxtIter<'a> {
    type Item = (&'a str, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.data.len() {
            let len = self.data[self.pos] as usize;
            let start = self.pos + 1;
            // Bounds were checked in TxtRecord::parse.
            let entry = self.data.get(start..start + len)?;
            self.pos = start + len;

            if entry.is_empty() {
                continue;
            }

            let (key, value) = split_entry(entry);
            let key = std::str::from_utf8(key).ok()?;
            return Some((key, value));
        }

        None
    }
}

fn split_entry(entry: &[u8]) -> (&[u8], &[u8]) {
    match entry.iter().position(|&b| b == b'=') {
        Some(eq) => (&entry[..eq], &entry[eq + 1..]),
        None => (entry, &[]),
    }
}

/// Encoder for TXT records.
#[derive(Debug, Clone, Default)]
pub struct TxtRecordBuilder {
    buf: Vec<u8>,
}

impl TxtRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `key=value` entry.
    pub fn entry(mut self, key: &str, value: impl AsRef<[u8]>) -> Result<Self, TxtError> {
        self.push(key, Some(value.as_ref()))?;
        Ok(self)
    }

    /// Append an entry; `None` writes a bare key.
    pub fn push(&mut self, key: &str, value: Option<&[u8]>) -> Result<(), TxtError> {
        if key.is_empty() {
            return Err(TxtError::EmptyKey {
                offset: self.buf.len(),
            });
        }

        let len = key.len() + value.map_or(0, |v| v.len() + 1);
        let len_byte = u8::try_from(len).map_err(|_| TxtError::EntryTooLong(len))?;

        self.buf.push(len_byte);
        self.buf.extend_from_slice(key.as_bytes());
        if let Some(value) = value {
            self.buf.push(b'=');
            self.buf.extend_from_slice(value);
        }
        Ok(())
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}
