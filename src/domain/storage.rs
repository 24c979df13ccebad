//! In-memory key/value storage primitive.
//!
//! Per-partition serial execution already serialises operations on a single
//! key; the map only has to tolerate concurrent operations on distinct keys,
//! which `DashMap` gives us without a global lock.
//!
//! With the `compression-gzip` feature values are gzip-compressed at rest.
//! A value that cannot be recovered (absent key, codec failure) reads back as
//! the template value rather than failing the request.

use crate::shared::protocol::{Key, TEMPLATE_VALUE};
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct Storage {
    values: DashMap<Key, Vec<u8>>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored value, or the template value when the key is absent
    /// or the stored bytes cannot be decoded.
    pub fn read(&self, key: Key) -> String {
        match self.values.get(&key) {
            Some(entry) => decode(entry.value()).unwrap_or_else(|| TEMPLATE_VALUE.to_string()),
            None => TEMPLATE_VALUE.to_string(),
        }
    }

    /// Last writer wins.
    pub fn write(&self, key: Key, value: &str) {
        self.values.insert(key, encode(value));
    }

    /// Reads `length` values starting at `start`, walking key ids modulo the
    /// populated key count in ascending order. The modulo over the live size
    /// assumes keys are populated densely from 0.
    pub fn scan(&self, start: Key, length: usize) -> Vec<String> {
        let size = self.values.len();
        if size == 0 {
            return Vec::new();
        }
        (0..length)
            .map(|i| {
                let key = (start as i64 + i as i64).rem_euclid(size as i64) as Key;
                self.read(key)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(not(feature = "compression-gzip"))]
fn encode(value: &str) -> Vec<u8> {
    value.as_bytes().to_vec()
}

#[cfg(not(feature = "compression-gzip"))]
fn decode(bytes: &[u8]) -> Option<String> {
    String::from_utf8(bytes.to_vec()).ok()
}

#[cfg(feature = "compression-gzip")]
fn encode(value: &str) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    // Writing into a Vec cannot fail; fall back to raw bytes if it ever does.
    if encoder.write_all(value.as_bytes()).is_err() {
        return value.as_bytes().to_vec();
    }
    encoder.finish().unwrap_or_else(|_| value.as_bytes().to_vec())
}

#[cfg(feature = "compression-gzip")]
fn decode(bytes: &[u8]) -> Option<String> {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let mut decoder = GzDecoder::new(bytes);
    let mut value = String::new();
    decoder.read_to_string(&mut value).ok()?;
    Some(value)
}
