//! The transport seam: how raw resource bytes are obtained.
//!
//! The cache core never performs I/O itself; it hands keys to a
//! [`TileTransport`] on worker threads. Network and disk-cache
//! implementations live outside this crate; [`MemoryTransport`] serves
//! tests and the demo app.

use std::sync::Mutex;

use dashmap::DashMap;

/// Errors a transport may report for a single key.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The key is known to not exist; the resource becomes `Invalid`.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// I/O failure; also treated as a permanent absence by the cache
    /// (retry policy, if any, belongs to the transport itself).
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport failure: {0}")]
    Other(String),
}

/// Blocking byte fetch, invoked only from cache worker threads.
pub trait TileTransport: Send + Sync {
    fn fetch(&self, key: &str) -> Result<Vec<u8>, TransportError>;
}

/// In-memory transport backed by a key/value table.
///
/// Records every fetched key, which lets tests assert which requests
/// the traversal actually issued.
#[derive(Default)]
pub struct MemoryTransport {
    entries: DashMap<String, Vec<u8>>,
    log: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(key.into(), bytes);
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Look up a stored entry without recording a request.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).map(|bytes| bytes.clone())
    }

    /// Keys fetched so far, in order.
    pub fn request_log(&self) -> Vec<String> {
        self.log.lock().expect("transport log poisoned").clone()
    }

    pub fn request_count(&self) -> usize {
        self.log.lock().expect("transport log poisoned").len()
    }
}

impl TileTransport for MemoryTransport {
    fn fetch(&self, key: &str) -> Result<Vec<u8>, TransportError> {
        self.log
            .lock()
            .expect("transport log poisoned")
            .push(key.to_string());
        match self.entries.get(key) {
            Some(bytes) => Ok(bytes.clone()),
            None => Err(TransportError::NotFound(key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_transport_round_trip() {
        let t = MemoryTransport::new();
        t.insert("a", vec![1, 2, 3]);
        assert_eq!(t.fetch("a").unwrap(), vec![1, 2, 3]);
        assert!(matches!(t.fetch("b"), Err(TransportError::NotFound(_))));
        assert_eq!(t.request_log(), ["a", "b"]);
    }
}
