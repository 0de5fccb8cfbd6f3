//! Key/value storage backends.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Errors reported by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Host filesystem error.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Backend-specific failure (NVS error code, injected failure, ...).
    #[error("storage backend error: {0}")]
    Backend(String),
    /// Value does not fit the backend's per-key limit.
    #[error("value for key '{key}' too large: {len} bytes (max {max})")]
    TooLarge { key: String, len: usize, max: usize },
}

/// Durable key/value medium.
///
/// Writes are reported synchronously. Implementations are not assumed to
/// wear-level or to be transactional.
pub trait Storage {
    /// Read a value. `Ok(None)` when the key is absent.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write a value, replacing any previous one.
    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, Vec<u8>>,
    fail_writes: bool,
    truncate_next_write: Option<usize>,
    writes: usize,
}

/// In-memory storage.
///
/// Clones share the same contents, so a test can hand one clone to a store,
/// drop the store, and build a new one on another clone to simulate a reboot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }

    /// Keep only the first `len` bytes of the next write, simulating power loss
    /// in the middle of it.
    pub fn truncate_next_write(&self, len: usize) {
        self.inner.borrow_mut().truncate_next_write = Some(len);
    }

    /// Overwrite a raw value.
    pub fn insert_raw(&self, key: &str, bytes: &[u8]) {
        self.inner
            .borrow_mut()
            .values
            .insert(key.to_string(), bytes.to_vec());
    }

    /// Raw value for a key.
    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.borrow().values.get(key).cloned()
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.inner.borrow().writes
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.inner.borrow().values.get(key).cloned())
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_writes {
            return Err(StorageError::Backend(format!("write to '{}' failed", key)));
        }
        let stored = match inner.truncate_next_write.take() {
            Some(len) => bytes[..len.min(bytes.len())].to_vec(),
            None => bytes.to_vec(),
        };
        inner.values.insert(key.to_string(), stored);
        inner.writes += 1;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.inner.borrow_mut().values.remove(key);
        Ok(())
    }
}

impl Storage for Box<dyn Storage> {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        (**self).write(key, bytes)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_contents() {
        let mut a = MemoryStorage::new();
        let b = a.clone();
        a.write("key", b"value").unwrap();
        assert_eq!(b.read("key").unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn test_missing_key_reads_none() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.read("absent").unwrap(), None);
    }

    #[test]
    fn test_injected_write_failure() {
        let mut storage = MemoryStorage::new();
        storage.set_fail_writes(true);
        assert!(storage.write("key", b"x").is_err());
        assert_eq!(storage.read("key").unwrap(), None);

        storage.set_fail_writes(false);
        assert!(storage.write("key", b"x").is_ok());
        assert_eq!(storage.write_count(), 1);
    }

    #[test]
    fn test_truncated_write() {
        let mut storage = MemoryStorage::new();
        storage.truncate_next_write(2);
        storage.write("key", b"abcdef").unwrap();
        assert_eq!(storage.get_raw("key"), Some(b"ab".to_vec()));

        // Only the next write is affected
        storage.write("key", b"abcdef").unwrap();
        assert_eq!(storage.get_raw("key"), Some(b"abcdef".to_vec()));
    }

    #[test]
    fn test_remove_absent_key() {
        let mut storage = MemoryStorage::new();
        assert!(storage.remove("absent").is_ok());
    }
}
