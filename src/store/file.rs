//! File-backed storage for host (development) builds.
//!
//! Keeps one file per key under `~/.blynk-board/` by default, so a host board
//! keeps its provisioning across runs.

use super::backend::{Storage, StorageError};
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Get the default storage directory.
///
/// Returns `$BLYNK_BOARD_DIR` if set, otherwise `~/.blynk-board`.
pub fn default_storage_dir() -> io::Result<PathBuf> {
    if let Ok(dir) = std::env::var("BLYNK_BOARD_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home).join(".blynk-board"))
}

/// One file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", key))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No file for key '{}' in {:?}", key, self.dir);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ConfigStore, ProvisioningRecord};
    use std::env;
    use std::sync::atomic::{AtomicU32, Ordering};

    // Counter to ensure unique test directories even in parallel execution
    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        env::temp_dir().join(format!("blynk-board-test-{}-{}", pid, id))
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = unique_dir();
        let mut storage = FileStorage::new(&dir).expect("Failed to create dir");

        assert_eq!(storage.read("key").unwrap(), None);
        storage.write("key", b"hello").unwrap();
        assert_eq!(storage.read("key").unwrap(), Some(b"hello".to_vec()));

        storage.remove("key").unwrap();
        assert_eq!(storage.read("key").unwrap(), None);
        storage.remove("key").unwrap();

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_store_survives_restart() {
        let dir = unique_dir();

        let mut record = ProvisioningRecord::default();
        record.wifi_ssid = "HostNet".into();
        record.ssid_suffix_generated = true;
        record.ssid_suffix = [1, 2, 3, 4];

        {
            let storage = FileStorage::new(&dir).unwrap();
            let mut store = ConfigStore::new(Box::new(storage));
            store.save(&record).expect("Failed to save");
        }

        let storage = FileStorage::new(&dir).unwrap();
        let mut store = ConfigStore::new(Box::new(storage));
        let loaded = store.load();
        assert_eq!(loaded, record);

        let _ = fs::remove_dir_all(&dir);
    }
}
