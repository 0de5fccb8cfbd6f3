//! Persisted configuration store.
//!
//! The [`ProvisioningRecord`] is kept in two slots (`record_a`, `record_b`).
//! A save always writes the slot that does not hold the current record, then
//! reads it back and verifies it before updating the one-byte `configured`
//! flag. Each slot is framed as:
//!
//! ```text
//! [magic:"BB"][seq:4 LE][len:2 LE][payload:len][digest:4]
//! ```
//!
//! where `digest` is the first four bytes of `SHA-256(seq || payload)`. On
//! load the valid slot with the highest sequence number wins, so power loss
//! in the middle of a save leaves the previous record in place.
//!
//! # Usage
//!
//! ```
//! use blynk_board_esp32::store::{ConfigStore, MemoryStorage};
//!
//! let mut store = ConfigStore::new(Box::new(MemoryStorage::new()));
//! assert!(!store.is_configured());
//!
//! let mut record = store.load();
//! record.wifi_ssid = "HomeNetwork".into();
//! store.save(&record).unwrap();
//! assert_eq!(store.load().wifi_ssid, "HomeNetwork");
//! ```

mod backend;
mod file;
#[cfg(feature = "esp32")]
mod nvs;
mod record;

pub use backend::{MemoryStorage, Storage, StorageError};
pub use file::{default_storage_dir, FileStorage};
#[cfg(feature = "esp32")]
pub use nvs::NvsStorage;
pub use record::{ProvisioningRecord, RecordError};

use log::{debug, error, info, warn};
use sha2::{Digest, Sha256};

/// One-byte flag read at boot before the full record.
pub const CONFIGURED_KEY: &str = "configured";

/// Double-buffer slot keys.
pub const SLOT_KEYS: [&str; 2] = ["record_a", "record_b"];

/// Largest framed record. NVS blobs on the board are read into a buffer of
/// this size.
pub const MAX_FRAME_LEN: usize = 256;

const FRAME_MAGIC: [u8; 2] = *b"BB";
const FRAME_HEADER_LEN: usize = 2 + 4 + 2;
const FRAME_DIGEST_LEN: usize = 4;

/// Errors saving the configuration.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage write failed: {0}")]
    Write(#[from] StorageError),
    #[error("verification failed for slot '{0}' after write")]
    Verify(&'static str),
    #[error("record too large: {0} bytes")]
    TooLarge(usize),
}

/// Durable provisioning state over a [`Storage`] backend.
pub struct ConfigStore {
    storage: Box<dyn Storage>,
    /// Slot index and sequence number of the current record.
    current: Option<(usize, u32)>,
}

impl ConfigStore {
    pub fn new(storage: Box<dyn Storage>) -> Self {
        Self {
            storage,
            current: None,
        }
    }

    /// Fast check of the `configured` flag, without parsing the record.
    pub fn is_configured(&self) -> bool {
        match self.storage.read(CONFIGURED_KEY) {
            Ok(Some(bytes)) => bytes.first() == Some(&1),
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to read configured flag: {}", e);
                false
            }
        }
    }

    /// Load the newest valid record.
    ///
    /// Returns defaults if storage holds no valid record.
    pub fn load(&mut self) -> ProvisioningRecord {
        let mut best: Option<(usize, u32, ProvisioningRecord)> = None;

        for (index, key) in SLOT_KEYS.iter().enumerate() {
            let frame = match self.storage.read(key) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Failed to read slot '{}': {}", key, e);
                    continue;
                }
            };
            let Some((seq, payload)) = decode_frame(&frame) else {
                warn!("Slot '{}' is corrupt, ignoring", key);
                continue;
            };
            match ProvisioningRecord::from_bytes(payload) {
                Ok(record) => {
                    if best.as_ref().map_or(true, |(_, best_seq, _)| seq > *best_seq) {
                        best = Some((index, seq, record));
                    }
                }
                Err(e) => warn!("Slot '{}' holds an unreadable record: {}", key, e),
            }
        }

        match best {
            Some((index, seq, record)) => {
                debug!("Loaded record from slot '{}' (seq {})", SLOT_KEYS[index], seq);
                self.current = Some((index, seq));
                record
            }
            None => {
                debug!("No stored record, using defaults");
                self.current = None;
                ProvisioningRecord::default()
            }
        }
    }

    /// Save a record with read-back verification.
    ///
    /// Blank host and zero port are stored as the defaults.
    pub fn save(&mut self, record: &ProvisioningRecord) -> Result<(), StoreError> {
        let mut record = record.clone();
        record.normalize();

        let (slot, seq) = match self.current {
            Some((index, seq)) => ((index + 1) % SLOT_KEYS.len(), seq.wrapping_add(1)),
            None => (0, 1),
        };
        let key = SLOT_KEYS[slot];

        let frame = encode_frame(seq, &record.to_bytes())?;
        self.storage.write(key, &frame)?;

        // Read back to catch silent flash write failures
        match self.storage.read(key) {
            Ok(Some(read_back)) if read_back == frame => {}
            Ok(_) => {
                error!("Slot '{}' verification failed - data mismatch after save", key);
                return Err(StoreError::Verify(key));
            }
            Err(e) => {
                error!("Failed to read back slot '{}' after save: {}", key, e);
                return Err(StoreError::Verify(key));
            }
        }
        self.current = Some((slot, seq));

        self.storage
            .write(CONFIGURED_KEY, &[u8::from(record.configured)])?;

        info!(
            "Record saved to slot '{}' (seq {}, configured: {})",
            key, seq, record.configured
        );
        Ok(())
    }

    /// Remove every stored key.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.storage.remove(CONFIGURED_KEY)?;
        for key in SLOT_KEYS {
            self.storage.remove(key)?;
        }
        self.current = None;
        info!("Stored configuration cleared");
        Ok(())
    }
}

fn frame_digest(seq: u32, payload: &[u8]) -> [u8; FRAME_DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(seq.to_le_bytes());
    hasher.update(payload);
    let hash = hasher.finalize();
    let mut digest = [0u8; FRAME_DIGEST_LEN];
    digest.copy_from_slice(&hash[..FRAME_DIGEST_LEN]);
    digest
}

fn encode_frame(seq: u32, payload: &[u8]) -> Result<Vec<u8>, StoreError> {
    let framed = FRAME_HEADER_LEN + payload.len() + FRAME_DIGEST_LEN;
    if framed > MAX_FRAME_LEN {
        return Err(StoreError::TooLarge(framed));
    }
    let len = u16::try_from(payload.len()).map_err(|_| StoreError::TooLarge(framed))?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len() + FRAME_DIGEST_LEN);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&seq.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&frame_digest(seq, payload));
    Ok(frame)
}

fn decode_frame(frame: &[u8]) -> Option<(u32, &[u8])> {
    if frame.len() < FRAME_HEADER_LEN + FRAME_DIGEST_LEN || frame[..2] != FRAME_MAGIC {
        return None;
    }
    let seq = u32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]]);
    let len = u16::from_le_bytes([frame[6], frame[7]]) as usize;
    if frame.len() != FRAME_HEADER_LEN + len + FRAME_DIGEST_LEN {
        return None;
    }
    let payload = &frame[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len];
    let digest = &frame[FRAME_HEADER_LEN + len..];
    if digest != frame_digest(seq, payload) {
        return None;
    }
    Some((seq, payload))
}


#[cfg(feature = "tap-tests")]
mod tap_tests {
    use super::*;
    use blynk_board_esp32_macros::tap_test;

    #[tap_test]
    fn store_roundtrip_in_memory() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut store = ConfigStore::new(Box::new(MemoryStorage::new()));
        let mut record = store.load();
        record.wifi_ssid = "HomeNetwork".into();
        record.wifi_password = "password123".into();
        record.cloud_auth_token = "0123456789abcdef0123456789abcdef".into();
        record.refresh_configured();
        store.save(&record)?;

        assert!(store.is_configured());
        assert_eq!(store.load(), record);
        Ok(())
    }

    #[tap_test]
    fn store_survives_torn_write() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let storage = MemoryStorage::new();
        let mut store = ConfigStore::new(Box::new(storage.clone()));
        let mut record = store.load();
        record.wifi_ssid = "First".into();
        store.save(&record)?;

        record.wifi_ssid = "Second".into();
        storage.truncate_next_write(10);
        let _ = store.save(&record);

        assert_eq!(ConfigStore::new(Box::new(storage)).load().wifi_ssid, "First");
        Ok(())
    }

    #[tap_test(device_only)]
    fn nvs_holds_largest_frame() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        const KEY: &str = "tap_max_frame";

        let mut storage = NvsStorage::take().map_err(|e| format!("NVS: {:?}", e))?;
        let frame: Vec<u8> = (0..MAX_FRAME_LEN).map(|i| i as u8).collect();
        storage.write(KEY, &frame)?;
        let read = storage.read(KEY)?;
        storage.remove(KEY)?;

        assert_eq!(read, Some(frame));
        Ok(())
    }
}
