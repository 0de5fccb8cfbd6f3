//! ESP32 Non-Volatile Storage backend.
//!
//! Values are stored as NVS blobs in the `blynk_board` namespace. Keys must
//! stay under the NVS 15-character limit.

use super::backend::{Storage, StorageError};
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_sys::EspError;

/// NVS namespace for the board configuration.
const NVS_NAMESPACE: &str = "blynk_board";

/// Largest value read back.
const MAX_VALUE_SIZE: usize = super::MAX_FRAME_LEN;

/// [`Storage`] over an NVS namespace.
pub struct NvsStorage {
    nvs: EspNvs<NvsDefault>,
}

impl NvsStorage {
    /// Open the board namespace on the default NVS partition.
    pub fn init(partition: EspNvsPartition<NvsDefault>) -> Result<Self, EspError> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        Ok(Self { nvs })
    }

    /// Take the default partition and open the board namespace.
    pub fn take() -> Result<Self, EspError> {
        Self::init(EspNvsPartition::<NvsDefault>::take()?)
    }
}

fn backend_error(op: &str, key: &str, e: EspError) -> StorageError {
    StorageError::Backend(format!("NVS {} '{}': {:?}", op, key, e))
}

impl Storage for NvsStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let mut buf = [0u8; MAX_VALUE_SIZE];
        match self.nvs.get_raw(key, &mut buf) {
            Ok(Some(bytes)) => Ok(Some(bytes.to_vec())),
            Ok(None) => {
                log::debug!("No value for '{}' in NVS", key);
                Ok(None)
            }
            Err(e) => Err(backend_error("read", key, e)),
        }
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        if bytes.len() > MAX_VALUE_SIZE {
            return Err(StorageError::TooLarge {
                key: key.to_string(),
                len: bytes.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        self.nvs
            .set_raw(key, bytes)
            .map_err(|e| backend_error("write", key, e))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.nvs
            .remove(key)
            .map_err(|e| backend_error("remove", key, e))?;
        Ok(())
    }
}
