//! # Persistent Configuration
//!
//! Atomic save/load of the link configuration and the register catalog
//! to a key/value blob store (NVS on the target device). One namespace
//! holds the config record under `firmware-config` and one blob per
//! descriptor under `rad0`, `rad1`, ... in catalog order.
//!
//! Loading is all-or-nothing: any failure while reading descriptors
//! clears the catalog and keeps the factory defaults, so a partially
//! loaded catalog is never observable. Saving is a two-phase commit:
//! if a descriptor write fails, the config record is overwritten with a
//! zeroed record so the next load sees a consistent empty state.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, error};

use crate::catalog::RegisterCatalog;
use crate::constants::{NVS_CONFIG_KEY, NVS_DESCRIPTOR_KEY_PREFIX};
use crate::descriptor::RegisterDescriptor;
use crate::error::StoreError;
use crate::link::{DataBits, LinkConfig, Parity, StopBits, FIRMWARE_VERSION};
use crate::words::WordOrder;

/// Key/value blob storage opened on the gateway's NVS namespace.
///
/// The embedder opens the `gateway-fw-cfg` namespace and hands the
/// handle in; `commit` flushes buffered writes to flash.
pub trait BlobStore: Send + Sync {
    /// Read a blob by key.
    fn get_blob(&self, key: &str) -> Result<Vec<u8>, StoreError>;
    /// Write or replace a blob.
    fn set_blob(&self, key: &str, data: &[u8]) -> Result<(), StoreError>;
    /// Flush buffered writes.
    fn commit(&self) -> Result<(), StoreError>;
}

impl<T: BlobStore + ?Sized> BlobStore for std::sync::Arc<T> {
    fn get_blob(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        (**self).get_blob(key)
    }

    fn set_blob(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        (**self).set_blob(key, data)
    }

    fn commit(&self) -> Result<(), StoreError> {
        (**self).commit()
    }
}

fn descriptor_key(index: usize) -> String {
    format!("{}{}", NVS_DESCRIPTOR_KEY_PREFIX, index)
}

// ============================================================================
// Configuration Store
// ============================================================================

/// Holder of the actual/next link configuration pair and the blob
/// persistence logic around them.
pub struct ConfigStore {
    store: Box<dyn BlobStore>,
    actual: LinkConfig,
    next: Mutex<LinkConfig>,
}

impl ConfigStore {
    /// Create a store with factory defaults for both configurations.
    pub fn new(store: Box<dyn BlobStore>) -> Self {
        Self {
            store,
            actual: LinkConfig::default(),
            next: Mutex::new(LinkConfig::default()),
        }
    }

    fn next_guard(&self) -> std::sync::MutexGuard<'_, LinkConfig> {
        self.next.lock().expect("link config lock poisoned")
    }

    /// The configuration the gateway is running with. Fixed after load.
    pub fn actual(&self) -> LinkConfig {
        self.actual.clone()
    }

    /// The configuration that will apply after the next save + restart.
    pub fn next(&self) -> LinkConfig {
        self.next_guard().clone()
    }

    /// Load the config record and the descriptor blobs it announces.
    ///
    /// Called once at bring-up, before the catalog is shared. On any
    /// descriptor failure the catalog is cleared and defaults stay in
    /// force; only a fully consistent load replaces `actual`/`next`.
    pub fn load(&mut self, catalog: &mut RegisterCatalog) -> Result<(), StoreError> {
        let raw = self.store.get_blob(NVS_CONFIG_KEY)?;
        let loaded: LinkConfig = postcard::from_bytes(&raw)
            .map_err(|_| StoreError::Corrupt(NVS_CONFIG_KEY.to_string()))?;

        for index in 0..usize::from(loaded.known_registers_count) {
            let key = descriptor_key(index);
            let result = self
                .store
                .get_blob(&key)
                .and_then(|bytes| {
                    postcard::from_bytes::<RegisterDescriptor>(&bytes)
                        .map_err(|_| StoreError::Corrupt(key.clone()))
                })
                .and_then(|desc| {
                    catalog
                        .add(desc)
                        .map_err(|_| StoreError::Corrupt(key.clone()))
                });
            if let Err(err) = result {
                catalog.clear();
                return Err(err);
            }
        }

        debug!(
            registers = catalog.count(),
            baudrate = loaded.baudrate,
            "configuration loaded"
        );
        self.actual = loaded.clone();
        *self.next_guard() = loaded;
        Ok(())
    }

    /// Persist the next configuration and a catalog snapshot.
    ///
    /// Phase one writes the config record carrying the snapshot size;
    /// phase two writes the descriptors in catalog order and commits.
    /// A descriptor failure zeroes the config record (with the config
    /// record's own size) before reporting the error.
    pub fn save(&self, descriptors: &[RegisterDescriptor]) -> Result<(), StoreError> {
        let config = {
            let mut next = self.next_guard();
            next.known_registers_count = descriptors.len() as u16;
            next.fw_version = FIRMWARE_VERSION;
            next.clone()
        };

        let config_blob = postcard::to_allocvec(&config)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.store.set_blob(NVS_CONFIG_KEY, &config_blob)?;

        for (index, desc) in descriptors.iter().enumerate() {
            let blob = postcard::to_allocvec(desc)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            if let Err(err) = self.store.set_blob(&descriptor_key(index), &blob) {
                self.invalidate_config_record();
                return Err(err);
            }
        }

        self.store.commit()?;
        debug!(registers = descriptors.len(), "configuration saved");
        Ok(())
    }

    /// Overwrite the config record with a zeroed one after a partial
    /// save, so the announced descriptor count returns to zero.
    fn invalidate_config_record(&self) {
        let zeroed = match postcard::to_allocvec(&LinkConfig::zeroed()) {
            Ok(blob) => blob,
            Err(_) => return,
        };
        if self.store.set_blob(NVS_CONFIG_KEY, &zeroed).is_err()
            || self.store.commit().is_err()
        {
            error!("failed to zero the config record after a partial save");
        }
    }

    // ========================================================================
    // Next-Configuration Setters
    // ========================================================================

    /// Set the baudrate of the next configuration; must be positive.
    pub fn set_baudrate(&self, baudrate: i32) -> bool {
        if baudrate <= 0 {
            return false;
        }
        self.next_guard().baudrate = baudrate;
        true
    }

    /// Set the inter-command pacing delay; must be positive.
    pub fn set_inter_cmd_delay_ms(&self, delay_ms: u16) -> bool {
        if delay_ms == 0 {
            return false;
        }
        self.next_guard().inter_cmd_delay_ms = delay_ms;
        true
    }

    /// Set the polling period in seconds.
    pub fn set_read_period(&self, period_s: u8) {
        self.next_guard().read_period_s = period_s;
    }

    /// Set the serial data bits.
    pub fn set_data_bits(&self, data_bits: DataBits) {
        self.next_guard().data_bits = data_bits;
    }

    /// Set the serial parity.
    pub fn set_parity(&self, parity: Parity) {
        self.next_guard().parity = parity;
    }

    /// Set the serial stop bits.
    pub fn set_stop_bits(&self, stop_bits: StopBits) {
        self.next_guard().stop_bits = stop_bits;
    }

    /// Set the multi-word significance order.
    pub fn set_word_order(&self, order: WordOrder) {
        self.next_guard().word_order = order;
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// Volatile [`BlobStore`] for tests and host builds.
///
/// `fail_after_writes` makes the store error on the Nth subsequent
/// write, which is how the save-atomicity tests provoke partial saves.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_after_writes: Mutex<Option<usize>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the store fail every write once `writes` more succeeded.
    pub fn fail_after_writes(&self, writes: usize) {
        *self.fail_after_writes.lock().expect("store lock poisoned") = Some(writes);
    }

    fn consume_write_budget(&self) -> bool {
        let mut budget = self.fail_after_writes.lock().expect("store lock poisoned");
        match budget.as_mut() {
            Some(0) => false,
            Some(remaining) => {
                *remaining -= 1;
                true
            }
            None => true,
        }
    }
}

impl BlobStore for MemoryBlobStore {
    fn get_blob(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .lock()
            .expect("store lock poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::Missing(key.to_string()))
    }

    fn set_blob(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        if !self.consume_write_budget() {
            return Err(StoreError::Backend("write rejected".to_string()));
        }
        self.blobs
            .lock()
            .expect("store lock poisoned")
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
