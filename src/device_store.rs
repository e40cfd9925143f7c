//! Per-device configuration record at `FireLog/FireVendingMachine/{deviceId}`.
//!
//! Only `put` writes the whole record. Every other mutation touches a single
//! leaf, so concurrent updates of different fields never clobber each other.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::FireLogError;
use crate::model::{ConfigField, DeviceConfig};
use crate::store::{vending_machine_path, RemoteStore};

/// Key of the denormalized log counter inside the device record.
pub const TOTAL_LOG_KEY: &str = "totalLog";

#[derive(Clone)]
pub struct DeviceConfigStore {
    store: Arc<dyn RemoteStore>,
}

impl DeviceConfigStore {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Replace the whole record. Fields absent from `config` revert to defaults.
    pub async fn put(&self, device_id: &str, config: &DeviceConfig) -> Result<(), FireLogError> {
        let path = vending_machine_path(device_id)?;
        let value = serde_json::to_value(config)?;
        debug!(device_id = %device_id, "Writing device record");
        self.store.set(&path, value).await
    }

    /// Set one configuration field, leaving all others untouched.
    pub async fn patch_field(
        &self,
        device_id: &str,
        field: ConfigField,
        value: &str,
    ) -> Result<(), FireLogError> {
        let path = vending_machine_path(device_id)?;
        let mut fields = Map::new();
        fields.insert(field.wire_key().to_string(), Value::from(value));
        debug!(device_id = %device_id, field = %field, "Patching device field");
        self.store.update(&path, fields).await
    }

    /// Add one to the log counter with a server-side delta.
    pub async fn increment_total_log(&self, device_id: &str) -> Result<(), FireLogError> {
        let path = vending_machine_path(device_id)?.child(TOTAL_LOG_KEY)?;
        self.store.increment(&path, 1).await
    }

    /// Set the log counter back to 0.
    pub async fn reset_total_log(&self, device_id: &str) -> Result<(), FireLogError> {
        let path = vending_machine_path(device_id)?.child(TOTAL_LOG_KEY)?;
        self.store.set(&path, Value::from(0)).await
    }

    /// Read the record back, `None` if the device never wrote one.
    pub async fn get(&self, device_id: &str) -> Result<Option<DeviceConfig>, FireLogError> {
        let path = vending_machine_path(device_id)?;
        match self.store.get(&path).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}
