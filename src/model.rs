//! Record models written to the realtime database.
//!
//! Field names on the wire follow the existing `FireLog` tree layout, so
//! records written by earlier clients still decode.

use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::FireLogError;
use crate::package::PackageVersion;

/// Stable per-install device identifier.
pub type DeviceId = String;

/// Store-generated log key.
pub type LogId = String;

/// Log severity levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Info,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INFO" => Ok(Severity::Info),
            "ERROR" => Ok(Severity::Error),
            _ => Err(format!("unknown severity '{}'", s)),
        }
    }
}

/// Vending machine hardware families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineKind {
    #[serde(rename = "VENDING_MACHINE_M3")]
    M3,
    #[serde(rename = "VENDING_MACHINE_M4")]
    M4,
    #[serde(rename = "VENDING_MACHINE_M5")]
    M5,
    #[serde(rename = "VENDING_MACHINE_M5_FLORIST")]
    M5Florist,
    #[serde(rename = "VENDING_MACHINE_M5_DOBI")]
    M5Dobi,
    #[serde(rename = "VENDING_MACHINE_M5_MINI")]
    M5Mini,
}

impl MachineKind {
    /// Get all known machine kinds.
    pub fn all() -> &'static [MachineKind] {
        &[
            MachineKind::M3,
            MachineKind::M4,
            MachineKind::M5,
            MachineKind::M5Florist,
            MachineKind::M5Dobi,
            MachineKind::M5Mini,
        ]
    }

    /// Name stored in the `vendingMachineType` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineKind::M3 => "VENDING_MACHINE_M3",
            MachineKind::M4 => "VENDING_MACHINE_M4",
            MachineKind::M5 => "VENDING_MACHINE_M5",
            MachineKind::M5Florist => "VENDING_MACHINE_M5_FLORIST",
            MachineKind::M5Dobi => "VENDING_MACHINE_M5_DOBI",
            MachineKind::M5Mini => "VENDING_MACHINE_M5_MINI",
        }
    }
}

impl std::fmt::Display for MachineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineKind {
    type Err = FireLogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MachineKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| FireLogError::UnknownMachineKind(s.to_string()))
    }
}

/// Independently settable per-deployment configuration fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    OutletId,
    SecretKey,
    GatewayId,
    WashingDeviceId,
    KioskSerialNumber,
    MerchantCode,
    MerchantKey,
    FranchiseId,
    MachineId,
}

impl ConfigField {
    pub fn all() -> &'static [ConfigField] {
        &[
            ConfigField::OutletId,
            ConfigField::SecretKey,
            ConfigField::GatewayId,
            ConfigField::WashingDeviceId,
            ConfigField::KioskSerialNumber,
            ConfigField::MerchantCode,
            ConfigField::MerchantKey,
            ConfigField::FranchiseId,
            ConfigField::MachineId,
        ]
    }

    /// Key of this field inside the device record.
    pub fn wire_key(&self) -> &'static str {
        match self {
            ConfigField::OutletId => "outletId",
            ConfigField::SecretKey => "secretKey",
            ConfigField::GatewayId => "gatewayId",
            ConfigField::WashingDeviceId => "washingDeviceId",
            ConfigField::KioskSerialNumber => "kioskSerialNumber",
            ConfigField::MerchantCode => "merchantCode",
            ConfigField::MerchantKey => "merchantKey",
            ConfigField::FranchiseId => "franchiseId",
            ConfigField::MachineId => "machineId",
        }
    }
}

impl std::fmt::Display for ConfigField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_key())
    }
}

impl FromStr for ConfigField {
    type Err = FireLogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigField::all()
            .iter()
            .copied()
            .find(|field| field.wire_key() == s)
            .ok_or_else(|| FireLogError::UnknownField(s.to_string()))
    }
}

/// Per-device registration and configuration record.
///
/// Written whole by `initialize`, then mutated one field at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
    #[serde(rename = "deviceFirebaseId")]
    pub device_id: DeviceId,

    #[serde(rename = "token")]
    pub auth_token: String,

    #[serde(rename = "versionName")]
    pub app_version_name: String,

    #[serde(rename = "versionCode")]
    pub app_version_code: String,

    /// `None` only for records that were patched before registration
    #[serde(
        rename = "vendingMachineType",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "machine_kind_or_empty"
    )]
    pub machine_kind: Option<MachineKind>,

    pub outlet_id: String,
    pub secret_key: String,
    pub gateway_id: String,
    pub washing_device_id: String,
    pub kiosk_serial_number: String,
    pub merchant_code: String,
    pub merchant_key: String,
    pub franchise_id: String,
    pub machine_id: String,

    #[serde(rename = "totalLog")]
    pub total_log_count: u64,

    pub created_at: String,
}

impl DeviceConfig {
    /// Build the registration record written by `initialize`.
    ///
    /// All optional configuration fields start empty and the log count at 0.
    pub fn register(
        device_id: impl Into<String>,
        auth_token: impl Into<String>,
        version: &PackageVersion,
        machine_kind: MachineKind,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            auth_token: auth_token.into(),
            app_version_name: version.name.clone(),
            app_version_code: version.code.to_string(),
            machine_kind: Some(machine_kind),
            created_at: Utc::now().timestamp_millis().to_string(),
            ..Self::default()
        }
    }

    /// Current value of a patchable field.
    pub fn field(&self, field: ConfigField) -> &str {
        match field {
            ConfigField::OutletId => &self.outlet_id,
            ConfigField::SecretKey => &self.secret_key,
            ConfigField::GatewayId => &self.gateway_id,
            ConfigField::WashingDeviceId => &self.washing_device_id,
            ConfigField::KioskSerialNumber => &self.kiosk_serial_number,
            ConfigField::MerchantCode => &self.merchant_code,
            ConfigField::MerchantKey => &self.merchant_key,
            ConfigField::FranchiseId => &self.franchise_id,
            ConfigField::MachineId => &self.machine_id,
        }
    }
}

fn machine_kind_or_empty<'de, D>(deserializer: D) -> Result<Option<MachineKind>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(kind) => kind.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// A single structured log record for one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogEntry {
    /// Store-generated key; empty until appended
    #[serde(rename = "fireLogId")]
    pub log_id: LogId,

    #[serde(rename = "deviceFirebaseId")]
    pub device_id: DeviceId,

    #[serde(rename = "className")]
    pub origin_class: String,

    #[serde(rename = "function")]
    pub origin_function: String,

    #[serde(rename = "messageInfo")]
    pub message: String,

    #[serde(rename = "messageDetail")]
    pub detail: String,

    /// Epoch milliseconds as a decimal string
    #[serde(rename = "createdDate")]
    pub created_at: String,

    #[serde(rename = "logType")]
    pub severity: Severity,
}

impl LogEntry {
    /// Create a new log entry stamped with the current time.
    pub fn new(
        device_id: impl Into<String>,
        severity: Severity,
        origin_class: impl Into<String>,
        origin_function: impl Into<String>,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            log_id: String::new(),
            device_id: device_id.into(),
            origin_class: origin_class.into(),
            origin_function: origin_function.into(),
            message: message.into(),
            detail: detail.into(),
            created_at: Utc::now().timestamp_millis().to_string(),
            severity,
        }
    }
}

/// Earlier name of [`LogEntry`], kept for callers of the first schema.
#[deprecated(note = "use LogEntry")]
pub type FireLogRecord = LogEntry;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn version() -> PackageVersion {
        PackageVersion::new("2.4.1", 241)
    }

    #[test]
    fn test_machine_kind_wire_names() {
        for kind in MachineKind::all() {
            let encoded = serde_json::to_value(kind).unwrap();
            assert_eq!(encoded, json!(kind.as_str()));
            assert_eq!(kind.as_str().parse::<MachineKind>().unwrap(), *kind);
        }
        assert_eq!(MachineKind::all().len(), 6);
    }

    #[test]
    fn test_unknown_machine_kind_rejected() {
        let result = "VENDING_MACHINE_M9".parse::<MachineKind>();
        assert!(matches!(result, Err(FireLogError::UnknownMachineKind(_))));
        assert!("vending_machine_m3".parse::<MachineKind>().is_err());
    }

    #[test]
    fn test_config_field_lookup() {
        assert_eq!("franchiseId".parse::<ConfigField>().unwrap(), ConfigField::FranchiseId);
        assert!(matches!(
            "fid".parse::<ConfigField>(),
            Err(FireLogError::UnknownField(_))
        ));
    }

    #[test]
    fn test_register_defaults() {
        let config = DeviceConfig::register("fid-1", "tok", &version(), MachineKind::M5Dobi);
        assert_eq!(config.device_id, "fid-1");
        assert_eq!(config.app_version_name, "2.4.1");
        assert_eq!(config.app_version_code, "241");
        assert_eq!(config.machine_kind, Some(MachineKind::M5Dobi));
        assert_eq!(config.total_log_count, 0);
        for field in ConfigField::all() {
            assert_eq!(config.field(*field), "");
        }
        assert!(config.created_at.parse::<i64>().is_ok());
    }

    #[test]
    fn test_device_config_wire_keys() {
        let config = DeviceConfig::register("fid-1", "tok", &version(), MachineKind::M3);
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["deviceFirebaseId"], json!("fid-1"));
        assert_eq!(value["token"], json!("tok"));
        assert_eq!(value["vendingMachineType"], json!("VENDING_MACHINE_M3"));
        assert_eq!(value["totalLog"], json!(0));
        assert_eq!(value["kioskSerialNumber"], json!(""));
    }

    #[test]
    fn test_device_config_tolerates_partial_records() {
        // A record that only received patches before registration
        let value = json!({ "outletId": "OUT-7", "totalLog": 3, "vendingMachineType": "" });
        let config: DeviceConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config.outlet_id, "OUT-7");
        assert_eq!(config.total_log_count, 3);
        assert!(config.machine_kind.is_none());
        assert!(config.device_id.is_empty());
    }

    #[test]
    fn test_log_entry_wire_keys() {
        let entry = LogEntry::new("fid-1", Severity::Error, "Payment", "charge", "declined", "");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["logType"], json!("ERROR"));
        assert_eq!(value["className"], json!("Payment"));
        assert_eq!(value["function"], json!("charge"));
        assert_eq!(value["messageInfo"], json!("declined"));
        assert_eq!(value["messageDetail"], json!(""));
        assert!(entry.created_at.parse::<i64>().unwrap() > 0);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("info".parse::<Severity>().unwrap(), Severity::Info);
        assert_eq!("ERROR".parse::<Severity>().unwrap(), Severity::Error);
        assert!("warn".parse::<Severity>().is_err());
    }
}
