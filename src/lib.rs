//! FireLog Library
//!
//! Forwards structured log entries and vending machine configuration to a
//! Firebase Realtime Database, partitioned by a per-install device id:
//!
//! - **facade**: the fire-and-forget [`FireLog`] entry point
//! - **identity** / **installations**: device id and auth token resolution
//! - **device_store**: the per-device configuration record
//! - **log_store**: the per-device log collection
//! - **store**: the hierarchical store seam with REST and in-memory backends
//! - **queue**: the background work queue owned by each facade
//! - **config**: environment-based configuration
//!
//! # Tree layout
//!
//! ```text
//! FireLog/
//!   FireVendingMachine/{deviceId} -> DeviceConfig
//!   FireLogDetail/{deviceId}/{logId} -> LogEntry
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use firelog::config::Config;
//! use firelog::{FireLog, MachineKind, PackageVersion, Severity, StaticIdentity};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let identity = Arc::new(StaticIdentity::new("cAbCdEfGhIjKlMnOpQrStU", ""));
//!     let firelog = FireLog::from_config(&config, identity).expect("Failed to create client");
//!
//!     firelog.initialize(&PackageVersion::new("1.4.0", 140), MachineKind::M5Mini);
//!     firelog.update_kiosk_serial_number("KSN-0042");
//!     firelog.log(Severity::Error, "Payment", "charge", "Card declined", "code 51");
//!     firelog.clear_logs();
//!
//!     // Wait for background writes before exiting
//!     firelog.shutdown().await;
//! }
//! ```

// Module declarations
pub mod config;
pub mod device_store;
pub mod error;
pub mod facade;
pub mod identity;
pub mod installations;
pub mod log_store;
pub mod model;
pub mod package;
pub mod push_id;
pub mod queue;
pub mod store;

// Re-export commonly used types at crate root for convenience
pub use config::{Config, ConfigError, InstallationsConfig};
pub use device_store::DeviceConfigStore;
pub use error::FireLogError;
pub use facade::{ErrorObserver, Failure, FireLog, FireLogBuilder, Operation};
pub use identity::{IdentityProvider, IdentityResolver, StaticIdentity};
pub use installations::InstallationsProvider;
pub use log_store::LogStore;
pub use model::{ConfigField, DeviceConfig, DeviceId, LogEntry, LogId, MachineKind, Severity};
pub use package::{DeclaredPackage, PackageInfo, PackageVersion};
pub use queue::{DispatchMode, WorkQueue};
pub use store::memory::InMemoryStore;
pub use store::realtime::RealtimeDatabase;
pub use store::{DbPath, RemoteStore};
