//! FireLog - command line front end for the FireLog client
//!
//! Runs a single facade operation for this device and waits for the
//! background write to finish.
//!
//! ## Usage
//!
//! ```text
//! firelog init <KIND>
//! firelog set <FIELD> <VALUE>
//! firelog log <SEVERITY> <CLASS> <FUNCTION> <MESSAGE> [DETAIL]
//! firelog clear
//! ```
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables (see `Config`):
//!
//! - `FIRELOG_DATABASE_URL`: Realtime database URL; unset runs against an
//!   in-memory tree and prints it on exit
//! - `FIRELOG_PROJECT_ID`, `FIRELOG_API_KEY`, `FIRELOG_APP_ID`: use Firebase
//!   Installations for the device id
//! - `FIRELOG_DEVICE_ID`: fixed device id otherwise
//! - `FIRELOG_APP_VERSION_NAME`, `FIRELOG_APP_VERSION_CODE`: version written
//!   by `init` (default: this binary's version)
//! - `RUST_LOG`: Logging level filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use firelog::config::Config;
use firelog::identity::{IdentityProvider, StaticIdentity};
use firelog::installations::InstallationsProvider;
use firelog::package::DeclaredPackage;
use firelog::store::memory::InMemoryStore;
use firelog::store::realtime::RealtimeDatabase;
use firelog::store::RemoteStore;
use firelog::{ConfigField, FireLog, MachineKind, Severity};

/// How long to wait for background writes on exit
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// FireLog - forward device logs and vending machine configuration
#[derive(Parser, Debug)]
#[command(name = "firelog")]
#[command(about = "Forward device logs and vending machine configuration to Firebase")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// A single operation requested on the command line.
#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Register this device
    Init {
        /// Vending machine type, e.g. VENDING_MACHINE_M5_MINI
        kind: MachineKind,
    },

    /// Set one configuration field
    Set {
        /// Field name, e.g. outletId or merchantKey
        field: ConfigField,

        /// New value
        value: String,
    },

    /// Append a log entry
    Log {
        /// INFO or ERROR (case-insensitive)
        severity: Severity,

        /// Originating class or component
        class: String,

        /// Originating function
        function: String,

        message: String,

        /// Extra detail, empty when omitted
        detail: Option<String>,
    },

    /// Remove all log entries and reset the log count
    Clear,
}

impl Command {
    fn run(self, firelog: &FireLog, package: &DeclaredPackage) {
        match self {
            Command::Init { kind } => firelog.initialize(package, kind),
            Command::Set { field, value } => firelog.update_field(field, &value),
            Command::Log {
                severity,
                class,
                function,
                message,
                detail,
            } => firelog.log(
                severity,
                &class,
                &function,
                &message,
                detail.as_deref().unwrap_or_default(),
            ),
            Command::Clear => firelog.clear_logs(),
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with environment filter
    init_tracing();

    let cli = Cli::parse();

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(config) => {
            info!(
                database_url = ?config.database_url,
                dispatch_mode = ?config.dispatch_mode,
                request_timeout_secs = config.request_timeout.as_secs(),
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let identity = match build_identity(&config) {
        Ok(identity) => identity,
        Err(e) => {
            error!(error = %e, "Failed to create identity provider");
            std::process::exit(1);
        }
    };

    let memory = Arc::new(InMemoryStore::new());
    let store: Arc<dyn RemoteStore> = match &config.database_url {
        Some(_) => match RealtimeDatabase::new(&config) {
            Ok(db) => Arc::new(db),
            Err(e) => {
                error!(error = %e, "Failed to create database client");
                std::process::exit(1);
            }
        },
        None => {
            warn!("FIRELOG_DATABASE_URL not set, writing to an in-memory tree");
            memory.clone()
        }
    };

    let firelog = FireLog::builder(identity, store)
        .identity_timeout(config.identity_timeout)
        .dispatch_mode(config.dispatch_mode)
        .build();

    let package = declared_package(&config);
    cli.command.run(&firelog, &package);

    // Wait for the background write (with timeout)
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, firelog.shutdown()).await {
        Ok(()) => info!("FireLog operation finished"),
        Err(_) => warn!("Shutdown timed out after {:?}", SHUTDOWN_TIMEOUT),
    }

    if config.database_url.is_none() {
        match serde_json::to_string_pretty(&memory.snapshot()) {
            Ok(tree) => println!("{}", tree),
            Err(e) => error!(error = %e, "Failed to render in-memory tree"),
        }
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// Version reported by `init`, falling back to this binary's own version
/// for whichever part is not configured.
fn declared_package(config: &Config) -> DeclaredPackage {
    DeclaredPackage::new(
        Some(
            config
                .app_version_name
                .clone()
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        ),
        Some(
            config
                .app_version_code
                .clone()
                .unwrap_or_else(binary_version_code),
        ),
    )
}

/// `MAJOR * 10000 + MINOR * 100 + PATCH` of this binary.
fn binary_version_code() -> String {
    let part = |v: &str| v.parse::<u64>().unwrap_or(0);
    let code = part(env!("CARGO_PKG_VERSION_MAJOR")) * 10_000
        + part(env!("CARGO_PKG_VERSION_MINOR")) * 100
        + part(env!("CARGO_PKG_VERSION_PATCH"));
    code.to_string()
}

/// Pick the identity provider: Firebase Installations when configured,
/// otherwise a fixed device id.
fn build_identity(config: &Config) -> Result<Arc<dyn IdentityProvider>, firelog::FireLogError> {
    if let Some(installations) = &config.installations {
        let provider = InstallationsProvider::new(
            installations,
            config.device_id.clone(),
            config.request_timeout,
        )?;
        return Ok(Arc::new(provider));
    }

    let device_id = match &config.device_id {
        Some(id) => id.clone(),
        None => {
            let id = Uuid::new_v4().simple().to_string();
            warn!(device_id = %id, "FIRELOG_DEVICE_ID not set, using a one-off device id");
            id
        }
    };
    Ok(Arc::new(StaticIdentity::new(device_id, "")))
}
