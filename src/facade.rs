//! The `FireLog` facade.
//!
//! Every public operation resolves the device identity and writes to the
//! stores on the facade's own [`WorkQueue`], returning to the caller
//! immediately. Failures never reach the caller: each one is logged with the
//! operation that produced it, handed to the error observer if one is
//! attached, and dropped.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::config::Config;
use crate::device_store::DeviceConfigStore;
use crate::error::FireLogError;
use crate::identity::{IdentityProvider, IdentityResolver, DEFAULT_IDENTITY_TIMEOUT};
use crate::log_store::LogStore;
use crate::model::{ConfigField, DeviceConfig, LogEntry, LogId, MachineKind, Severity};
use crate::package::{PackageInfo, PackageVersion};
use crate::queue::{DispatchMode, WorkQueue};
use crate::store::realtime::RealtimeDatabase;
use crate::store::RemoteStore;

/// Facade operation that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Initialize,
    UpdateField(ConfigField),
    Log,
    ClearLogs,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Initialize => write!(f, "initialize"),
            Operation::UpdateField(field) => write!(f, "update {}", field),
            Operation::Log => write!(f, "log"),
            Operation::ClearLogs => write!(f, "clear logs"),
        }
    }
}

/// A swallowed failure, as seen by the error observer.
#[derive(Debug)]
pub struct Failure {
    pub operation: Operation,
    pub error: FireLogError,
}

/// Callback receiving every failure the facade swallows.
pub type ErrorObserver = Arc<dyn Fn(&Failure) + Send + Sync>;

struct Inner {
    resolver: IdentityResolver,
    devices: DeviceConfigStore,
    logs: LogStore,
    observer: Option<ErrorObserver>,
}

/// Fire-and-forget client for device configuration and log forwarding.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use firelog::{FireLog, MachineKind, PackageVersion, Severity, StaticIdentity};
/// use firelog::store::memory::InMemoryStore;
///
/// #[tokio::main]
/// async fn main() {
///     let firelog = FireLog::new(
///         Arc::new(StaticIdentity::new("cAbCdEfGhIjKlMnOpQrStU", "")),
///         Arc::new(InMemoryStore::new()),
///     );
///
///     firelog.initialize(&PackageVersion::new("1.0.0", 1), MachineKind::M5Dobi);
///     firelog.update_outlet_id("OUT-17");
///     firelog.log(Severity::Info, "Dispenser", "vend", "Slot 4 dispensed", "");
///
///     firelog.shutdown().await;
/// }
/// ```
pub struct FireLog {
    inner: Arc<Inner>,
    queue: WorkQueue,
}

impl FireLog {
    /// Create a facade with default settings on the current tokio runtime.
    pub fn new(identity: Arc<dyn IdentityProvider>, store: Arc<dyn RemoteStore>) -> Self {
        Self::builder(identity, store).build()
    }

    pub fn builder(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn RemoteStore>,
    ) -> FireLogBuilder {
        FireLogBuilder {
            identity,
            store,
            identity_timeout: DEFAULT_IDENTITY_TIMEOUT,
            dispatch_mode: DispatchMode::default(),
            queue: None,
            observer: None,
        }
    }

    /// Create a facade writing to the realtime database named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the database client cannot be built.
    pub fn from_config(
        config: &Config,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self, FireLogError> {
        let store = Arc::new(RealtimeDatabase::new(config)?);
        Ok(Self::builder(identity, store)
            .identity_timeout(config.identity_timeout)
            .dispatch_mode(config.dispatch_mode)
            .build())
    }

    /// Register this device: write a fresh record with identity, token,
    /// package version and machine kind. Replaces any existing record.
    pub fn initialize(&self, package: &dyn PackageInfo, machine_kind: MachineKind) {
        let version = package.package_version();
        let inner = self.inner.clone();
        self.queue.dispatch(async move {
            let result = inner.initialize(version, machine_kind).await;
            inner.report(Operation::Initialize, result);
        });
    }

    pub fn update_outlet_id(&self, outlet_id: &str) {
        self.update_field(ConfigField::OutletId, outlet_id);
    }

    pub fn update_secret_key(&self, secret_key: &str) {
        self.update_field(ConfigField::SecretKey, secret_key);
    }

    pub fn update_gateway_id(&self, gateway_id: &str) {
        self.update_field(ConfigField::GatewayId, gateway_id);
    }

    pub fn update_washing_device_id(&self, washing_device_id: &str) {
        self.update_field(ConfigField::WashingDeviceId, washing_device_id);
    }

    pub fn update_kiosk_serial_number(&self, kiosk_serial_number: &str) {
        self.update_field(ConfigField::KioskSerialNumber, kiosk_serial_number);
    }

    pub fn update_merchant_code(&self, merchant_code: &str) {
        self.update_field(ConfigField::MerchantCode, merchant_code);
    }

    pub fn update_merchant_key(&self, merchant_key: &str) {
        self.update_field(ConfigField::MerchantKey, merchant_key);
    }

    pub fn update_franchise_id(&self, franchise_id: &str) {
        self.update_field(ConfigField::FranchiseId, franchise_id);
    }

    pub fn update_machine_id(&self, machine_id: &str) {
        self.update_field(ConfigField::MachineId, machine_id);
    }

    /// Set a single configuration field on this device's record.
    pub fn update_field(&self, field: ConfigField, value: &str) {
        let value = value.to_string();
        let inner = self.inner.clone();
        self.queue.dispatch(async move {
            let result = inner.update_field(field, &value).await;
            inner.report(Operation::UpdateField(field), result);
        });
    }

    /// Append a log entry for this device and bump its log counter.
    pub fn log(
        &self,
        severity: Severity,
        origin_class: &str,
        origin_function: &str,
        message: &str,
        detail: &str,
    ) {
        let draft = LogEntry::new(
            String::new(),
            severity,
            origin_class,
            origin_function,
            message,
            detail,
        );
        let inner = self.inner.clone();
        self.queue.dispatch(async move {
            let result = inner.log(draft).await;
            inner.report(Operation::Log, result.map(|_| ()));
        });
    }

    /// Log at `INFO` with no detail.
    pub fn info(&self, origin_class: &str, origin_function: &str, message: &str) {
        self.log(Severity::Info, origin_class, origin_function, message, "");
    }

    /// Log at `ERROR` with no detail.
    pub fn error(&self, origin_class: &str, origin_function: &str, message: &str) {
        self.log(Severity::Error, origin_class, origin_function, message, "");
    }

    /// Delete all of this device's log entries and reset its counter.
    ///
    /// The two writes are independent; a failure between them leaves a
    /// non-zero counter over an empty collection.
    pub fn clear_logs(&self) {
        let inner = self.inner.clone();
        self.queue.dispatch(async move {
            let result = inner.clear_logs().await;
            inner.report(Operation::ClearLogs, result);
        });
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.queue.mode()
    }

    /// Stop accepting operations and wait for all submitted ones to finish.
    pub async fn shutdown(self) {
        self.queue.shutdown().await;
    }
}

impl Inner {
    async fn initialize(
        &self,
        version: Result<PackageVersion, FireLogError>,
        machine_kind: MachineKind,
    ) -> Result<(), FireLogError> {
        let device_id = self.resolver.resolve_id().await?;
        let token = self.resolver.resolve_token(false).await?;
        let version = version?;

        let record = DeviceConfig::register(device_id.clone(), token, &version, machine_kind);
        self.devices.put(&device_id, &record).await?;
        info!(
            device_id = %device_id,
            machine_kind = %machine_kind,
            version_name = %version.name,
            version_code = version.code,
            "Device registered"
        );
        Ok(())
    }

    async fn update_field(&self, field: ConfigField, value: &str) -> Result<(), FireLogError> {
        let device_id = self.resolver.resolve_id().await?;
        self.devices.patch_field(&device_id, field, value).await
    }

    async fn log(&self, mut entry: LogEntry) -> Result<LogId, FireLogError> {
        let device_id = self.resolver.resolve_id().await?;
        entry.device_id = device_id.clone();

        let log_id = self.logs.append(&device_id, entry).await?;
        self.devices.increment_total_log(&device_id).await?;
        Ok(log_id)
    }

    async fn clear_logs(&self) -> Result<(), FireLogError> {
        let device_id = self.resolver.resolve_id().await?;
        self.logs.clear(&device_id).await?;
        self.devices.reset_total_log(&device_id).await
    }

    fn report(&self, operation: Operation, result: Result<(), FireLogError>) {
        let Err(error) = result else {
            return;
        };

        error!(operation = %operation, error = %error, "FireLog operation failed");
        if let Some(observer) = &self.observer {
            observer(&Failure { operation, error });
        }
    }
}

/// Builder for [`FireLog`].
pub struct FireLogBuilder {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn RemoteStore>,
    identity_timeout: Duration,
    dispatch_mode: DispatchMode,
    queue: Option<WorkQueue>,
    observer: Option<ErrorObserver>,
}

impl FireLogBuilder {
    /// How long to wait on the identity provider per call.
    pub fn identity_timeout(mut self, timeout: Duration) -> Self {
        self.identity_timeout = timeout;
        self
    }

    /// Dispatch mode for the queue the builder creates.
    pub fn dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    /// Use an existing queue instead of creating one; overrides `dispatch_mode`.
    pub fn queue(mut self, queue: WorkQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Attach a callback that sees every swallowed failure.
    pub fn on_error<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Failure) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Build the facade.
    ///
    /// # Panics
    ///
    /// Panics when no queue was supplied and this is called outside a tokio
    /// runtime.
    pub fn build(self) -> FireLog {
        let queue = self
            .queue
            .unwrap_or_else(|| WorkQueue::new(self.dispatch_mode));

        FireLog {
            inner: Arc::new(Inner {
                resolver: IdentityResolver::new(self.identity, self.identity_timeout),
                devices: DeviceConfigStore::new(self.store.clone()),
                logs: LogStore::new(self.store),
                observer: self.observer,
            }),
            queue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentity;
    use crate::store::memory::InMemoryStore;
    use std::sync::Mutex;

    const DEVICE: &str = "cAbCdEfGhIjKlMnOpQrStU";

    fn sequential(memory: Arc<InMemoryStore>) -> FireLog {
        FireLog::builder(Arc::new(StaticIdentity::new(DEVICE, "tok")), memory)
            .dispatch_mode(DispatchMode::Sequential)
            .build()
    }

    #[tokio::test]
    async fn test_initialize_writes_registration() {
        let memory = Arc::new(InMemoryStore::new());
        let firelog = sequential(memory.clone());

        firelog.initialize(&PackageVersion::new("2.0.0", 200), MachineKind::M5Florist);
        firelog.shutdown().await;

        let config = DeviceConfigStore::new(memory)
            .get(DEVICE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(config.device_id, DEVICE);
        assert_eq!(config.auth_token, "tok");
        assert_eq!(config.app_version_name, "2.0.0");
        assert_eq!(config.app_version_code, "200");
        assert_eq!(config.machine_kind, Some(MachineKind::M5Florist));
    }

    #[tokio::test]
    async fn test_log_appends_and_counts() {
        let memory = Arc::new(InMemoryStore::new());
        let firelog = sequential(memory.clone());

        firelog.log(Severity::Error, "Payment", "charge", "declined", "code 51");
        firelog.info("Payment", "charge", "retrying");
        firelog.shutdown().await;

        let entries = LogStore::new(memory.clone()).list(DEVICE).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].severity, Severity::Error);
        assert_eq!(entries[0].detail, "code 51");
        assert_eq!(entries[0].device_id, DEVICE);
        assert_eq!(entries[1].detail, "");

        let config = DeviceConfigStore::new(memory).get(DEVICE).await.unwrap().unwrap();
        assert_eq!(config.total_log_count, 2);
    }

    #[tokio::test]
    async fn test_failures_reach_observer_not_caller() {
        let memory = Arc::new(InMemoryStore::new());
        memory.set_fail_writes(true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let firelog = FireLog::builder(Arc::new(StaticIdentity::new(DEVICE, "tok")), memory)
            .dispatch_mode(DispatchMode::Sequential)
            .on_error(move |failure| {
                sink.lock()
                    .unwrap()
                    .push((failure.operation, failure.error.is_transport()));
            })
            .build();

        firelog.update_gateway_id("GW-1");
        firelog.clear_logs();
        firelog.shutdown().await;

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (Operation::UpdateField(ConfigField::GatewayId), true),
                (Operation::ClearLogs, true),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_package_metadata_aborts_initialize() {
        let memory = Arc::new(InMemoryStore::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let firelog = FireLog::builder(Arc::new(StaticIdentity::new(DEVICE, "tok")), memory.clone())
            .dispatch_mode(DispatchMode::Sequential)
            .on_error(move |failure| {
                sink.lock().unwrap().push(matches!(
                    failure.error,
                    FireLogError::PackageMetadataUnavailable(_)
                ));
            })
            .build();

        firelog.initialize(&crate::package::DeclaredPackage::default(), MachineKind::M3);
        firelog.shutdown().await;

        assert_eq!(*seen.lock().unwrap(), vec![true]);
        assert_eq!(memory.snapshot(), serde_json::Value::Null);
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(
            Operation::UpdateField(ConfigField::KioskSerialNumber).to_string(),
            "update kioskSerialNumber"
        );
        assert_eq!(Operation::ClearLogs.to_string(), "clear logs");
    }
}
