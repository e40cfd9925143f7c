//! Installation identity resolution.
//!
//! The device identifier returned here is the partition key for every record
//! this crate writes. The resolver itself keeps no state: each call goes back
//! to the provider, which is free to cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::FireLogError;
use crate::model::DeviceId;

/// Default time to wait for the identity provider before giving up.
pub const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_secs(15);

/// Platform source of a stable installation id and an auth token.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Stable identifier for this installation.
    async fn installation_id(&self) -> Result<String, FireLogError>;

    /// Auth token for this installation, regenerated when `force_refresh` is set.
    async fn auth_token(&self, force_refresh: bool) -> Result<String, FireLogError>;
}

/// Provider with a fixed id and token, for hosts that manage identity
/// themselves and for tests.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    id: String,
    token: String,
}

impl StaticIdentity {
    pub fn new(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn installation_id(&self) -> Result<String, FireLogError> {
        Ok(self.id.clone())
    }

    async fn auth_token(&self, _force_refresh: bool) -> Result<String, FireLogError> {
        Ok(self.token.clone())
    }
}

/// Resolves device id and token, bounding every provider call by a timeout.
#[derive(Clone)]
pub struct IdentityResolver {
    provider: Arc<dyn IdentityProvider>,
    timeout: Duration,
}

impl IdentityResolver {
    pub fn new(provider: Arc<dyn IdentityProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Resolve the stable device identifier.
    ///
    /// # Errors
    ///
    /// Returns `IdentityUnavailable` if the provider fails or times out.
    pub async fn resolve_id(&self) -> Result<DeviceId, FireLogError> {
        let id = self.bounded(self.provider.installation_id()).await?;
        if id.is_empty() {
            return Err(FireLogError::IdentityUnavailable(
                "provider returned an empty installation id".to_string(),
            ));
        }
        debug!(device_id = %id, "Resolved installation id");
        Ok(id)
    }

    /// Resolve an auth token.
    ///
    /// # Errors
    ///
    /// Returns `IdentityUnavailable` if the provider fails or times out.
    pub async fn resolve_token(&self, force_refresh: bool) -> Result<String, FireLogError> {
        self.bounded(self.provider.auth_token(force_refresh)).await
    }

    async fn bounded<F>(&self, call: F) -> Result<String, FireLogError>
    where
        F: std::future::Future<Output = Result<String, FireLogError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(FireLogError::IdentityUnavailable(e))) => {
                Err(FireLogError::IdentityUnavailable(e))
            }
            Ok(Err(e)) => Err(FireLogError::IdentityUnavailable(e.to_string())),
            Err(_) => Err(FireLogError::IdentityUnavailable(format!(
                "provider did not answer within {:?}",
                self.timeout
            ))),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProvider for CountingProvider {
        async fn installation_id(&self) -> Result<String, FireLogError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("fid-{}", n))
        }

        async fn auth_token(&self, force_refresh: bool) -> Result<String, FireLogError> {
            Ok(if force_refresh { "fresh" } else { "cached" }.to_string())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl IdentityProvider for FailingProvider {
        async fn installation_id(&self) -> Result<String, FireLogError> {
            Err(FireLogError::Timeout)
        }

        async fn auth_token(&self, _force_refresh: bool) -> Result<String, FireLogError> {
            std::future::pending::<Result<String, FireLogError>>().await
        }
    }

    #[tokio::test]
    async fn test_static_identity() {
        let resolver = IdentityResolver::new(
            Arc::new(StaticIdentity::new("fid-abc", "tok")),
            DEFAULT_IDENTITY_TIMEOUT,
        );
        assert_eq!(resolver.resolve_id().await.unwrap(), "fid-abc");
        assert_eq!(resolver.resolve_token(false).await.unwrap(), "tok");
    }

    #[tokio::test]
    async fn test_resolver_does_not_cache() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let resolver = IdentityResolver::new(provider.clone(), DEFAULT_IDENTITY_TIMEOUT);

        assert_eq!(resolver.resolve_id().await.unwrap(), "fid-0");
        assert_eq!(resolver.resolve_id().await.unwrap(), "fid-1");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.resolve_token(true).await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_provider_error_maps_to_identity_unavailable() {
        let resolver = IdentityResolver::new(Arc::new(FailingProvider), DEFAULT_IDENTITY_TIMEOUT);
        let err = resolver.resolve_id().await.unwrap_err();
        assert!(matches!(err, FireLogError::IdentityUnavailable(_)));
    }

    #[tokio::test]
    async fn test_provider_timeout() {
        let resolver =
            IdentityResolver::new(Arc::new(FailingProvider), Duration::from_millis(20));
        let err = resolver.resolve_token(false).await.unwrap_err();
        assert!(matches!(err, FireLogError::IdentityUnavailable(_)));
        assert!(err.to_string().contains("did not answer"));
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let resolver =
            IdentityResolver::new(Arc::new(StaticIdentity::new("", "")), DEFAULT_IDENTITY_TIMEOUT);
        assert!(resolver.resolve_id().await.is_err());
    }
}
