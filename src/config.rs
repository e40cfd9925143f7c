//! Configuration module for the FireLog client.
//!
//! This module provides environment-based configuration: the realtime
//! database endpoint and credential, timeouts, background dispatch mode, and
//! the optional Firebase Installations project used for device identity.

use std::env;
use std::time::Duration;

use crate::queue::DispatchMode;

/// Default HTTP request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default identity provider timeout in seconds
const DEFAULT_IDENTITY_TIMEOUT_SECS: u64 = 15;

/// Minimum accepted timeout
const MIN_TIMEOUT_SECS: u64 = 1;

/// Maximum accepted timeout
const MAX_TIMEOUT_SECS: u64 = 300;

/// Firebase project settings needed to register an installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationsConfig {
    pub project_id: String,
    pub api_key: String,
    pub app_id: String,
}

/// Configuration for the FireLog client.
///
/// All settings can be configured via environment variables:
/// - `FIRELOG_DATABASE_URL`: Realtime database URL (no default; unset means dry run)
/// - `FIRELOG_DATABASE_AUTH`: Credential sent as the `auth` query parameter
/// - `FIRELOG_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 30)
/// - `FIRELOG_IDENTITY_TIMEOUT_SECS`: Identity provider timeout (default: 15)
/// - `FIRELOG_DISPATCH`: `concurrent` or `sequential` (default: concurrent)
/// - `FIRELOG_PROJECT_ID`, `FIRELOG_API_KEY`, `FIRELOG_APP_ID`: Installations project
/// - `FIRELOG_DEVICE_ID`: Fixed device id, or the id to re-register
/// - `FIRELOG_APP_VERSION_NAME`, `FIRELOG_APP_VERSION_CODE`: Host application version
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the realtime database, without trailing slash
    pub database_url: Option<String>,

    /// Database secret or ID token appended to every request
    pub database_auth: Option<String>,

    /// HTTP request timeout duration
    pub request_timeout: Duration,

    /// How long to wait on the identity provider
    pub identity_timeout: Duration,

    /// How background operations are scheduled
    pub dispatch_mode: DispatchMode,

    /// Installations project, when identity comes from Firebase
    pub installations: Option<InstallationsConfig>,

    /// Fixed device id
    pub device_id: Option<String>,

    /// Host application version name
    pub app_version_name: Option<String>,

    /// Host application version code
    pub app_version_code: Option<String>,
}

/// Error type for configuration loading failures
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - a timeout is not a valid number or is outside 1..=300 seconds
    /// - `FIRELOG_DISPATCH` is not `concurrent` or `sequential`
    /// - only some of the installations project variables are set
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use firelog::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Database: {:?}", config.database_url);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = non_empty("FIRELOG_DATABASE_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string());

        let request_timeout = Self::parse_timeout(
            "FIRELOG_REQUEST_TIMEOUT_SECS",
            lookup("FIRELOG_REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;

        let identity_timeout = Self::parse_timeout(
            "FIRELOG_IDENTITY_TIMEOUT_SECS",
            lookup("FIRELOG_IDENTITY_TIMEOUT_SECS"),
            DEFAULT_IDENTITY_TIMEOUT_SECS,
        )?;

        let dispatch_mode = match non_empty("FIRELOG_DISPATCH") {
            Some(value) => value.parse().map_err(|message| ConfigError {
                message,
                env_var: Some("FIRELOG_DISPATCH".to_string()),
            })?,
            None => DispatchMode::default(),
        };

        let installations = Self::parse_installations(
            non_empty("FIRELOG_PROJECT_ID"),
            non_empty("FIRELOG_API_KEY"),
            non_empty("FIRELOG_APP_ID"),
        )?;

        Ok(Self {
            database_url,
            database_auth: non_empty("FIRELOG_DATABASE_AUTH"),
            request_timeout,
            identity_timeout,
            dispatch_mode,
            installations,
            device_id: non_empty("FIRELOG_DEVICE_ID"),
            app_version_name: non_empty("FIRELOG_APP_VERSION_NAME"),
            app_version_code: non_empty("FIRELOG_APP_VERSION_CODE"),
        })
    }

    /// Parse a timeout in seconds with range validation.
    fn parse_timeout(
        env_var: &str,
        value: Option<String>,
        default_secs: u64,
    ) -> Result<Duration, ConfigError> {
        let Some(value) = value else {
            return Ok(Duration::from_secs(default_secs));
        };

        let secs: u64 = value.trim().parse().map_err(|_| ConfigError {
            message: format!("'{}' is not a valid number", value),
            env_var: Some(env_var.to_string()),
        })?;

        if secs < MIN_TIMEOUT_SECS {
            return Err(ConfigError {
                message: format!("timeout {} is below minimum ({}s)", secs, MIN_TIMEOUT_SECS),
                env_var: Some(env_var.to_string()),
            });
        }

        if secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError {
                message: format!("timeout {} exceeds maximum ({}s)", secs, MAX_TIMEOUT_SECS),
                env_var: Some(env_var.to_string()),
            });
        }

        Ok(Duration::from_secs(secs))
    }

    fn parse_installations(
        project_id: Option<String>,
        api_key: Option<String>,
        app_id: Option<String>,
    ) -> Result<Option<InstallationsConfig>, ConfigError> {
        match (project_id, api_key, app_id) {
            (Some(project_id), Some(api_key), Some(app_id)) => Ok(Some(InstallationsConfig {
                project_id,
                api_key,
                app_id,
            })),
            (None, None, None) => Ok(None),
            _ => Err(ConfigError {
                message: "FIRELOG_PROJECT_ID, FIRELOG_API_KEY and FIRELOG_APP_ID must be set together"
                    .to_string(),
                env_var: None,
            }),
        }
    }
}

impl Default for Config {
    /// Create a default configuration with no remote endpoint.
    fn default() -> Self {
        Self {
            database_url: None,
            database_auth: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            identity_timeout: Duration::from_secs(DEFAULT_IDENTITY_TIMEOUT_SECS),
            dispatch_mode: DispatchMode::default(),
            installations: None,
            device_id: None,
            app_version_name: None,
            app_version_code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    // Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let original = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.original {
                Some(val) => env::set_var(&self.key, val),
                None => env::remove_var(&self.key),
            }
        }
    }

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database_url.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.identity_timeout, Duration::from_secs(15));
        assert_eq!(config.dispatch_mode, DispatchMode::Concurrent);
    }

    #[test]
    fn test_config_with_defaults() {
        let config = load(&[]).expect("Should load with defaults");
        assert!(config.database_url.is_none());
        assert!(config.installations.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_custom_values() {
        let config = load(&[
            ("FIRELOG_DATABASE_URL", "https://fleet-default-rtdb.firebaseio.com/"),
            ("FIRELOG_DATABASE_AUTH", "secret"),
            ("FIRELOG_REQUEST_TIMEOUT_SECS", "10"),
            ("FIRELOG_DISPATCH", "sequential"),
            ("FIRELOG_DEVICE_ID", "fid-123"),
        ])
        .expect("Should load custom values");

        // Trailing slash removed
        assert_eq!(
            config.database_url.as_deref(),
            Some("https://fleet-default-rtdb.firebaseio.com")
        );
        assert_eq!(config.database_auth.as_deref(), Some("secret"));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.dispatch_mode, DispatchMode::Sequential);
        assert_eq!(config.device_id.as_deref(), Some("fid-123"));
    }

    #[test]
    fn test_invalid_timeout() {
        let err = load(&[("FIRELOG_REQUEST_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(err.message.contains("not a valid number"));
        assert_eq!(err.env_var.as_deref(), Some("FIRELOG_REQUEST_TIMEOUT_SECS"));
    }

    #[test]
    fn test_timeout_bounds() {
        let err = load(&[("FIRELOG_IDENTITY_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(err.message.contains("below minimum"));

        let err = load(&[("FIRELOG_IDENTITY_TIMEOUT_SECS", "999")]).unwrap_err();
        assert!(err.message.contains("exceeds maximum"));
    }

    #[test]
    fn test_invalid_dispatch_mode() {
        let err = load(&[("FIRELOG_DISPATCH", "parallel")]).unwrap_err();
        assert_eq!(err.env_var.as_deref(), Some("FIRELOG_DISPATCH"));
    }

    #[test]
    fn test_installations_all_or_nothing() {
        let config = load(&[
            ("FIRELOG_PROJECT_ID", "vending-fleet"),
            ("FIRELOG_API_KEY", "key"),
            ("FIRELOG_APP_ID", "1:123:android:abc"),
        ])
        .unwrap();
        assert_eq!(
            config.installations.map(|i| i.project_id),
            Some("vending-fleet".to_string())
        );

        let err = load(&[("FIRELOG_PROJECT_ID", "vending-fleet")]).unwrap_err();
        assert!(err.message.contains("must be set together"));
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        let _guard = EnvGuard::set("FIRELOG_APP_VERSION_NAME", "3.1.4");

        let config = Config::from_env().expect("Should load from env");
        assert_eq!(config.app_version_name.as_deref(), Some("3.1.4"));
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError {
            message: "test error".to_string(),
            env_var: Some("TEST_VAR".to_string()),
        };
        assert_eq!(
            format!("{}", error),
            "Configuration error for TEST_VAR: test error"
        );

        let error_no_var = ConfigError {
            message: "general error".to_string(),
            env_var: None,
        };
        assert_eq!(
            format!("{}", error_no_var),
            "Configuration error: general error"
        );
    }
}
