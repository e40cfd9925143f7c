//! Identity provider backed by the Firebase Installations REST API.
//!
//! On first use the provider registers an installation id (FID) with the
//! project and keeps the returned refresh token in memory. Auth tokens are
//! regenerated from the refresh token when forced or close to expiry.
//!
//! The FID is chosen when the provider is built, so a registration that is
//! interrupted and retried still asks for the same id.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::InstallationsConfig;
use crate::error::FireLogError;
use crate::identity::IdentityProvider;

/// Base URL of the installations service.
pub const DEFAULT_INSTALLATIONS_URL: &str = "https://firebaseinstallations.googleapis.com/v1";

const AUTH_VERSION: &str = "FIS_v2";

/// Tokens this close to expiry are regenerated.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 3600;

const FID_LEN: usize = 22;

#[derive(Debug, Clone)]
struct Installation {
    fid: String,
    refresh_token: String,
    auth_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    fid: &'a str,
    app_id: &'a str,
    auth_version: &'a str,
    sdk_version: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    fid: Option<String>,
    refresh_token: String,
    auth_token: AuthToken,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthToken {
    token: String,
    expires_in: String,
}

/// Installation identity provider talking to Firebase Installations.
pub struct InstallationsProvider {
    client: Client,
    base_url: String,
    project_id: String,
    api_key: String,
    app_id: String,
    sdk_version: String,
    fid: String,
    state: Mutex<Option<Installation>>,
}

impl InstallationsProvider {
    /// Create a provider for the given project.
    ///
    /// `preferred_fid` re-registers a previously issued id so the device keeps
    /// its identity across restarts; without it a fresh id is generated.
    ///
    /// # Errors
    ///
    /// Returns `IdentityUnavailable` if the HTTP client cannot be built.
    pub fn new(
        config: &InstallationsConfig,
        preferred_fid: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FireLogError> {
        Self::with_base_url(DEFAULT_INSTALLATIONS_URL, config, preferred_fid, timeout)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        config: &InstallationsConfig,
        preferred_fid: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FireLogError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FireLogError::IdentityUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            api_key: config.api_key.clone(),
            app_id: config.app_id.clone(),
            sdk_version: format!("r:firelog-{}", env!("CARGO_PKG_VERSION")),
            fid: preferred_fid.unwrap_or_else(generate_fid),
            state: Mutex::new(None),
        })
    }

    fn installations_url(&self) -> String {
        format!("{}/projects/{}/installations", self.base_url, self.project_id)
    }

    async fn register(&self) -> Result<Installation, FireLogError> {
        let body = RegisterRequest {
            fid: &self.fid,
            app_id: &self.app_id,
            auth_version: AUTH_VERSION,
            sdk_version: &self.sdk_version,
        };

        let response = self
            .client
            .post(self.installations_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(identity_error)?;

        let status = response.status();
        let text = response.text().await.map_err(identity_error)?;
        if !status.is_success() {
            return Err(FireLogError::IdentityUnavailable(format!(
                "installation registration rejected ({}): {}",
                status, text
            )));
        }

        let registered: RegisterResponse = serde_json::from_str(&text)
            .map_err(|e| FireLogError::IdentityUnavailable(e.to_string()))?;
        let fid = registered.fid.unwrap_or_else(|| self.fid.clone());
        info!(fid = %fid, "Registered installation");

        Ok(Installation {
            fid,
            refresh_token: registered.refresh_token,
            expires_at: expiry_from(&registered.auth_token.expires_in)?,
            auth_token: registered.auth_token.token,
        })
    }

    async fn generate_token(&self, installation: &Installation) -> Result<AuthToken, FireLogError> {
        let url = format!(
            "{}/{}/authTokens:generate",
            self.installations_url(),
            installation.fid
        );

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header(
                "Authorization",
                format!("{} {}", AUTH_VERSION, installation.refresh_token),
            )
            .json(&json!({ "installation": { "sdkVersion": self.sdk_version } }))
            .send()
            .await
            .map_err(identity_error)?;

        let status = response.status();
        let text = response.text().await.map_err(identity_error)?;
        if !status.is_success() {
            return Err(FireLogError::IdentityUnavailable(format!(
                "auth token generation rejected ({}): {}",
                status, text
            )));
        }

        serde_json::from_str(&text).map_err(|e| FireLogError::IdentityUnavailable(e.to_string()))
    }

    /// The cached installation, registering one first if needed.
    async fn cached_or_register(
        &self,
        state: &mut Option<Installation>,
    ) -> Result<Installation, FireLogError> {
        if let Some(installation) = state {
            return Ok(installation.clone());
        }
        let installation = self.register().await?;
        *state = Some(installation.clone());
        Ok(installation)
    }
}

#[async_trait]
impl IdentityProvider for InstallationsProvider {
    async fn installation_id(&self) -> Result<String, FireLogError> {
        let mut state = self.state.lock().await;
        Ok(self.cached_or_register(&mut state).await?.fid)
    }

    async fn auth_token(&self, force_refresh: bool) -> Result<String, FireLogError> {
        let mut state = self.state.lock().await;
        let installation = self.cached_or_register(&mut state).await?;

        let stale =
            installation.expires_at <= Utc::now() + TimeDelta::seconds(TOKEN_REFRESH_MARGIN_SECS);
        if !force_refresh && !stale {
            return Ok(installation.auth_token);
        }

        // The cache keeps the old token until the new one has fully arrived
        debug!(fid = %installation.fid, force_refresh, "Generating installation auth token");
        let token = self.generate_token(&installation).await?;
        let expires_at = expiry_from(&token.expires_in)?;
        if let Some(cached) = &mut *state {
            cached.auth_token = token.token.clone();
            cached.expires_at = expires_at;
        }
        Ok(token.token)
    }
}

fn identity_error(err: reqwest::Error) -> FireLogError {
    FireLogError::IdentityUnavailable(err.to_string())
}

/// Generate a new installation id.
///
/// 17 random bytes with the top four bits of the first byte set to `0111`,
/// base64url encoded and cut to 22 characters.
pub fn generate_fid() -> String {
    let mut bytes = [0u8; 17];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes[0] = 0b0111_0000 | (bytes[0] & 0b0000_1111);
    let mut encoded = URL_SAFE_NO_PAD.encode(bytes);
    encoded.truncate(FID_LEN);
    encoded
}

/// Parse an `expiresIn` duration such as `"604800s"` into an absolute time.
fn expiry_from(expires_in: &str) -> Result<DateTime<Utc>, FireLogError> {
    let invalid =
        || FireLogError::IdentityUnavailable(format!("invalid token lifetime '{}'", expires_in));

    let secs = expires_in
        .trim()
        .trim_end_matches('s')
        .parse::<f64>()
        .map_err(|_| invalid())?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(invalid());
    }

    TimeDelta::try_milliseconds((secs * 1000.0) as i64)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(invalid)
}
