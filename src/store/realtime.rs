//! Firebase Realtime Database REST backend.
//!
//! Every node is addressed as `{database_url}{path}.json`, with each key
//! percent-encoded as its own path segment. Writes use
//! `print=silent` so the server answers `204 No Content`. Atomic increments
//! go through the `{".sv": {"increment": n}}` server value. Push keys are
//! minted client-side, so a key exists before any request is made.
//! Failed requests are not retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::Config;
use crate::error::FireLogError;
use crate::push_id::PushIdGenerator;
use crate::store::{DbPath, RemoteStore};

/// HTTP client for one realtime database instance.
///
/// The underlying `reqwest::Client` is reused for connection pooling.
///
/// # Example
///
/// ```no_run
/// use firelog::store::realtime::RealtimeDatabase;
/// use firelog::store::{vending_machine_path, RemoteStore};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let db = RealtimeDatabase::with_settings(
///         "https://fleet-default-rtdb.firebaseio.com",
///         None,
///         Duration::from_secs(30),
///     )
///     .expect("Failed to create client");
///
///     let path = vending_machine_path("cAbCdEfGhIjKlMnOpQrStU").unwrap();
///     let record = db.get(&path).await;
///     println!("{:?}", record);
/// }
/// ```
pub struct RealtimeDatabase {
    /// The underlying HTTP client (reused for connection pooling)
    client: Client,

    /// Database base URL
    base_url: Url,

    /// Credential sent as the `auth` query parameter
    auth: Option<String>,

    /// Request timeout duration
    timeout: Duration,

    push_ids: PushIdGenerator,
}

impl RealtimeDatabase {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` if no database URL is configured or the HTTP client
    /// cannot be built.
    pub fn new(config: &Config) -> Result<Self, FireLogError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| FireLogError::Config("no database URL configured".to_string()))?;
        Self::with_settings(url, config.database_auth.clone(), config.request_timeout)
    }

    /// Create a client with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns `Config` if `base_url` is not an absolute http(s) URL or the
    /// HTTP client cannot be built.
    pub fn with_settings(
        base_url: impl Into<String>,
        auth: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FireLogError> {
        let base_url = base_url.into();
        let base_url = Url::parse(&base_url).map_err(|e| {
            FireLogError::Config(format!("invalid database URL '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(FireLogError::Config(format!(
                "invalid database URL '{}'",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| FireLogError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            auth,
            timeout,
            push_ids: PushIdGenerator::new(),
        })
    }

    /// REST URL of a node.
    pub fn url_for(&self, path: &DbPath) -> Url {
        let mut url = self.base_url.clone();
        // Only cannot-be-a-base URLs refuse segments; rejected at construction
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            match path.segments().split_last() {
                Some((last, parents)) => {
                    segments.extend(parents);
                    segments.push(&format!("{}.json", last));
                }
                None => {
                    segments.push(".json");
                }
            }
        }
        url
    }

    fn request(&self, method: Method, path: &DbPath) -> RequestBuilder {
        let mut request = self
            .client
            .request(method.clone(), self.url_for(path));
        if let Some(auth) = &self.auth {
            request = request.query(&[("auth", auth.as_str())]);
        }
        if method != Method::GET {
            request = request.query(&[("print", "silent")]);
        }
        request
    }

    /// Send a single request and return the response body.
    async fn send(&self, request: RequestBuilder) -> Result<String, FireLogError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(response.text().await?)
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            Err(FireLogError::Status {
                code: status,
                message,
            })
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Body of an atomic increment write.
pub fn increment_body(delta: i64) -> Value {
    json!({ ".sv": { "increment": delta } })
}

#[async_trait]
impl RemoteStore for RealtimeDatabase {
    async fn set(&self, path: &DbPath, value: Value) -> Result<(), FireLogError> {
        debug!(path = %path, "PUT");
        self.send(self.request(Method::PUT, path).json(&value)).await?;
        Ok(())
    }

    async fn update(&self, path: &DbPath, fields: Map<String, Value>) -> Result<(), FireLogError> {
        debug!(path = %path, fields = fields.len(), "PATCH");
        self.send(self.request(Method::PATCH, path).json(&fields)).await?;
        Ok(())
    }

    async fn increment(&self, path: &DbPath, delta: i64) -> Result<(), FireLogError> {
        debug!(path = %path, delta, "PUT increment");
        self.send(self.request(Method::PUT, path).json(&increment_body(delta)))
            .await?;
        Ok(())
    }

    async fn remove(&self, path: &DbPath) -> Result<(), FireLogError> {
        debug!(path = %path, "DELETE");
        self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    async fn get(&self, path: &DbPath) -> Result<Option<Value>, FireLogError> {
        debug!(path = %path, "GET");
        let body = self.send(self.request(Method::GET, path)).await?;
        let value: Value = serde_json::from_str(&body)?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    fn mint_key(&self, _parent: &DbPath) -> Result<String, FireLogError> {
        self.push_ids.generate()
    }
}
