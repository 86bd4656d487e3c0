//! HTTP client for the decision service.
//!
//! One button press means one `GET` to the service with the kiosk's API key as
//! a query parameter:
//!
//! ```text
//! GET <service_url>?api_key=<key>      (10 s timeout)
//!     200 + {"success": true, ...}  ──► Decision
//!     200 + {"success": false}      ──► DecisionError::Rejected
//!     other status                  ──► DecisionError::Status(code)
//!     no answer / bad body          ──► Timeout | Transport | InvalidBody
//! ```
//!
//! The client does not retry. A failed request is reported once and the
//! kiosk waits for the next press.
//!
//! # Example Usage
//!
//! ```no_run
//! use semaforo_network::{DecisionClient, DecisionConfig, DecisionService};
//!
//! # async fn example() -> semaforo_network::Result<()> {
//! let config = DecisionConfig {
//!     api_key: "kiosk-key".to_string(),
//!     ..DecisionConfig::default()
//! };
//!
//! let client = DecisionClient::new(config)?;
//! let decision = client.request_decision().await?;
//! println!("{}", decision.status());
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use semaforo_core::constants::{API_KEY_PARAM, DEFAULT_SERVICE_URL, REQUEST_TIMEOUT_MS};
use tracing::{debug, info, warn};

use crate::decision::{Decision, DecisionResponse};
use crate::error::{DecisionError, Result};

/// Configuration for the decision client
///
/// # Example
///
/// ```
/// use semaforo_network::DecisionConfig;
/// use std::time::Duration;
///
/// let config = DecisionConfig {
///     service_url: "http://127.0.0.1:8080/api/generate-qr-code".to_string(),
///     api_key: "test".to_string(),
///     timeout: Duration::from_secs(2),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionConfig {
    /// Full URL of the decision endpoint
    pub service_url: String,

    /// Sent as the `api_key` query parameter
    pub api_key: String,

    /// Whole-request timeout
    pub timeout: Duration,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            api_key: String::new(),
            timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
        }
    }
}

/// Source of decisions.
///
/// Implemented by [`DecisionClient`]; tests substitute scripted services.
pub trait DecisionService: Send + Sync {
    /// Ask for one decision.
    fn request_decision(&self) -> impl Future<Output = Result<Decision>> + Send;
}

/// Decision service client over HTTP.
#[derive(Debug, Clone)]
pub struct DecisionClient {
    client: Client,
    config: DecisionConfig,
}

impl DecisionClient {
    /// Creates a client whose requests time out after `config.timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: DecisionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DecisionError::transport(e.to_string()))?;

        Ok(Self::with_client(client, config))
    }

    /// Creates a client around a pre-configured HTTP client.
    pub fn with_client(client: Client, config: DecisionConfig) -> Self {
        if config.api_key.is_empty() {
            warn!("Decision client has no API key configured");
        }
        Self { client, config }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    async fn fetch(&self) -> Result<Decision> {
        debug!(url = %self.config.service_url, "Requesting decision");

        let response = self
            .client
            .get(&self.config.service_url)
            .query(&[(API_KEY_PARAM, self.config.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "Decision service returned an error status");
            return Err(DecisionError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let document: DecisionResponse = serde_json::from_slice(&body)
            .map_err(|e| DecisionError::invalid_body(e.to_string()))?;

        let decision = Decision::from_response(document)?;
        info!(
            command = decision.result_command.as_wire(),
            is_green = decision.is_green,
            has_image = decision.qr_image.is_some(),
            "Decision received"
        );
        Ok(decision)
    }
}

impl DecisionService for DecisionClient {
    async fn request_decision(&self) -> Result<Decision> {
        self.fetch()
            .await
            .inspect_err(|e| warn!("Decision request failed: {}", e))
    }
}
