//! Kiosk configuration.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. built-in defaults,
//! 2. a JSON file named by `SEMAFORO_CONFIG` (optional),
//! 3. the `SEMAFORO_API_KEY` and `SEMAFORO_SERVICE_URL` environment variables.
//!
//! There is no built-in API key; loading fails until one is supplied.
//!
//! ```json
//! {
//!   "service_url": "https://example.org/api/generate-qr-code",
//!   "api_key": "kiosk-key",
//!   "profile": "passive",
//!   "backend": "serial",
//!   "max_startup_attempts": 6
//! }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use semaforo_core::constants::{
    DEFAULT_SERVICE_URL, REQUEST_TIMEOUT_MS, RETRY_DELAY_MS, STARTUP_DELAY_MS,
};
use semaforo_core::{Error, Result};
use semaforo_hardware::SupervisorConfig;
use semaforo_network::DecisionConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Names the JSON config file.
pub const CONFIG_PATH_ENV: &str = "SEMAFORO_CONFIG";

/// Overrides `api_key`.
pub const API_KEY_ENV: &str = "SEMAFORO_API_KEY";

/// Overrides `service_url`.
pub const SERVICE_URL_ENV: &str = "SEMAFORO_SERVICE_URL";

/// Link profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkProfile {
    /// Handshake probing, bounded automatic retries.
    #[default]
    Strict,

    /// Accept the first endpoint that opens, one automatic search.
    Passive,
}

/// Which port backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Host serial ports.
    #[default]
    Serial,

    /// No ports at all; the kiosk runs on the simulated link.
    Mock,
}

/// Complete kiosk configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    pub service_url: String,
    pub api_key: String,
    pub profile: LinkProfile,
    pub backend: BackendKind,
    pub request_timeout_ms: u64,
    pub startup_delay_ms: u64,
    pub retry_delay_ms: u64,

    /// Overrides the profile's automatic attempt count.
    pub max_startup_attempts: Option<u32>,
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            api_key: String::new(),
            profile: LinkProfile::default(),
            backend: BackendKind::default(),
            request_timeout_ms: REQUEST_TIMEOUT_MS,
            startup_delay_ms: STARTUP_DELAY_MS,
            retry_delay_ms: RETRY_DELAY_MS,
            max_startup_attempts: None,
        }
    }
}

impl KioskConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `SEMAFORO_CONFIG` names a file that cannot be read
    /// or parsed, or if the result fails validation.
    pub fn load() -> Result<Self> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` in place of the process environment.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) => Self::from_path(&path)?,
            None => Self::default(),
        };

        if let Some(api_key) = lookup(API_KEY_ENV) {
            config.api_key = api_key;
        }
        if let Some(url) = lookup(SERVICE_URL_ENV) {
            config.service_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Reading configuration");

        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse a JSON config document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Check the settings the kiosk cannot run without.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a non-http(s) service URL, an empty API
    /// key, a zero request timeout or zero startup attempts.
    pub fn validate(&self) -> Result<()> {
        let url = self.service_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "service_url must be an http(s) URL, got {:?}",
                self.service_url
            )));
        }
        if self.api_key.trim().is_empty() {
            return Err(Error::Config(format!(
                "api_key is required; set it in the config file or {API_KEY_ENV}"
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".to_string()));
        }
        if self.max_startup_attempts == Some(0) {
            return Err(Error::Config(
                "max_startup_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        let mut config = match self.profile {
            LinkProfile::Strict => SupervisorConfig::strict(),
            LinkProfile::Passive => SupervisorConfig::passive(),
        };

        config.startup_delay = Duration::from_millis(self.startup_delay_ms);
        config.retry_delay = Duration::from_millis(self.retry_delay_ms);
        if let Some(attempts) = self.max_startup_attempts {
            config.max_startup_attempts = attempts;
        }
        config
    }

    pub fn decision_config(&self) -> DecisionConfig {
        DecisionConfig {
            service_url: self.service_url.trim().to_string(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semaforo_core::constants::MAX_STARTUP_ATTEMPTS;
    use semaforo_hardware::ProbeStrategy;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = KioskConfig {
            api_key: "kiosk-key".to_string(),
            ..KioskConfig::default()
        };
        assert_eq!(config.profile, LinkProfile::Strict);
        assert_eq!(config.backend, BackendKind::Serial);
        assert!(config.validate().is_ok());

        let supervisor = config.supervisor_config();
        assert_eq!(supervisor, SupervisorConfig::strict());

        let decision = config.decision_config();
        assert_eq!(decision.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = KioskConfig::from_json(r#"{"profile": "passive", "api_key": "k"}"#).unwrap();
        assert_eq!(config.profile, LinkProfile::Passive);
        assert_eq!(config.api_key, "k");
        assert_eq!(config.retry_delay_ms, 2000);

        let supervisor = config.supervisor_config();
        assert_eq!(supervisor.probe.strategy, ProbeStrategy::Passive);
        assert_eq!(supervisor.max_startup_attempts, 1);
    }

    #[test]
    fn test_attempt_override() {
        let config = KioskConfig::from_json(r#"{"max_startup_attempts": 3}"#).unwrap();
        assert_eq!(config.supervisor_config().max_startup_attempts, 3);
    }

    #[test]
    fn test_invalid_json() {
        let error = KioskConfig::from_json(r#"{"profile": "turbo"}"#).unwrap_err();
        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let config = KioskConfig::load_with(env(&[
            (API_KEY_ENV, "secret"),
            (SERVICE_URL_ENV, "http://localhost:8080/api"),
        ]))
        .unwrap();

        assert_eq!(config.api_key, "secret");
        assert_eq!(config.decision_config().service_url, "http://localhost:8080/api");
    }

    #[test]
    fn test_file_then_env() {
        let path = std::env::temp_dir().join(format!(
            "semaforo-config-{}.json",
            std::process::id()
        ));
        fs::write(&path, r#"{"api_key": "from-file", "backend": "mock"}"#).unwrap();

        let path_str = path.to_string_lossy().into_owned();
        let config = KioskConfig::load_with(env(&[
            (CONFIG_PATH_ENV, path_str.as_str()),
            (API_KEY_ENV, "from-env"),
        ]))
        .unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(config.api_key, "from-env");
        assert_eq!(config.backend, BackendKind::Mock);
    }

    #[test]
    fn test_missing_api_key_is_rejected() {
        let error = KioskConfig::default().validate().unwrap_err();
        assert!(matches!(error, Error::Config(ref message) if message.contains("api_key")));

        let error = KioskConfig::load_with(env(&[])).unwrap_err();
        assert!(matches!(error, Error::Config(_)));

        let error = KioskConfig::load_with(env(&[(API_KEY_ENV, "   ")])).unwrap_err();
        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let error = KioskConfig::load_with(env(&[(CONFIG_PATH_ENV, "/nonexistent/semaforo.json")]))
            .unwrap_err();
        assert!(matches!(error, Error::Io(_)));
    }

    #[test]
    fn test_validation() {
        let mut config = KioskConfig {
            service_url: "ftp://example.org".to_string(),
            api_key: "kiosk-key".to_string(),
            ..KioskConfig::default()
        };
        assert!(config.validate().is_err());

        config.service_url = DEFAULT_SERVICE_URL.to_string();
        config.max_startup_attempts = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_strict_profile_attempts() {
        assert_eq!(
            KioskConfig::default().supervisor_config().max_startup_attempts,
            MAX_STARTUP_ATTEMPTS
        );
    }
}
