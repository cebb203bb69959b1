//! Classifier configuration resolution
//!
//! Priority: explicit argument → environment → TOML → default.

use std::time::Duration;
use tracing::{info, warn};
use tunnel_common::config::TomlConfig;
use tunnel_common::{Error, Result};

pub const CLASSIFIER_URL_ENV: &str = "TUNNEL_CLASSIFIER_URL";
pub const CLASSIFIER_TIMEOUT_ENV: &str = "TUNNEL_CLASSIFIER_TIMEOUT_SECS";
pub const CLASSIFIER_API_KEY_ENV: &str = "TUNNEL_CLASSIFIER_API_KEY";

pub const DEFAULT_CLASSIFIER_ENDPOINT: &str = "http://127.0.0.1:8000/api/ml-analysis";
pub const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 30;

/// Resolved classifier connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierSettings {
    pub endpoint: String,
    /// Upper bound on one classifier call
    pub timeout: Duration,
    pub api_key: Option<String>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CLASSIFIER_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_CLASSIFIER_TIMEOUT_SECS),
            api_key: None,
        }
    }
}

impl ClassifierSettings {
    /// Resolve settings from an explicit endpoint, the environment and TOML
    ///
    /// A timeout of zero, or an unparseable `TUNNEL_CLASSIFIER_TIMEOUT_SECS`,
    /// is a configuration error.
    pub fn resolve(explicit_endpoint: Option<&str>, toml_config: &TomlConfig) -> Result<Self> {
        let env_endpoint = non_blank_env(CLASSIFIER_URL_ENV);
        let toml_endpoint = toml_config
            .classifier
            .endpoint
            .as_deref()
            .filter(|v| is_present(v))
            .map(str::to_string);
        let explicit_endpoint = explicit_endpoint.filter(|v| is_present(v)).map(str::to_string);

        let mut sources = Vec::new();
        if explicit_endpoint.is_some() {
            sources.push("argument");
        }
        if env_endpoint.is_some() {
            sources.push("environment");
        }
        if toml_endpoint.is_some() {
            sources.push("TOML");
        }
        if sources.len() > 1 {
            warn!(
                "Classifier endpoint found in multiple sources: {}. Using {} (highest priority).",
                sources.join(", "),
                sources[0]
            );
        }

        let endpoint = match explicit_endpoint.or(env_endpoint).or(toml_endpoint) {
            Some(endpoint) => {
                info!("Classifier endpoint loaded from {}", sources[0]);
                endpoint
            }
            None => DEFAULT_CLASSIFIER_ENDPOINT.to_string(),
        };

        let timeout_secs = match non_blank_env(CLASSIFIER_TIMEOUT_ENV) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                Error::Config(format!("{} must be a whole number of seconds: {}", CLASSIFIER_TIMEOUT_ENV, e))
            })?,
            None => toml_config
                .classifier
                .timeout_secs
                .unwrap_or(DEFAULT_CLASSIFIER_TIMEOUT_SECS),
        };
        if timeout_secs == 0 {
            return Err(Error::Config("Classifier timeout must be at least 1 second".to_string()));
        }

        let api_key = non_blank_env(CLASSIFIER_API_KEY_ENV).or_else(|| {
            toml_config
                .classifier
                .api_key
                .clone()
                .filter(|v| is_present(v))
        });

        Ok(Self {
            endpoint,
            timeout: Duration::from_secs(timeout_secs),
            api_key,
        })
    }
}

fn is_present(value: &str) -> bool {
    !value.trim().is_empty()
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| is_present(v))
}
