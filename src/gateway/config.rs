//! Connection settings for the completion endpoint.
//!
//! Built once per process and handed to [`OpenAiAdapter`](super::openai::OpenAiAdapter),
//! which owns the single HTTP client every call in a batch goes through.

use std::path::PathBuf;
use std::time::Duration;

use super::error::ProviderError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    /// Extra PEM root certificates trusted in addition to the built-in roots.
    pub cert_bundle: Option<PathBuf>,
    /// Transport-level timeout applied by the HTTP client.
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            cert_bundle: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read settings from the environment.
    ///
    /// `OPENAI_API_KEY` is required; `OPENAI_BASE_URL`, `OPENAI_CA_BUNDLE` and
    /// `OPENAI_TIMEOUT_SECONDS` are optional.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::config("OPENAI_API_KEY not set"))?;

        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());

        let cert_bundle = std::env::var_os("OPENAI_CA_BUNDLE").map(PathBuf::from);

        let timeout = std::env::var("OPENAI_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        Ok(Self {
            api_key,
            base_url,
            cert_bundle,
            timeout,
        })
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn cert_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_bundle = Some(path.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load the configured PEM bundle, if any.
    pub(crate) fn root_certificates(&self) -> Result<Vec<reqwest::Certificate>, ProviderError> {
        let Some(path) = &self.cert_bundle else {
            return Ok(Vec::new());
        };
        let pem = std::fs::read(path).map_err(|e| {
            ProviderError::config(format!("cannot read cert bundle {}: {e}", path.display()))
        })?;
        reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
            ProviderError::config(format!("invalid cert bundle {}: {e}", path.display()))
        })
    }
}

// Keep the key out of debug output.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("cert_bundle", &self.cert_bundle)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_openai() {
        let cfg = ClientConfig::new("sk-test");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);
        assert!(cfg.root_certificates().unwrap().is_empty());
    }

    #[test]
    fn debug_output_redacts_key() {
        let cfg = ClientConfig::new("sk-very-secret");
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn missing_cert_bundle_is_config_error() {
        let cfg = ClientConfig::new("sk-test").cert_bundle("/definitely/not/here.pem");
        let err = cfg.root_certificates().unwrap_err();
        assert_eq!(err.code(), "config_error");
    }
}
