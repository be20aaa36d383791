//! Service configuration.
//!
//! Every knob lives in [`ServiceConfig`], built once at startup via
//! [`ServiceConfigBuilder`] and handed to the model client and the server.
//! Nothing below this module reads the process environment; the binary is
//! the only place where flags, `.env` and environment variables are merged.

use crate::error::InvoiceQaError;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8501";

/// Provider handled by the built-in Gemini REST client.
pub const GEMINI_PROVIDER: &str = "gemini";

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// An API credential. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key; blank strings are treated as "no key".
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Configuration for the invoice question-answering service.
///
/// # Example
/// ```rust
/// use invoice_qa::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .model("gemini-1.5-pro")
///     .api_key("my-key")
///     .api_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "gemini-1.5-pro");
/// ```
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the HTTP server listens on. Default: `127.0.0.1:8501`.
    pub bind_addr: SocketAddr,

    /// Model provider. `"gemini"` uses the built-in REST client; any other
    /// name is resolved through `edgequake_llm::ProviderFactory`, which reads
    /// that provider's own key variable. Default: `"gemini"`.
    pub provider: String,

    /// Model identifier. Default: `gemini-1.5-flash`.
    pub model: String,

    /// Credential for the Gemini API. Absence is reported on the first model
    /// call, not at startup.
    pub api_key: Option<ApiKey>,

    /// Base URL of the Gemini API. Overridable for proxies and tests.
    pub api_base_url: String,

    /// Sampling temperature (0.0–2.0). `None` leaves the model default.
    pub temperature: Option<f32>,

    /// Cap on generated tokens. `None` leaves the model default.
    pub max_output_tokens: Option<u32>,

    /// Per-call timeout for the model request in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Largest accepted request body. Default: 20 MiB, Gemini's cap on
    /// inline request payloads.
    pub max_upload_bytes: usize,

    /// Directory containing the pdfium shared library. `None` searches the
    /// system library path.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Replacement for the built-in system instruction.
    pub system_instruction: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8501)),
            provider: GEMINI_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            temperature: None,
            max_output_tokens: None,
            api_timeout_secs: 60,
            max_upload_bytes: 20 * 1024 * 1024,
            pdfium_lib_path: None,
            system_instruction: None,
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn is_gemini(&self) -> bool {
        self.provider.eq_ignore_ascii_case(GEMINI_PROVIDER)
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.config.provider = provider.into().trim().to_lowercase();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into().trim().to_string();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = ApiKey::new(key);
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = Some(n);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.system_instruction = Some(instruction.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, InvoiceQaError> {
        let c = &self.config;
        if c.provider.is_empty() {
            return Err(InvoiceQaError::InvalidConfig(
                "Provider name must not be empty".into(),
            ));
        }
        if c.model.is_empty() {
            return Err(InvoiceQaError::InvalidConfig(
                "Model name must not be empty".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(InvoiceQaError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(InvoiceQaError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        if !(c.api_base_url.starts_with("http://") || c.api_base_url.starts_with("https://")) {
            return Err(InvoiceQaError::InvalidConfig(format!(
                "API base URL must be http(s), got '{}'",
                c.api_base_url
            )));
        }
        if matches!(c.system_instruction.as_deref(), Some(s) if s.trim().is_empty()) {
            return Err(InvoiceQaError::InvalidConfig(
                "System instruction override must not be blank".into(),
            ));
        }
        Ok(self.config)
    }
}
