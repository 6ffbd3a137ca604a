use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::HermesError;

/// Comment body posted when no review could be generated and no message
/// template is available.
pub const DEFAULT_FALLBACK_BODY: &str = "Hi, this is a comment from the bot.";

/// Top-level configuration loaded from `.hermes.toml`.
///
/// Supports layered resolution: environment variables > config file > defaults.
/// The configuration is built once at startup and shared read-only afterwards.
///
/// # Examples
///
/// ```
/// use hermes_core::HermesConfig;
///
/// let config = HermesConfig::default();
/// assert_eq!(config.server.port, 3000);
/// assert_eq!(config.server.path, "/api/webhook");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HermesConfig {
    /// GitHub App identity and webhook secret.
    #[serde(default)]
    pub app: AppConfig,
    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Review behavior settings.
    #[serde(default)]
    pub review: ReviewConfig,
}

impl HermesConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HermesError::Io`] if the file cannot be read, or
    /// [`HermesError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use hermes_core::HermesConfig;
    /// use std::path::Path;
    ///
    /// let config = HermesConfig::from_file(Path::new(".hermes.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, HermesError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`HermesError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use hermes_core::HermesConfig;
    ///
    /// let toml = r#"
    /// [server]
    /// port = 8080
    /// "#;
    /// let config = HermesConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.server.port, 8080);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, HermesError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Override file values with environment variables.
    ///
    /// `lookup` is usually `|key| std::env::var(key).ok()`; tests pass a map.
    /// Recognized keys: `APP_ID`, `PRIVATE_KEY_PATH`, `WEBHOOK_SECRET`,
    /// `ENTERPRISE_HOSTNAME`, `PORT`, `OPENAI_KEY` (or `OPENAI_API_KEY`),
    /// `OPENAI_BASE_URL`, `HERMES_MODEL` and `MESSAGE_PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`HermesError::Config`] if a numeric variable does not parse.
    ///
    /// # Examples
    ///
    /// ```
    /// use hermes_core::HermesConfig;
    ///
    /// let mut config = HermesConfig::default();
    /// config
    ///     .apply_env(|key| (key == "PORT").then(|| "4000".to_string()))
    ///     .unwrap();
    /// assert_eq!(config.server.port, 4000);
    /// ```
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), HermesError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = non_empty("APP_ID") {
            let id = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| HermesError::Config(format!("APP_ID must be a number, got '{raw}'")))?;
            self.app.app_id = Some(id);
        }
        if let Some(path) = non_empty("PRIVATE_KEY_PATH") {
            self.app.private_key_path = Some(PathBuf::from(path));
        }
        if let Some(secret) = non_empty("WEBHOOK_SECRET") {
            self.app.webhook_secret = Some(secret);
        }
        if let Some(host) = non_empty("ENTERPRISE_HOSTNAME") {
            self.app.enterprise_hostname = Some(host);
        }
        if let Some(raw) = non_empty("PORT") {
            self.server.port = raw
                .trim()
                .parse::<u16>()
                .map_err(|_| HermesError::Config(format!("PORT must be a port number, got '{raw}'")))?;
        }
        if let Some(key) = non_empty("OPENAI_KEY").or_else(|| non_empty("OPENAI_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = non_empty("OPENAI_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(model) = non_empty("HERMES_MODEL") {
            self.llm.model = model;
        }
        if let Some(path) = non_empty("MESSAGE_PATH") {
            self.review.message_path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Check that everything the webhook server needs is present.
    ///
    /// # Errors
    ///
    /// Returns [`HermesError::Config`] naming the first missing setting.
    pub fn validate_for_server(&self) -> Result<(), HermesError> {
        if self.app.app_id.is_none() {
            return Err(HermesError::Config(
                "APP_ID not set. Set APP_ID or [app].app_id".into(),
            ));
        }
        if self.app.private_key_path.is_none() {
            return Err(HermesError::Config(
                "PRIVATE_KEY_PATH not set. Set PRIVATE_KEY_PATH or [app].private_key_path".into(),
            ));
        }
        self.app.webhook_secret()?;
        Ok(())
    }
}

/// GitHub App configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Numeric GitHub App id.
    pub app_id: Option<u64>,
    /// Path to the App's PEM-encoded private key.
    pub private_key_path: Option<PathBuf>,
    /// Shared secret used to sign webhook deliveries.
    pub webhook_secret: Option<String>,
    /// GitHub Enterprise Server hostname, if not github.com.
    pub enterprise_hostname: Option<String>,
}

impl AppConfig {
    /// REST API base URL for an Enterprise Server host, `None` for github.com.
    ///
    /// # Examples
    ///
    /// ```
    /// use hermes_core::AppConfig;
    ///
    /// let config = AppConfig {
    ///     enterprise_hostname: Some("ghe.example.com".into()),
    ///     ..AppConfig::default()
    /// };
    /// assert_eq!(config.api_base_url().as_deref(), Some("https://ghe.example.com/api/v3"));
    /// assert!(AppConfig::default().api_base_url().is_none());
    /// ```
    pub fn api_base_url(&self) -> Option<String> {
        self.enterprise_hostname
            .as_deref()
            .map(|host| format!("https://{host}/api/v3"))
    }

    /// The webhook secret, or an error if it is not configured.
    ///
    /// # Errors
    ///
    /// Returns [`HermesError::Config`] if the secret is missing or empty.
    pub fn webhook_secret(&self) -> Result<&str, HermesError> {
        match self.webhook_secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(HermesError::Config(
                "WEBHOOK_SECRET not set. Set WEBHOOK_SECRET or [app].webhook_secret".into(),
            )),
        }
    }
}

/// LLM provider configuration.
///
/// # Examples
///
/// ```
/// use hermes_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4o-mini");
/// assert!(config.store);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests (any OpenAI-compatible endpoint).
    pub base_url: Option<String>,
    /// Ask the provider to store the completion.
    #[serde(default = "default_store")]
    pub store: bool,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_store() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: None,
            store: default_store(),
        }
    }
}

/// HTTP listener configuration.
///
/// # Examples
///
/// ```
/// use hermes_core::ServerConfig;
///
/// let config = ServerConfig::default();
/// assert_eq!(config.local_url(), "http://localhost:3000/api/webhook");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on (default: 3000).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path that receives webhook deliveries (default: `/api/webhook`).
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    3000
}

fn default_path() -> String {
    "/api/webhook".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding a listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The URL to configure as a local webhook target.
    pub fn local_url(&self) -> String {
        format!("http://localhost:{}{}", self.port, self.path)
    }
}

/// Review behavior configuration.
///
/// # Examples
///
/// ```
/// use hermes_core::ReviewConfig;
///
/// let config = ReviewConfig::default();
/// assert_eq!(config.message_path.to_str(), Some("message.md"));
/// assert_eq!(config.dedupe_ttl_secs, 3600);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Markdown template posted when no review could be generated.
    #[serde(default = "default_message_path")]
    pub message_path: PathBuf,
    /// How long a delivery id is remembered for redelivery suppression.
    #[serde(default = "default_dedupe_ttl_secs")]
    pub dedupe_ttl_secs: u64,
}

fn default_message_path() -> PathBuf {
    PathBuf::from("message.md")
}

fn default_dedupe_ttl_secs() -> u64 {
    3600
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            message_path: default_message_path(),
            dedupe_ttl_secs: default_dedupe_ttl_secs(),
        }
    }
}

impl ReviewConfig {
    /// Read the fallback comment body from `message_path`.
    ///
    /// A missing or blank file yields [`DEFAULT_FALLBACK_BODY`].
    ///
    /// # Errors
    ///
    /// Returns [`HermesError::Io`] if the file exists but cannot be read.
    pub fn load_fallback_body(&self) -> Result<String, HermesError> {
        match std::fs::read_to_string(&self.message_path) {
            Ok(content) if !content.trim().is_empty() => Ok(content),
            Ok(_) => Ok(DEFAULT_FALLBACK_BODY.to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(DEFAULT_FALLBACK_BODY.to_string())
            }
            Err(e) => Err(e.into()),
        }
    }
}
