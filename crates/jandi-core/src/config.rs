//! Configuration types and loading for the application.

use std::env;
use std::fmt;
use std::path::Path;

use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::paths::{expand_str_path, write_default_config};
use crate::{AppPaths, env_prefix};

/// Default Jandi API host.
pub const DEFAULT_BASE_URL: &str = "https://i1.jandi.com";

/// Legacy environment variables read on top of the prefixed ones.
const LEGACY_ENV: [(&str, &str); 3] = [
    ("auth.refresh_token", "JANDI_REFRESH_TOKEN"),
    ("auth.email", "JANDI_EMAIL"),
    ("auth.password", "JANDI_PASSWORD"),
];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(
    title = "Application Configuration",
    description = "Main configuration for the Jandi MCP server"
)]
pub struct AppConfig {
    /// JSON Schema reference for editor support.
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub schema: Option<String>,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Jandi credentials.
    pub auth: AuthConfig,

    /// Jandi API connection settings.
    pub api: ApiConfig,

    /// Tool behavior defaults.
    pub tools: ToolsConfig,
}

impl AppConfig {
    /// Load configuration from file and environment, creating defaults if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, parsed, or written.
    pub fn load(paths: &AppPaths, dry_run: bool) -> Result<Self> {
        if !paths.config_file.exists() {
            if dry_run {
                log::info!(
                    "dry-run: would create default config at {}",
                    paths.config_file.display()
                );
            } else {
                write_default_config(&paths.config_file)?;
            }
        }

        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// Later sources win: built-in defaults, the TOML file, `JANDI__SECTION__KEY`
    /// variables, then the flat `JANDI_REFRESH_TOKEN` / `JANDI_EMAIL` /
    /// `JANDI_PASSWORD` variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn load_from_path(config_file: &Path) -> Result<Self> {
        let env_prefix = env_prefix();
        let mut builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("api.base_url", DEFAULT_BASE_URL)?
            .set_default("api.timeout", 60_i64)?
            .set_default("auth.login_timeout", 120_i64)?
            .set_default("tools.message_count", 30_i64)?
            .set_default("tools.comment_count", 10_i64)?
            .set_default("tools.fetch_images", true)?
            .add_source(
                File::from(config_file)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(env_prefix.as_str()).separator("__"));

        for (key, var) in LEGACY_ENV {
            let value = env::var(var).ok().filter(|v| !v.trim().is_empty());
            builder = builder.set_override_option(key, value)?;
        }

        let mut config: Self = builder.build()?.try_deserialize()?;

        if let Some(ref file) = config.logging.file {
            let expanded = expand_str_path(file)?;
            config.logging.file = Some(expanded.display().to_string());
        }
        if let Some(ref script) = config.auth.auth_script {
            let expanded = expand_str_path(script)?;
            config.auth.auth_script = Some(expanded.display().to_string());
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema: None,
            logging: LoggingConfig::default(),
            auth: AuthConfig::default(),
            api: ApiConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Logging configuration")]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace).
    #[schemars(default = "default_log_level")]
    pub level: LogLevel,

    /// Optional path for log file output. Supports ~ and environment variables.
    /// Logs go to stderr when unset; stdout is reserved for the MCP transport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Log level enumeration for schema validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only emit error-level messages.
    Error,
    /// Emit warnings and errors.
    Warn,
    /// Emit informational messages and above (default).
    #[default]
    Info,
    /// Emit debug diagnostics and above.
    Debug,
    /// Emit all messages including fine-grained traces.
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

const fn default_log_level() -> LogLevel {
    LogLevel::Info
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
        }
    }
}

/// Jandi credentials.
///
/// Either `refresh_token`, or both `email` and `password`, must be set.
/// A refresh token wins when both are present.
#[derive(Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Jandi credentials: a refresh token, or an email/password pair")]
pub struct AuthConfig {
    /// Long-lived refresh token (the `_jd_.refresh_token` cookie).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Account email used for browser sign-in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Account password used for browser sign-in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Path to the `jandi-auth.mjs` sign-in script. Supports ~ and environment variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_script: Option<String>,

    /// Timeout in seconds for the browser sign-in (default: 120).
    #[schemars(range(min = 1))]
    pub login_timeout: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_token: None,
            email: None,
            password: None,
            auth_script: None,
            login_timeout: 120,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("auth_script", &self.auth_script)
            .field("login_timeout", &self.login_timeout)
            .finish()
    }
}

/// Jandi API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Jandi API connection settings")]
pub struct ApiConfig {
    /// Base URL of the Jandi API.
    pub base_url: String,

    /// Timeout in seconds for each HTTP request (default: 60).
    #[schemars(range(min = 1))]
    pub timeout: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: 60,
        }
    }
}

/// Tool behavior defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Defaults applied by the MCP tools")]
pub struct ToolsConfig {
    /// Messages fetched when a call does not specify a count (default: 30).
    #[schemars(range(min = 1))]
    pub message_count: u32,

    /// Comments fetched when a call does not specify a count (default: 10).
    #[schemars(range(min = 1))]
    pub comment_count: u32,

    /// Attach image attachments to message results.
    pub fetch_images: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            message_count: 30,
            comment_count: 10,
            fetch_images: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api.timeout, 60);
        assert_eq!(config.tools.message_count, 30);
        assert_eq!(config.tools.comment_count, 10);
        assert!(config.tools.fetch_images);
        assert!(config.auth.refresh_token.is_none());
    }

    #[test]
    fn loads_credentials_from_file() {
        let dir = std::env::temp_dir().join(format!("jandi-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            "[auth]\nemail = \"me@example.com\"\npassword = \"hunter2\"\n\n[tools]\nmessage_count = 50\n",
        )
        .expect("write config");

        let config = AppConfig::load_from_path(&path).expect("load config");
        assert_eq!(config.auth.email.as_deref(), Some("me@example.com"));
        assert_eq!(config.auth.password.as_deref(), Some("hunter2"));
        assert_eq!(config.tools.message_count, 50);
        assert_eq!(config.tools.comment_count, 10);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let auth = AuthConfig {
            refresh_token: Some("secret-token".to_string()),
            password: Some("hunter2".to_string()),
            ..AuthConfig::default()
        };
        let rendered = format!("{auth:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
