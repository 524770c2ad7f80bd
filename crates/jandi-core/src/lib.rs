//! Core library for jandi-mcp - Jandi team chat exposed as MCP tools.
//!
//! This crate provides:
//! - Configuration loading and management
//! - XDG-compliant config path resolution
//! - Schema and example config generation
//! - Jandi API client with token lifecycle management
//! - Text formatting for tool output
//! - Common types and error handling

pub mod config;
pub mod error;
pub mod jandi;
pub mod paths;
pub mod schema;

pub use config::{ApiConfig, AppConfig, AuthConfig, LogLevel, LoggingConfig, ToolsConfig};
pub use error::{CoreError, Result};
pub use jandi::{
    ApiRequest, BrowserSignIn, Credential, CredentialResolver, ImageData, JandiClient, Payload,
    SignIn,
};
pub use paths::{AppPaths, default_config_dir};
pub use schema::{generate_example_config, generate_schema, write_generated_files};

/// Application name used for config directories and environment prefix.
pub const APP_NAME: &str = "jandi";

/// Repository URL, the base of the published schema `$id`.
pub const REPO_URL: &str = "https://github.com/byteowlz/jandi-mcp";

/// Returns the environment variable prefix for this application.
#[must_use]
pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
