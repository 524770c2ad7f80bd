//! Credential resolution for Jandi.
//!
//! A session authenticates with a long-lived refresh token. The token is
//! either configured directly, or obtained once per process by signing in
//! with email and password through a browser:
//! 1. `jandi-auth.mjs` launches headless Chromium via Puppeteer
//! 2. It submits the sign-in form and reads the `_jd_.refresh_token` cookie
//! 3. The token is printed to stdout as JSON and cached in memory

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::CoreError;
use crate::config::AuthConfig;

/// Where a session gets its refresh token from.
#[derive(Clone)]
pub enum Credential {
    /// A refresh token supplied by configuration.
    LongLivedToken(String),
    /// An account to sign in with on first use.
    EmailPassword {
        /// Account email.
        email: String,
        /// Account password.
        password: String,
    },
}

impl Credential {
    /// Pick the credential from configuration.
    ///
    /// A refresh token wins over an email/password pair.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Credential`] if neither a refresh token nor both
    /// email and password are set.
    pub fn from_config(auth: &AuthConfig) -> Result<Self, CoreError> {
        if let Some(token) = non_blank(auth.refresh_token.as_deref()) {
            return Ok(Self::LongLivedToken(token.to_string()));
        }

        match (non_blank(auth.email.as_deref()), non_blank(auth.password.as_deref())) {
            (Some(email), Some(password)) => Ok(Self::EmailPassword {
                email: email.to_string(),
                password: password.to_string(),
            }),
            _ => Err(CoreError::Credential(
                "set JANDI_REFRESH_TOKEN, or both JANDI_EMAIL and JANDI_PASSWORD".to_string(),
            )),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LongLivedToken(_) => f.write_str("LongLivedToken(<redacted>)"),
            Self::EmailPassword { email, .. } => f
                .debug_struct("EmailPassword")
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Interactive sign-in that turns an email/password pair into a refresh token.
#[async_trait]
pub trait SignIn: Send + Sync + fmt::Debug {
    /// Sign in and return the long-lived refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LoginFailed`] if no token could be obtained.
    async fn login(&self, email: &str, password: &str) -> Result<String, CoreError>;
}

/// Produces the refresh token for a session, signing in at most once.
pub struct CredentialResolver {
    credential: Credential,
    sign_in: Arc<dyn SignIn>,
    cached: Mutex<Option<String>>,
}

impl CredentialResolver {
    /// Create a resolver that signs in through `sign_in` when needed.
    #[must_use]
    pub fn new(credential: Credential, sign_in: Arc<dyn SignIn>) -> Self {
        Self {
            credential,
            sign_in,
            cached: Mutex::new(None),
        }
    }

    /// Create a resolver for a fixed refresh token.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self::new(
            Credential::LongLivedToken(token.into()),
            Arc::new(BrowserSignIn::default()),
        )
    }

    /// Return the refresh token.
    ///
    /// A configured token is returned as is. For an email/password pair the
    /// first call signs in and later calls reuse the result; concurrent first
    /// calls wait for the one sign-in in progress.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LoginFailed`] if the sign-in fails.
    pub async fn resolve(&self) -> Result<String, CoreError> {
        let (email, password) = match &self.credential {
            Credential::LongLivedToken(token) => return Ok(token.clone()),
            Credential::EmailPassword { email, password } => (email, password),
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        log::info!("signing in to Jandi as {email}");
        let token = self.sign_in.login(email, password).await?;
        log::debug!("sign-in produced a refresh token");
        *cached = Some(token.clone());
        Ok(token)
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("credential", &self.credential)
            .field("sign_in", &self.sign_in)
            .finish_non_exhaustive()
    }
}

/// Output of the sign-in script.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptOutput {
    refresh_token: String,
}

/// Signs in by running the Puppeteer script `jandi-auth.mjs` under Node.
#[derive(Debug, Clone)]
pub struct BrowserSignIn {
    script: Option<PathBuf>,
    timeout: Duration,
}

impl BrowserSignIn {
    /// Script file name searched for when no explicit path is configured.
    pub const SCRIPT_NAME: &str = "jandi-auth.mjs";

    /// Create a sign-in that runs `script` (or a discovered one) within `timeout`.
    #[must_use]
    pub const fn new(script: Option<PathBuf>, timeout: Duration) -> Self {
        Self { script, timeout }
    }

    /// Build from the `[auth]` configuration section.
    #[must_use]
    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(
            auth.auth_script.as_ref().map(PathBuf::from),
            Duration::from_secs(auth.login_timeout),
        )
    }

    async fn run_script(&self, email: &str, password: &str) -> Result<String, CoreError> {
        let script_path = match &self.script {
            Some(path) => path.clone(),
            None => find_auth_script()?,
        };

        // Credentials go through the environment so they never show up in `ps`.
        let mut cmd = tokio::process::Command::new("node");
        cmd.arg(&script_path)
            .env("JANDI_EMAIL", email)
            .env("JANDI_PASSWORD", password)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);

        log::debug!("running auth script: {}", script_path.display());

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                CoreError::LoginFailed(format!(
                    "browser sign-in timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CoreError::LoginFailed(
                        "node not found - install Node.js to use email/password sign-in"
                            .to_string(),
                    )
                } else {
                    CoreError::LoginFailed(format!("failed to run auth script: {e}"))
                }
            })?;

        if !output.status.success() {
            return Err(CoreError::LoginFailed(
                "browser sign-in failed - check stderr for details".to_string(),
            ));
        }

        parse_script_output(&output.stdout)
    }
}

impl Default for BrowserSignIn {
    fn default() -> Self {
        Self::new(None, Duration::from_secs(120))
    }
}

#[async_trait]
impl SignIn for BrowserSignIn {
    async fn login(&self, email: &str, password: &str) -> Result<String, CoreError> {
        self.run_script(email, password).await
    }
}

fn parse_script_output(stdout: &[u8]) -> Result<String, CoreError> {
    let text = std::str::from_utf8(stdout)
        .map_err(|e| CoreError::LoginFailed(format!("invalid UTF-8 output: {e}")))?;

    let output: ScriptOutput = serde_json::from_str(text.trim())
        .map_err(|e| CoreError::LoginFailed(format!("parsing sign-in output: {e}")))?;

    if output.refresh_token.trim().is_empty() {
        return Err(CoreError::LoginFailed(
            "refresh token cookie not found after sign-in".to_string(),
        ));
    }

    Ok(output.refresh_token)
}

/// Locate the `jandi-auth.mjs` script.
fn find_auth_script() -> Result<PathBuf, CoreError> {
    let exe = std::env::current_exe().ok();
    script_candidates(std::env::var_os("JANDI_AUTH_SCRIPT"), exe.as_deref())
        .into_iter()
        .find(|path| path.exists())
        .ok_or_else(|| {
            CoreError::LoginFailed(
                "jandi-auth.mjs not found. Set JANDI_AUTH_SCRIPT or auth.auth_script.\n\
                 Install with: cd scripts && npm install"
                    .to_string(),
            )
        })
}

/// Places the sign-in script may live, in search order: the override, then
/// `scripts/` above the binary (a checkout), then `share/jandi/` (an install).
fn script_candidates(env_override: Option<OsString>, exe: Option<&Path>) -> Vec<PathBuf> {
    let bin_dir = exe.and_then(Path::parent);
    let checkout = bin_dir
        .into_iter()
        .flat_map(|dir| dir.ancestors().take(6))
        .map(|dir| dir.join("scripts").join(BrowserSignIn::SCRIPT_NAME));
    let install = bin_dir
        .and_then(Path::parent)
        .map(|prefix| prefix.join("share/jandi").join(BrowserSignIn::SCRIPT_NAME));

    env_override
        .map(PathBuf::from)
        .into_iter()
        .chain(checkout)
        .chain(install)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingSignIn {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SignIn for CountingSignIn {
        async fn login(&self, email: &str, _password: &str) -> Result<String, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(format!("token-for-{email}"))
        }
    }

    #[derive(Debug)]
    struct FailingSignIn;

    #[async_trait]
    impl SignIn for FailingSignIn {
        async fn login(&self, _email: &str, _password: &str) -> Result<String, CoreError> {
            Err(CoreError::LoginFailed("selector not found".to_string()))
        }
    }

    fn email_password() -> Credential {
        Credential::EmailPassword {
            email: "me@example.com".to_string(),
            password: "hunter2".to_string(),
        }
    }

    #[test]
    fn refresh_token_wins_over_password() {
        let auth = AuthConfig {
            refresh_token: Some("abc".to_string()),
            email: Some("me@example.com".to_string()),
            password: Some("hunter2".to_string()),
            ..AuthConfig::default()
        };
        assert!(matches!(
            Credential::from_config(&auth),
            Ok(Credential::LongLivedToken(ref t)) if t == "abc"
        ));
    }

    #[test]
    fn email_without_password_is_not_a_credential() {
        let auth = AuthConfig {
            email: Some("me@example.com".to_string()),
            password: Some("   ".to_string()),
            ..AuthConfig::default()
        };
        assert!(matches!(Credential::from_config(&auth), Err(CoreError::Credential(_))));
        assert!(matches!(
            Credential::from_config(&AuthConfig::default()),
            Err(CoreError::Credential(_))
        ));
    }

    #[test]
    fn debug_redacts_secrets() {
        let rendered = format!("{:?}", email_password());
        assert!(rendered.contains("me@example.com"));
        assert!(!rendered.contains("hunter2"));
        assert!(!format!("{:?}", Credential::LongLivedToken("abc".into())).contains("abc"));
    }

    #[tokio::test]
    async fn configured_token_never_signs_in() {
        let sign_in = Arc::new(CountingSignIn::default());
        let resolver =
            CredentialResolver::new(Credential::LongLivedToken("abc".into()), sign_in.clone());

        assert_eq!(resolver.resolve().await.expect("resolve"), "abc");
        assert_eq!(sign_in.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sign_in_result_is_cached() {
        let sign_in = Arc::new(CountingSignIn::default());
        let resolver = CredentialResolver::new(email_password(), sign_in.clone());

        let first = resolver.resolve().await.expect("first resolve");
        let second = resolver.resolve().await.expect("second resolve");

        assert_eq!(first, "token-for-me@example.com");
        assert_eq!(first, second);
        assert_eq!(sign_in.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_first_resolves_sign_in_once() {
        let sign_in = Arc::new(CountingSignIn::default());
        let resolver = CredentialResolver::new(email_password(), sign_in.clone());

        let (a, b) = tokio::join!(resolver.resolve(), resolver.resolve());

        assert_eq!(a.expect("a"), b.expect("b"));
        assert_eq!(sign_in.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sign_in_failure_surfaces_as_login_failed() {
        let resolver = CredentialResolver::new(email_password(), Arc::new(FailingSignIn));
        let err = resolver.resolve().await.expect_err("sign-in fails");
        assert!(matches!(err, CoreError::LoginFailed(ref msg) if msg.contains("selector")));
    }

    #[test]
    fn script_output_is_parsed() {
        let token = parse_script_output(b"{\"refreshToken\":\"r-123\"}\n").expect("parse");
        assert_eq!(token, "r-123");

        assert!(matches!(
            parse_script_output(b"{\"refreshToken\":\"\"}"),
            Err(CoreError::LoginFailed(_))
        ));
        assert!(matches!(parse_script_output(b"not json"), Err(CoreError::LoginFailed(_))));
    }

    #[test]
    fn script_override_is_searched_first() {
        let exe = Path::new("/repo/target/debug/jandi-mcp");
        let candidates = script_candidates(Some("/opt/auth.mjs".into()), Some(exe));

        assert_eq!(candidates[0], PathBuf::from("/opt/auth.mjs"));
        assert!(candidates.contains(&PathBuf::from("/repo/scripts/jandi-auth.mjs")));
        assert_eq!(
            candidates.last(),
            Some(&PathBuf::from("/repo/target/share/jandi/jandi-auth.mjs"))
        );
        assert!(script_candidates(None, None).is_empty());
    }

    #[tokio::test]
    async fn missing_script_fails_sign_in() {
        let sign_in = BrowserSignIn::new(
            Some(PathBuf::from("/nonexistent/jandi-auth.mjs")),
            Duration::from_secs(5),
        );
        let err = sign_in
            .login("me@example.com", "hunter2")
            .await
            .expect_err("no script");
        assert!(matches!(err, CoreError::LoginFailed(_)));
    }
}
