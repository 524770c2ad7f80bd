//! Jandi API client with automatic token management.
//!
//! Jandi's web client authenticates in two steps, and so does this client:
//!
//! 1. Exchange the long-lived refresh token for a short-lived access token
//!    at `/inner-api/token`
//! 2. Resolve the team, member and account ids once via `/account-api/v1/me`
//!
//! Every API call carries the access token plus that identity triple. A 401
//! triggers one forced token refresh and a single retry of the call.
//!
//! Refreshes and the identity lookup are single-flight: concurrent callers
//! wait for the exchange in progress and reuse its result instead of issuing
//! their own.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use chrono::Utc;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};

use crate::CoreError;
use crate::config::AppConfig;
use crate::jandi::auth::{BrowserSignIn, Credential, CredentialResolver};
use crate::jandi::models::{
    COMMENT_KEYS, Comment, MEMBER_KEYS, MESSAGE_KEYS, MeResponse, Member, MessageRecord, Payload,
    RoomDirectory, TokenRequest, TokenResponse, parse_list,
};
use crate::jandi::session::{AccessToken, Identity, TokenSlot};

/// Client identification sent on every call.
pub const CLIENT_USER_AGENT: &str = "Jandi/25.50 (web; Windows; 10.0; Browser; Chrome;)";

/// Origin the token exchange expects.
const WEB_ORIGIN: &str = "https://www.jandi.com";

/// Accept media type of the v1 endpoints.
pub const ACCEPT_V1: &str = "application/vnd.tosslab.jandi-v1+json";
/// Accept media type of the v2 endpoints.
pub const ACCEPT_V2: &str = "application/vnd.tosslab.jandi-v2+json";
/// Accept media type of the v4 endpoints.
pub const ACCEPT_V4: &str = "application/vnd.tosslab.jandi-v4+json";

/// MIME type assumed when an image response has no `Content-Type`.
const DEFAULT_IMAGE_MIME: &str = "image/png";

/// An outbound API call, before authentication headers are added.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Value>,
}

impl ApiRequest {
    /// A request with the given method and absolute URL.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// A `GET` request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Set the `Accept` media type.
    #[must_use]
    pub fn accept(mut self, media_type: &'static str) -> Self {
        self.headers
            .insert(header::ACCEPT, HeaderValue::from_static(media_type));
        self
    }

    /// Add a header, replacing any default with the same name.
    #[must_use]
    pub fn header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// An image downloaded for inline display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Base64-encoded image bytes.
    pub data: String,
    /// MIME type reported by the server.
    pub mime_type: String,
}

/// Token and identity valid for the next outbound call.
#[derive(Debug, Clone)]
struct Ready {
    token: AccessToken,
    identity: Identity,
}

/// Jandi API client.
///
/// Construct once and share behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct JandiClient {
    http: Client,
    base_url: String,
    credentials: CredentialResolver,
    token: Mutex<TokenSlot>,
    identity: OnceCell<Identity>,
}

impl JandiClient {
    /// Create a client from application configuration.
    ///
    /// Fails before any network traffic if no credential is configured.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Credential`] if neither a refresh token nor an
    /// email/password pair is configured, or an error if the HTTP client
    /// cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, CoreError> {
        let credential = Credential::from_config(&config.auth)?;
        let sign_in = BrowserSignIn::from_config(&config.auth);
        let credentials = CredentialResolver::new(credential, Arc::new(sign_in));

        Self::new(
            &config.api.base_url,
            credentials,
            Duration::from_secs(config.api.timeout),
        )
    }

    /// Create a client against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        credentials: CredentialResolver,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        reqwest::Url::parse(base_url)
            .map_err(|e| CoreError::Config(format!("invalid API base URL {base_url}: {e}")))?;

        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            token: Mutex::new(TokenSlot::default()),
            identity: OnceCell::new(),
        })
    }

    /// Base URL of the API.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the identity has been resolved.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.identity.initialized()
    }

    /// The resolved identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.get()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Make sure a valid access token and the identity are available.
    ///
    /// Refreshes the access token if there is none or it has expired, and
    /// looks up the identity if that has never succeeded. Does nothing when
    /// both are already in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential cannot be resolved, the token
    /// exchange or identity lookup fails, or the account has no team.
    pub async fn ensure_ready(&self) -> Result<(), CoreError> {
        self.ready().await.map(|_| ())
    }

    async fn ready(&self) -> Result<Ready, CoreError> {
        let token = self.current_token().await?;
        let identity = self
            .identity
            .get_or_try_init(|| self.fetch_identity(&token))
            .await?
            .clone();

        Ok(Ready { token, identity })
    }

    async fn current_token(&self) -> Result<AccessToken, CoreError> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.usable(Utc::now()) {
            return Ok(token.clone());
        }

        let grant = self.exchange_token().await?;
        let token = slot.install(grant, Utc::now())?;
        log::debug!(
            "access token #{} valid until {}",
            token.generation(),
            token.expires_at()
        );
        Ok(token.clone())
    }

    /// Replace a token the server rejected.
    ///
    /// If another caller already installed a newer token while this one
    /// waited for the lock, that token is reused.
    async fn force_refresh(&self, rejected: &AccessToken) -> Result<AccessToken, CoreError> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.replaced_since(rejected.generation(), Utc::now()) {
            log::debug!("access token already refreshed by a concurrent call");
            return Ok(token.clone());
        }

        let grant = self.exchange_token().await?;
        Ok(slot.install(grant, Utc::now())?.clone())
    }

    async fn exchange_token(&self) -> Result<TokenResponse, CoreError> {
        let refresh_token = self.credentials.resolve().await?;
        let body = serde_json::to_value(TokenRequest::refresh(&refresh_token))
            .map_err(|e| CoreError::Serialization(format!("encoding token request: {e}")))?;

        let request = ApiRequest::new(Method::POST, self.url("/inner-api/token"))
            .accept(ACCEPT_V4)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json;charset=UTF-8"),
            )
            .header(header::ORIGIN, HeaderValue::from_static(WEB_ORIGIN))
            .json(body);

        log::debug!("exchanging refresh token for an access token");
        let response = self.prepare(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Auth {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| CoreError::Serialization(format!("parsing token response: {e}")))
    }

    async fn fetch_identity(&self, token: &AccessToken) -> Result<Identity, CoreError> {
        let request = ApiRequest::get(self.url("/account-api/v1/me")).accept(ACCEPT_V1);
        let response = self
            .prepare(&request)
            .header(header::AUTHORIZATION, token.authorization())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Auth {
                status: status.as_u16(),
                body,
            });
        }

        let me: MeResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Serialization(format!("parsing account response: {e}")))?;

        let identity = Identity::from_me(me)?;
        log::info!(
            "authenticated as member {} of team {}",
            identity.member_id,
            identity.team_id
        );
        Ok(identity)
    }

    /// Builder with the client identification, JSON content type and the
    /// request's own headers and body. Request headers override the defaults.
    fn prepare(&self, request: &ApiRequest) -> RequestBuilder {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url())
            .header("x-user-agent", CLIENT_USER_AGENT)
            .header(header::CONTENT_TYPE, "application/json")
            .headers(request.headers.clone());

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder
    }

    async fn send(
        &self,
        request: &ApiRequest,
        token: &AccessToken,
        identity: &Identity,
    ) -> Result<Response, CoreError> {
        let response = self
            .prepare(request)
            .header(header::AUTHORIZATION, token.authorization())
            .header("x-team-id", identity.team_id.as_str())
            .header("x-member-id", identity.member_id.as_str())
            .header("x-account-id", identity.account_id.as_str())
            .send()
            .await?;
        Ok(response)
    }

    /// Perform an authenticated API call and decode the JSON response.
    ///
    /// A 401 response triggers one forced token refresh and one retry; any
    /// other failure, including transport errors and 5xx, is returned as is.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Request`] if the (possibly retried) call is not
    /// successful, or the error from readiness, transport or decoding.
    pub async fn request<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, CoreError> {
        let ready = self.ready().await?;

        let mut response = self.send(request, &ready.token, &ready.identity).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            log::info!(
                "access token rejected by {} {}, refreshing",
                request.method,
                request.url()
            );
            let token = self.force_refresh(&ready.token).await?;
            response = self.send(request, &token, &ready.identity).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Request {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        response.json::<T>().await.map_err(|e| {
            CoreError::Serialization(format!("parsing response from {}: {e}", request.url()))
        })
    }

    async fn team_id(&self) -> Result<String, CoreError> {
        Ok(self.ready().await?.identity.team_id)
    }

    /// List the topics, direct messages and group chats of the team.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be readied or the request fails.
    pub async fn get_rooms(&self) -> Result<Payload<RoomDirectory>, CoreError> {
        let team_id = self.team_id().await?;
        let request = ApiRequest::get(self.url(&format!("/start-api/v4/teams/{team_id}/rooms")))
            .accept(ACCEPT_V4);

        let raw: Value = self.request(&request).await?;
        Ok(RoomDirectory::parse(raw))
    }

    /// Get up to `count` messages of a room.
    ///
    /// `link_id` continues from a previous page.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be readied or the request fails.
    pub async fn get_messages(
        &self,
        room_id: &str,
        count: u32,
        link_id: Option<&str>,
    ) -> Result<Payload<Vec<MessageRecord>>, CoreError> {
        let team_id = self.team_id().await?;
        let mut url = self.url(&format!(
            "/message-api/v2/teams/{team_id}/rooms/{}/messages?count={count}",
            urlencoding::encode(room_id)
        ));
        if let Some(link_id) = link_id.filter(|l| !l.is_empty()) {
            url.push_str("&linkId=");
            url.push_str(&urlencoding::encode(link_id));
        }

        let raw: Value = self.request(&ApiRequest::get(url).accept(ACCEPT_V2)).await?;
        Ok(parse_list(raw, MESSAGE_KEYS))
    }

    /// Get up to `count` comments of a post.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be readied or the request fails.
    pub async fn get_comments(
        &self,
        post_id: &str,
        count: u32,
    ) -> Result<Payload<Vec<Comment>>, CoreError> {
        let team_id = self.team_id().await?;
        let url = self.url(&format!(
            "/message-api/v1/teams/{team_id}/posts/{}/comments?count={count}",
            urlencoding::encode(post_id)
        ));

        let raw: Value = self.request(&ApiRequest::get(url).accept(ACCEPT_V1)).await?;
        Ok(parse_list(raw, COMMENT_KEYS))
    }

    /// List the members of the team.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be readied or the request fails.
    pub async fn get_members(&self) -> Result<Payload<Vec<Member>>, CoreError> {
        let team_id = self.team_id().await?;
        let request = ApiRequest::get(self.url(&format!("/start-api/v4/teams/{team_id}")))
            .accept(ACCEPT_V4);

        let raw: Value = self.request(&request).await?;
        Ok(parse_list(raw, MEMBER_KEYS))
    }

    /// Download an attachment image with the session's credentials.
    ///
    /// Best-effort: any failure is logged and yields `None`.
    pub async fn download_image(&self, url: &str) -> Option<ImageData> {
        match self.try_download_image(url).await {
            Ok(image) => image,
            Err(e) => {
                log::warn!("image download failed for {url}: {e}");
                None
            }
        }
    }

    async fn try_download_image(&self, url: &str) -> Result<Option<ImageData>, CoreError> {
        let ready = self.ready().await?;

        let response = self
            .send(&ApiRequest::get(url), &ready.token, &ready.identity)
            .await?;

        if !response.status().is_success() {
            log::debug!("image download for {url} returned {}", response.status());
            return Ok(None);
        }

        let mime_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_IMAGE_MIME)
            .to_string();
        let bytes = response.bytes().await?;

        Ok(Some(ImageData {
            data: base64::engine::general_purpose::STANDARD.encode(&bytes),
            mime_type,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_builder_sets_accept_and_body() {
        let request = ApiRequest::new(Method::POST, "https://example.test/x")
            .accept(ACCEPT_V2)
            .header(
                header::HeaderName::from_static("x-extra"),
                HeaderValue::from_static("1"),
            )
            .json(json!({ "a": 1 }));

        assert_eq!(request.url(), "https://example.test/x");
        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.headers.get(header::ACCEPT).map(HeaderValue::as_bytes),
            Some(ACCEPT_V2.as_bytes())
        );
        assert_eq!(
            request.headers.get("x-extra").map(HeaderValue::as_bytes),
            Some(&b"1"[..])
        );
        assert_eq!(request.body, Some(json!({ "a": 1 })));
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let result = JandiClient::new(
            "not a url",
            CredentialResolver::with_token("t"),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn trailing_slash_is_dropped_from_base_url() {
        let client = JandiClient::new(
            "https://i1.jandi.com/",
            CredentialResolver::with_token("t"),
            Duration::from_secs(1),
        )
        .expect("client");
        assert_eq!(client.base_url(), "https://i1.jandi.com");
        assert_eq!(
            client.url("/inner-api/token"),
            "https://i1.jandi.com/inner-api/token"
        );
        assert!(!client.is_initialized());
    }
}
