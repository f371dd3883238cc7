//! Google OAuth2 for an installed app.
//!
//! Silent authorization redeems a refresh token kept in the keyring.
//! Interactive authorization opens the browser on the consent screen,
//! captures the redirect on a loopback listener, and exchanges the code.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use super::{SyncError, api_error_message, keyring};
use crate::config::GoogleConfig;
use crate::core::account::User;

/// Scopes requested on every consent.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/tasks",
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/drive.appdata",
];

const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// No user interaction; fails if that is not enough.
    Silent,
    /// Show the account chooser and consent screen.
    Interactive,
}

/// Result of a successful authorization.
#[derive(Debug, Clone)]
pub struct Grant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires, when the server said.
    pub expires_in: Option<u64>,
    /// Identity behind the token. Only filled by interactive consent.
    pub profile: Option<User>,
}

impl Grant {
    pub fn new(access_token: impl Into<String>, expires_in: Option<u64>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in,
            profile: None,
        }
    }
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Obtain a fresh access token for the identity `hint` (an email, or
    /// empty to let the user choose).
    async fn authorize(&self, hint: &str, mode: AuthMode) -> Result<Grant, SyncError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

impl From<ProfileResponse> for User {
    fn from(p: ProfileResponse) -> Self {
        let email = p.email.unwrap_or_default();
        Self {
            name: p.name.filter(|n| !n.is_empty()).unwrap_or_else(|| email.clone()),
            email,
            picture: p.picture.unwrap_or_default(),
            sub: p.sub,
        }
    }
}

/// The Google consent URL for one attempt.
pub fn consent_url(config: &GoogleConfig, redirect_uri: &str, state: &str, hint: &str) -> Result<Url, SyncError> {
    let mut url = Url::parse(&config.auth_uri).map_err(|e| SyncError::Config(format!("auth_uri: {}", e)))?;
    {
        let mut q = url.query_pairs_mut();
        q.append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &SCOPES.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "select_account consent")
            .append_pair("state", state);
        if !hint.is_empty() {
            q.append_pair("login_hint", hint);
        }
    }
    Ok(url)
}

/// Extract the authorization code from the first line of the redirect
/// request (`GET /?code=...&state=... HTTP/1.1`).
pub fn parse_redirect(request_line: &str, expected_state: &str) -> Result<String, SyncError> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| SyncError::Auth("Malformed redirect request".into()))?;
    let url = Url::parse("http://127.0.0.1")
        .and_then(|base| base.join(target))
        .map_err(|e| SyncError::Auth(format!("Malformed redirect: {}", e)))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "error" => return Err(SyncError::Auth(format!("Authorization denied: {}", value))),
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(SyncError::Auth("State mismatch in redirect".into()));
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| SyncError::Auth("No authorization code received".into()))
}

pub struct GoogleAuthorizer {
    config: GoogleConfig,
    http: reqwest::Client,
}

impl GoogleAuthorizer {
    pub fn new(config: GoogleConfig) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { config, http })
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, SyncError> {
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("client_id", self.config.client_id.as_str()));
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let resp = self.http.post(&self.config.token_uri).form(&form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let detail = api_error_message(&body)
                .or_else(|| {
                    serde_json::from_str::<serde_json::Value>(&body)
                        .ok()
                        .and_then(|v| v["error"].as_str().map(str::to_string))
                })
                .unwrap_or_else(|| status.to_string());
            return Err(SyncError::Auth(format!("Token request failed: {}", detail)));
        }
        Ok(resp.json().await?)
    }

    async fn silent(&self, hint: &str) -> Result<Grant, SyncError> {
        if hint.is_empty() {
            return Err(SyncError::AuthRequired("unknown account".into()));
        }
        let refresh = keyring::load_secret(&keyring::refresh_token_key(hint))
            .await
            .map_err(SyncError::Keyring)?
            .ok_or_else(|| SyncError::AuthRequired(hint.to_string()))?;

        let token = self
            .token_request(&[("grant_type", "refresh_token"), ("refresh_token", refresh.as_str())])
            .await?;
        log::debug!("Refreshed access token for {}", hint);
        Ok(Grant::new(token.access_token, token.expires_in))
    }

    async fn interactive(&self, hint: &str) -> Result<Grant, SyncError> {
        if self.config.client_id.is_empty() {
            return Err(SyncError::Config("google.client_id is not set".into()));
        }

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{}", port);
        let state = uuid::Uuid::new_v4().simple().to_string();
        let url = consent_url(&self.config, &redirect_uri, &state, hint)?;

        log::info!("Opening browser for Google consent");
        if let Err(e) = open::that(url.as_str()) {
            log::warn!("Failed to open browser: {}", e);
            eprintln!("Open this URL to continue:\n{}", url);
        }

        let code = tokio::time::timeout(CONSENT_TIMEOUT, wait_for_code(&listener, &state))
            .await
            .map_err(|_| SyncError::Auth("Timed out waiting for consent".into()))??;

        let token = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .await?;
        let profile = self.fetch_profile(&token.access_token).await?;

        if let Some(refresh) = token.refresh_token.as_deref() {
            let key = keyring::refresh_token_key(&profile.email);
            let label = format!("TaskMerge Google ({})", profile.email);
            if let Err(e) = keyring::store_secret(&key, &label, refresh).await {
                log::warn!("Could not store refresh token: {}", e);
            }
        }

        log::info!("Authorized {}", profile.email);
        Ok(Grant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
            profile: Some(profile),
        })
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<User, SyncError> {
        let resp = self
            .http
            .get(&self.config.userinfo_uri)
            .bearer_auth(access_token)
            .send()
            .await?;
        let resp = super::check_response(resp, "Failed to fetch user profile").await?;
        let profile: ProfileResponse = resp.json().await?;
        Ok(profile.into())
    }
}

#[async_trait]
impl Authorizer for GoogleAuthorizer {
    async fn authorize(&self, hint: &str, mode: AuthMode) -> Result<Grant, SyncError> {
        match mode {
            AuthMode::Silent => self.silent(hint).await,
            AuthMode::Interactive => self.interactive(hint).await,
        }
    }
}

/// Accept one browser redirect and answer it.
async fn wait_for_code(listener: &TcpListener, state: &str) -> Result<String, SyncError> {
    let (mut stream, _) = listener.accept().await?;
    let mut buffer = vec![0u8; 8192];
    let n = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..n]);
    let first_line = request.lines().next().unwrap_or_default();

    let result = parse_redirect(first_line, state);
    let message = match &result {
        Ok(_) => "Authorization successful! You can close this tab and return to TaskMerge.",
        Err(_) => "Authorization failed. You can close this tab.",
    };
    let body = format!(
        "<html><body style=\"font-family: system-ui; text-align: center; padding: 40px;\">\
         <h2>{}</h2></body></html>",
        message
    );
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        log::debug!("Could not answer redirect: {}", e);
    }
    let _ = stream.flush().await;
    result
}
