//! OAuth2 PKCE authentication flow for Google Drive
//!
//! Implements the installed-application Authorization Code flow with PKCE
//! (RFC 7636) and a loopback redirect, as Google recommends for desktop
//! clients.
//!
//! ## Components
//!
//! - [`ClientSecrets`] - The `credentials.json` downloaded from the cloud console
//! - [`OAuth2Config`] - Configuration for the OAuth2 flow
//! - [`PKCEFlow`] - OAuth2 PKCE challenge/exchange logic
//! - [`LocalCallbackServer`] - Minimal HTTP server for the OAuth redirect
//! - [`DriveAuthAdapter`] - Orchestrates the full authentication flow

use std::path::Path;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use oauth2::{
    basic::BasicClient, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken,
    Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::token::Tokens;

/// Google OAuth2 authorization endpoint
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google OAuth2 token endpoint
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Full read/write access to the user's Drive files
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// How long the login flow waits for the browser redirect
const CALLBACK_TIMEOUT: StdDuration = StdDuration::from_secs(300);

// ============================================================================
// ClientSecrets
// ============================================================================

/// OAuth client registration, as found under `installed` (or `web`) in the
/// `credentials.json` file Google hands out
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub auth_uri: Option<String>,
    pub token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parses the JSON content of a client secrets file
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(json).context("Client secrets file is not valid JSON")?;
        file.installed
            .or(file.web)
            .context("Client secrets file has neither an `installed` nor a `web` section")
    }

    /// Reads and parses a client secrets file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read OAuth client secrets from {}",
                path.display()
            )
        })?;
        Self::from_json(&json)
    }
}

// ============================================================================
// OAuth2Config
// ============================================================================

/// Configuration for the OAuth2 PKCE authentication flow
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret (Google issues one even for installed apps)
    pub client_secret: Option<String>,
    /// Authorization endpoint
    pub auth_url: String,
    /// Token endpoint
    pub token_url: String,
    /// Redirect URI for receiving the authorization code
    pub redirect_uri: String,
    /// OAuth scopes to request
    pub scopes: Vec<String>,
}

impl OAuth2Config {
    /// Creates a new OAuth2Config with the given client ID and default settings
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            redirect_uri: "http://127.0.0.1/".to_string(),
            scopes: vec![DRIVE_SCOPE.to_string()],
        }
    }

    /// Builds a config from a parsed client secrets file
    pub fn from_client_secrets(secrets: &ClientSecrets) -> Self {
        let mut config = Self::new(secrets.client_id.clone());
        config.client_secret = secrets.client_secret.clone();
        if let Some(uri) = &secrets.auth_uri {
            config.auth_url = uri.clone();
        }
        if let Some(uri) = &secrets.token_uri {
            config.token_url = uri.clone();
        }
        config
    }

    /// Creates a config with custom scopes
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Creates a config with a custom redirect URI
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    /// Creates a config with a custom token endpoint
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}

// ============================================================================
// PKCEFlow
// ============================================================================

/// OAuth2 PKCE flow implementation using the `oauth2` crate
///
/// Handles generating authorization URLs with PKCE challenges,
/// exchanging authorization codes for tokens, and refreshing tokens.
pub struct PKCEFlow {
    client: BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>,
    http: reqwest::Client,
    scopes: Vec<String>,
}

impl PKCEFlow {
    /// Creates a new PKCEFlow with the given configuration
    pub fn new(config: &OAuth2Config) -> Result<Self> {
        let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_auth_uri(AuthUrl::new(config.auth_url.clone()).context("Invalid authorization URL")?)
            .set_token_uri(TokenUrl::new(config.token_url.clone()).context("Invalid token URL")?)
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_uri.clone()).context("Invalid redirect URI")?,
            )
            .set_auth_type(AuthType::RequestBody);
        if let Some(secret) = &config.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        // The token endpoint must never be followed through a redirect.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build OAuth HTTP client")?;

        Ok(Self {
            client,
            http,
            scopes: config.scopes.clone(),
        })
    }

    /// Generates an authorization URL with a PKCE challenge
    ///
    /// Requests offline access and forces the consent screen so Google
    /// always returns a refresh token.
    ///
    /// # Returns
    /// A tuple of `(authorization_url, csrf_token, pkce_verifier)`.
    /// The `pkce_verifier` must be kept until the code exchange step.
    pub fn generate_auth_url(&self) -> (String, CsrfToken, PkceCodeVerifier) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent");

        for scope in &self.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        let (auth_url, csrf_token) = auth_request.set_pkce_challenge(pkce_challenge).url();

        debug!("Generated authorization URL");
        (auth_url.to_string(), csrf_token, pkce_verifier)
    }

    /// Exchanges an authorization code for OAuth tokens
    pub async fn exchange_code(
        &self,
        code: String,
        pkce_verifier: PkceCodeVerifier,
    ) -> Result<Tokens> {
        info!("Exchanging authorization code for tokens");

        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .context("Failed to exchange authorization code")?;

        let tokens = Tokens {
            access_token: token_result.access_token().secret().to_string(),
            refresh_token: token_result.refresh_token().map(|t| t.secret().to_string()),
            expires_at: expiry_from(token_result.expires_in()),
        };

        if tokens.refresh_token.is_none() {
            warn!("Token response has no refresh token; re-login will be needed when it expires");
        }
        info!("Successfully obtained OAuth tokens");
        Ok(tokens)
    }

    /// Refreshes an expired access token using a refresh token
    ///
    /// Google usually omits the refresh token from refresh responses; the
    /// one passed in is kept in that case.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Tokens> {
        info!("Refreshing access token");

        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .context("Failed to refresh token")?;

        let tokens = Tokens {
            access_token: token_result.access_token().secret().to_string(),
            refresh_token: token_result
                .refresh_token()
                .map(|t| t.secret().to_string())
                .or_else(|| Some(refresh_token.to_string())),
            expires_at: expiry_from(token_result.expires_in()),
        };

        info!("Successfully refreshed access token");
        Ok(tokens)
    }
}

fn expiry_from(expires_in: Option<StdDuration>) -> chrono::DateTime<Utc> {
    expires_in
        .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64))
        .unwrap_or_else(|| Utc::now() + Duration::hours(1))
}

// ============================================================================
// LocalCallbackServer
// ============================================================================

/// Minimal HTTP server that listens on the loopback interface for the OAuth2
/// redirect callback.
///
/// Binds an ephemeral port so no fixed port has to be free; the redirect
/// URI handed to the authorization request is derived from it. Requests
/// without a `code` or `error` parameter (a browser asking for a favicon)
/// are answered with 404 and ignored.
pub struct LocalCallbackServer {
    listener: TcpListener,
}

/// Parameters extracted from the OAuth2 callback
#[derive(Debug, PartialEq, Eq)]
pub struct CallbackParams {
    /// The authorization code
    pub code: String,
    /// The CSRF state parameter
    pub state: String,
}

/// What a single request to the callback server carried
#[derive(Debug, PartialEq, Eq)]
enum CallbackOutcome {
    Authorized(CallbackParams),
    Denied(String),
}

impl LocalCallbackServer {
    /// Binds `127.0.0.1` on an ephemeral port
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind OAuth callback server on 127.0.0.1")?;
        Ok(Self { listener })
    }

    /// The redirect URI that routes back to this server
    pub fn redirect_uri(&self) -> Result<String> {
        let addr = self
            .listener
            .local_addr()
            .context("Callback server has no local address")?;
        Ok(format!("http://{addr}/"))
    }

    /// Serves requests until the OAuth redirect arrives
    ///
    /// # Returns
    /// The callback parameters once a request carries a code whose state
    /// matches `expected_state`
    pub async fn wait_for_callback(self, expected_state: &str) -> Result<CallbackParams> {
        use http_body_util::Full;
        use hyper::body::Bytes;
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper::{Request, StatusCode};
        use hyper_util::rt::TokioIo;
        use tokio::sync::oneshot;

        info!(redirect = %self.redirect_uri()?, "Waiting for OAuth callback");

        let (tx, rx) = oneshot::channel::<CallbackOutcome>();
        let tx = Arc::new(tokio::sync::Mutex::new(Some(tx)));
        let expected_state = Arc::new(expected_state.to_string());
        let listener = self.listener;

        let accept_loop = tokio::spawn(async move {
            loop {
                let (stream, _addr) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Callback server accept failed: {}", e);
                        break;
                    }
                };

                let io = TokioIo::new(stream);
                let tx = tx.clone();
                let expected_state = expected_state.clone();

                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let tx = tx.clone();
                    let expected_state = expected_state.clone();
                    async move {
                        let uri = req.uri().to_string();
                        debug!("Callback server received request: {}", uri);

                        let (status, html, outcome) = match parse_callback_params(&uri) {
                            None => (StatusCode::NOT_FOUND, error_html("Not found"), None),
                            Some(CallbackOutcome::Authorized(params))
                                if params.state != *expected_state =>
                            {
                                (
                                    StatusCode::BAD_REQUEST,
                                    error_html("State mismatch in callback"),
                                    Some(CallbackOutcome::Denied(
                                        "CSRF state mismatch in OAuth callback".to_string(),
                                    )),
                                )
                            }
                            Some(CallbackOutcome::Denied(reason)) => (
                                StatusCode::BAD_REQUEST,
                                error_html(&reason),
                                Some(CallbackOutcome::Denied(reason)),
                            ),
                            Some(authorized) => (StatusCode::OK, success_html(), Some(authorized)),
                        };

                        if let Some(outcome) = outcome {
                            if let Some(sender) = tx.lock().await.take() {
                                let _ = sender.send(outcome);
                            }
                        }

                        Ok::<_, hyper::Error>(html_response(status, html))
                    }
                });

                tokio::spawn(async move {
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        warn!("Callback server connection error: {}", e);
                    }
                });
            }
        });

        let outcome = tokio::time::timeout(CALLBACK_TIMEOUT, rx).await;
        accept_loop.abort();

        match outcome
            .context("Timed out waiting for the OAuth callback")?
            .context("Callback server stopped without receiving parameters")?
        {
            CallbackOutcome::Authorized(params) => {
                info!("Received OAuth callback with authorization code");
                Ok(params)
            }
            CallbackOutcome::Denied(reason) => {
                anyhow::bail!("Authorization was not granted: {reason}")
            }
        }
    }
}

fn html_response(
    status: hyper::StatusCode,
    html: String,
) -> hyper::Response<http_body_util::Full<hyper::body::Bytes>> {
    let mut response = hyper::Response::new(http_body_util::Full::new(hyper::body::Bytes::from(
        html,
    )));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

/// Parses the authorization code and state (or an `error`) from a callback URI
fn parse_callback_params(uri: &str) -> Option<CallbackOutcome> {
    let url = url::Url::parse(&format!("http://localhost{}", uri)).ok()?;
    let mut code = None;
    let mut state = None;
    let mut error = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            "error" => error = Some(value.to_string()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Some(CallbackOutcome::Denied(error));
    }

    Some(CallbackOutcome::Authorized(CallbackParams {
        code: code?,
        state: state.unwrap_or_default(),
    }))
}

/// Returns the HTML for a successful authentication page
fn success_html() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>drivemirror - Authentication Successful</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Successful</h1>
    <p>drivemirror can now access your Google Drive.</p>
    <p>You can close this window.</p>
    <script>setTimeout(function() { window.close(); }, 3000);</script>
</body>
</html>"#
        .to_string()
}

/// Returns the HTML for an authentication error page
fn error_html(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>drivemirror - Authentication Error</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Error</h1>
    <p>{}</p>
    <p>Please close this window and try again.</p>
</body>
</html>"#,
        message
    )
}

// ============================================================================
// DriveAuthAdapter
// ============================================================================

/// High-level authentication adapter that orchestrates the full OAuth2 PKCE flow.
///
/// 1. Binds the loopback callback server and derives the redirect URI
/// 2. Generates the PKCE authorization URL
/// 3. Opens the user's browser (the URL is also logged for headless hosts)
/// 4. Waits for the redirect and checks the CSRF state
/// 5. Exchanges the authorization code for tokens
pub struct DriveAuthAdapter {
    config: OAuth2Config,
}

impl DriveAuthAdapter {
    pub fn new(config: OAuth2Config) -> Self {
        Self { config }
    }

    /// Builds the adapter from a client secrets file
    pub fn from_client_secrets_file(path: &Path) -> Result<Self> {
        let secrets = ClientSecrets::load(path)?;
        Ok(Self::new(OAuth2Config::from_client_secrets(&secrets)))
    }

    /// Performs the full interactive OAuth2 PKCE login flow
    pub async fn login(&self) -> Result<Tokens> {
        info!("Starting OAuth2 PKCE login flow");

        let server = LocalCallbackServer::bind().await?;
        let config = self.config.clone().with_redirect_uri(server.redirect_uri()?);
        let flow = PKCEFlow::new(&config)?;

        let (auth_url, csrf_token, pkce_verifier) = flow.generate_auth_url();

        info!(url = %auth_url, "Open this URL to authorize drivemirror");
        if let Err(e) = webbrowser::open(&auth_url) {
            warn!("Could not open a browser ({}); open the URL manually", e);
        }

        let callback = server.wait_for_callback(csrf_token.secret()).await?;
        let tokens = flow.exchange_code(callback.code, pkce_verifier).await?;

        info!("OAuth2 PKCE login completed successfully");
        Ok(tokens)
    }

    /// A flow suitable for refreshing tokens outside of a login
    pub fn refresh_flow(&self) -> Result<PKCEFlow> {
        PKCEFlow::new(&self.config)
    }

    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }
}
