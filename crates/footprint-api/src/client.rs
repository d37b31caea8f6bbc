// Hand-crafted async HTTP client for the Footprint REST API.
//
// Auth: session login (bearer token + XSRF cookie) or a static
// `FootprintApiKey` header. Every request is signed from the current
// `Session` snapshot; every response is observed for a rotated XSRF token.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::auth::{Credentials, Session};
use crate::batch::ScanSurfaceBatcher;
use crate::error::Error;
use crate::transport::TransportConfig;

const API_KEY_HEADER: &str = "FootprintApiKey";
const XSRF_HEADER: &str = "X-XSRF-Token";
const XSRF_COOKIE: &str = "XSRF-TOKEN";
const LOGIN_PATH: &str = "auth/session/";

static ESCAPED_NULL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\null").expect("ESCAPED_NULL should compile - this is a bug")
});

// e.g. "2022-05-18 15:28:09.807554+00:00" -> "2022-05-18T15:28:09.807554+00:00"
static SPACED_DATETIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2})\s*(\d{2}:\d{2}:\d{2})(\.\d+)?(\+00:00)")
        .expect("SPACED_DATETIME should compile - this is a bug")
});

// ── Error response shape ─────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// ── Query builder ────────────────────────────────────────────────────

/// Query parameters, skipping any that are unset.
#[derive(Debug, Default, Clone)]
pub(crate) struct Query(Vec<(&'static str, String)>);

impl Query {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, key: &'static str, value: impl ToString) -> Self {
        self.0.push((key, value.to_string()));
        self
    }

    pub(crate) fn maybe(self, key: &'static str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    /// Every call that acts on a tenant carries `accountId`.
    pub(crate) fn account(self, account_id: Option<i64>) -> Self {
        self.maybe("accountId", account_id)
    }

    pub(crate) fn pairs(&self) -> &[(&'static str, String)] {
        &self.0
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// Bare transport: one method call, one (or, for reports, two) requests.
///
/// Does no retrying and no caching; wrap it in the decorators from
/// `footprint-core` for that.
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
    session: Session,
    batcher: ScanSurfaceBatcher,
}

impl HttpClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build a client for `base_url` (e.g. `https://api.example.com/api/`).
    ///
    /// Under API-key auth the key is injected as a default header; under
    /// password auth nothing is sent until [`login`](crate::FootprintClient::login).
    pub fn new(
        base_url: &str,
        credentials: Credentials,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        if let Credentials::ApiKey { key } = &credentials {
            let mut value =
                HeaderValue::from_str(key.expose_secret()).map_err(|e| Error::Authentication {
                    message: format!("invalid API key header value: {e}"),
                })?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }

        Ok(Self {
            http: transport.build_client_with_headers(headers)?,
            base_url: Self::normalize_base_url(base_url)?,
            credentials,
            session: Session::default(),
            batcher: ScanSurfaceBatcher::default(),
        })
    }

    /// Replace the default scan-surface batcher.
    pub fn with_batcher(mut self, batcher: ScanSurfaceBatcher) -> Self {
        self.batcher = batcher;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Shared session state (tokens + login generation).
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn scan_batcher(&self) -> &ScanSurfaceBatcher {
        &self.batcher
    }

    fn normalize_base_url(raw: &str) -> Result<Url, Error> {
        let mut url = Url::parse(raw)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(url)
    }

    // ── URL builder ──────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    // ── Login ────────────────────────────────────────────────────────

    /// Trade username/password for a fresh session.
    ///
    /// Both tokens are dropped first so the login request itself goes out
    /// unsigned. API-key clients have nothing to do.
    pub(crate) async fn authenticate(&self) -> Result<(), Error> {
        let Credentials::Password { username, password } = &self.credentials else {
            debug!("API key authentication, skipping login");
            return Ok(());
        };

        self.session.clear();

        let url = self.url(LOGIN_PATH)?;
        debug!("logging in at {url}");

        let body = json!({
            "username": username,
            "password": password.expose_secret(),
        });

        let resp = self.http.post(url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("login failed (HTTP {status}): {body}"),
            });
        }

        let xsrf = xsrf_from_headers(resp.headers());
        let body: serde_json::Value = resp.json().await?;
        let access = body
            .get("access")
            .and_then(serde_json::Value::as_str)
            .map(|token| token.to_owned().into());

        self.session.establish(access, xsrf);
        info!(username = %username, "login successful");
        Ok(())
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &Query,
    ) -> Result<T, Error> {
        decode(self.send_text(Method::GET, path, query, None::<&()>).await?)
    }

    pub(crate) async fn get_text(&self, path: &str, query: &Query) -> Result<String, Error> {
        self.send_text(Method::GET, path, query, None::<&()>).await
    }

    pub(crate) async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        query: &Query,
        body: &B,
    ) -> Result<T, Error> {
        decode(self.send_text(Method::POST, path, query, Some(body)).await?)
    }

    pub(crate) async fn put<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        query: &Query,
        body: &B,
    ) -> Result<T, Error> {
        decode(self.send_text(Method::PUT, path, query, Some(body)).await?)
    }

    pub(crate) async fn patch<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        query: &Query,
        body: &B,
    ) -> Result<T, Error> {
        decode(self.send_text(Method::PATCH, path, query, Some(body)).await?)
    }

    pub(crate) async fn delete(&self, path: &str, query: &Query) -> Result<(), Error> {
        self.send_text(Method::DELETE, path, query, None::<&()>)
            .await
            .map(drop)
    }

    // ── Request signing & response handling ──────────────────────────

    async fn send_text<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Option<&B>,
    ) -> Result<String, Error> {
        let url = self.url(path)?;
        debug!("{method} {url} params={:?}", query.pairs());

        let mut builder = self.sign(self.http.request(method, url).query(query.pairs()));
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        self.observe(resp.headers());

        let status = resp.status();
        if status.is_success() {
            Ok(normalize_body(&resp.text().await?))
        } else {
            Err(parse_error(status, resp).await)
        }
    }

    /// Attach the bearer and anti-forgery tokens from one session snapshot.
    fn sign(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let tokens = self.session.tokens();
        if let Some(access) = &tokens.access {
            builder = builder.bearer_auth(access.expose_secret());
        }
        if let Some(xsrf) = &tokens.xsrf {
            builder = builder.header(XSRF_HEADER, xsrf);
        }
        builder
    }

    /// Pick up a rotated XSRF token before the response is consumed.
    fn observe(&self, headers: &HeaderMap) {
        if let Some(token) = xsrf_from_headers(headers) {
            self.session.rotate_xsrf(&token);
        }
    }
}

// ── Response helpers ─────────────────────────────────────────────────

fn xsrf_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(xsrf_from_cookie)
}

/// Value of an `XSRF-TOKEN=<value>; ...` cookie.
fn xsrf_from_cookie(cookie: &str) -> Option<String> {
    let value = cookie.strip_prefix(XSRF_COOKIE)?.strip_prefix('=')?;
    let value = value.split(';').next().unwrap_or_default().trim();
    (!value.is_empty()).then(|| value.to_owned())
}

/// Undo the service's body quirks before decoding.
pub(crate) fn normalize_body(body: &str) -> String {
    let body = ESCAPED_NULL.replace_all(body, "\"");
    SPACED_DATETIME
        .replace_all(&body, "${1}T${2}${3}${4}")
        .into_owned()
}

pub(crate) fn decode<T: DeserializeOwned>(body: String) -> Result<T, Error> {
    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body,
        }
    })
}

async fn parse_error(status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
    let raw = resp.text().await.unwrap_or_default();

    let message = serde_json::from_str::<ErrorResponse>(&raw)
        .ok()
        .and_then(|e| e.detail.or(e.message))
        .unwrap_or_else(|| {
            if raw.is_empty() {
                status.to_string()
            } else {
                raw
            }
        });

    Error::Api {
        status: status.as_u16(),
        message,
    }
}
