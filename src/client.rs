//! HTTP dispatch chokepoint for the REST API.
//!
//! Every outbound call goes through [`ApiClient::send`], which asks the
//! [`SessionAuthority`] to attach credentials and then to inspect the
//! response status.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, multipart::Form};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::badges::{BadgeSource, BadgeSummary, RawTotals};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::navigation::Navigator;
use crate::session::{BodyKind, ProfilePayload, ProfileSource, ResponseDisposition, SessionAuthority};

/// Path of the profile endpoint used by the validation probe.
fn profile_path(user_id: i64) -> String {
    format!("user/{user_id}")
}

/// Path of the badge summary endpoint.
const BADGE_SUMMARY_PATH: &str = "statistics/admin-badges";

/// Body of an outbound request.
#[derive(Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(Form),
}

impl RequestBody {
    pub fn kind(&self) -> BodyKind {
        match self {
            Self::Empty => BodyKind::Empty,
            Self::Json(_) => BodyKind::Json,
            Self::Multipart(_) => BodyKind::Multipart,
        }
    }
}

/// An outbound API call, relative to the configured base URL.
#[derive(Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    #[must_use]
    pub fn multipart(mut self, form: Form) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }
}

/// HTTP client for the API.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use esce_session::client::ApiClient;
/// use esce_session::config::AppConfig;
/// use esce_session::navigation::Navigator;
/// use esce_session::session::SessionAuthority;
/// use esce_session::storage::StoreSet;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AppConfig::default();
/// let authority = Arc::new(SessionAuthority::new(StoreSet::in_memory(), &config.session));
/// let client = ApiClient::new(&config.api, authority, Arc::new(Navigator::default()))?;
///
/// let tours: serde_json::Value = client.get_json("tours").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
    timeout: Duration,
    authority: Arc<SessionAuthority>,
    navigator: Arc<Navigator>,
}

impl ApiClient {
    /// Create a new client.
    pub fn new(
        config: &ApiConfig,
        authority: Arc<SessionAuthority>,
        navigator: Arc<Navigator>,
    ) -> Result<Self> {
        Self::with_client(config, reqwest::Client::new(), authority, navigator)
    }

    /// Create a new client with a custom reqwest client.
    pub fn with_client(
        config: &ApiConfig,
        http: reqwest::Client,
        authority: Arc<SessionAuthority>,
        navigator: Arc<Navigator>,
    ) -> Result<Self> {
        // Url::join replaces the last segment unless the base ends in '/'.
        let mut base = config.base_url.trim_end_matches('/').to_string();
        base.push('/');
        Ok(Self {
            base_url: Url::parse(&base)?,
            http,
            timeout: config.request_timeout(),
            authority,
            navigator,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The session authority this client dispatches through.
    pub fn authority(&self) -> &Arc<SessionAuthority> {
        &self.authority
    }

    /// The navigator consulted for redirects.
    pub fn navigator(&self) -> &Arc<Navigator> {
        &self.navigator
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────────────────

    /// Send a request through the session pipeline.
    ///
    /// A 401 purges the credential, redirects unless the current route is
    /// public, and yields [`Error::SessionEnded`]. A 403 yields
    /// [`Error::Forbidden`]. Any other response is returned as-is.
    pub async fn send(&self, request: ApiRequest) -> Result<reqwest::Response> {
        let response = self.dispatch(request).await?;
        let route = self.navigator.current();

        match self.authority.on_response(response.status(), &route) {
            ResponseDisposition::PassThrough => Ok(response),
            ResponseDisposition::SessionEnded { redirect } => {
                if let Some(to) = redirect {
                    self.navigator.navigate(to);
                }
                Err(Error::SessionEnded)
            }
            ResponseDisposition::Forbidden => Err(Error::Forbidden {
                message: error_message(response).await,
            }),
        }
    }

    /// Attach authorization and put the request on the wire.
    async fn dispatch(&self, request: ApiRequest) -> Result<reqwest::Response> {
        let ApiRequest {
            method,
            path,
            query,
            body,
        } = request;

        let mut headers = HeaderMap::new();
        self.authority.attach_authorization(&mut headers, body.kind());

        let url = self.url(&path)?;
        debug!(method = %method, url = %url, "Dispatching request");

        let mut builder = self
            .http
            .request(method, url)
            .headers(headers)
            .timeout(self.timeout);
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.body(serde_json::to_vec(&value)?),
            RequestBody::Multipart(form) => builder.multipart(form),
        };

        Ok(builder.send().await?)
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            Err(Error::Api {
                status: status.as_u16(),
                message: error_message(response).await,
            })
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Convenience calls
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(ApiRequest::get(path)).await?;
        Self::handle_response(response).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.send(ApiRequest::post(path).json(body)?).await?;
        Self::handle_response(response).await
    }

    pub async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.send(ApiRequest::put(path).json(body)?).await?;
        Self::handle_response(response).await
    }

    /// Upload a multipart form; the transport supplies the boundary.
    pub async fn post_multipart<T: DeserializeOwned>(&self, path: &str, form: Form) -> Result<T> {
        let response = self.send(ApiRequest::post(path).multipart(form)).await?;
        Self::handle_response(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self.send(ApiRequest::delete(path)).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Api {
                status: response.status().as_u16(),
                message: error_message(response).await,
            })
        }
    }
}

/// Pull a human-readable message out of an error body.
async fn error_message(response: reqwest::Response) -> String {
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".into());
    serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| {
            ["message", "Message", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(String::from))
        })
        .unwrap_or(text)
}

#[async_trait]
impl ProfileSource for ApiClient {
    /// Bypasses response interception: the probe has its own taxonomy.
    async fn fetch_profile(&self, user_id: i64) -> Result<ProfilePayload> {
        let response = self
            .dispatch(ApiRequest::get(profile_path(user_id)))
            .await?;
        Self::handle_response(response).await
    }
}

#[async_trait]
impl BadgeSource for ApiClient {
    async fn fetch_badge_totals(&self) -> Result<RawTotals> {
        let summary: BadgeSummary = self.get_json(BADGE_SUMMARY_PATH).await?;
        Ok(summary.into())
    }
}
