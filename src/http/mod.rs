use crate::config::Config;
use crate::error::ProxyError;
use crate::identity::Caller;
use crate::types::{ApiRequest, ApiResponse, JSON_MIME};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, IF_MODIFIED_SINCE,
    IF_NONE_MATCH, USER_AGENT,
};
use reqwest::Client;
use std::time::Duration;

/// Conditional request headers relayed from the browser to upstream.
pub const CONDITIONAL_HEADERS: [HeaderName; 2] = [IF_NONE_MATCH, IF_MODIFIED_SINCE];

/// The upstream issue-tracker API. Implementations apply the caller's
/// credentials (or the proxy bot's) and hand back status and headers
/// unmodified.
#[async_trait]
pub trait IssueApi: Send + Sync {
    async fn request(&self, caller: &Caller, req: ApiRequest) -> Result<ApiResponse, ProxyError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateMeta {
    pub remaining: Option<i32>,
    pub used: Option<i32>,
    pub reset_at: Option<String>,
}

pub fn extract_rate_from_rest(headers: &HeaderMap) -> RateMeta {
    let header_num = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok())
    };
    RateMeta {
        remaining: header_num("x-ratelimit-remaining").map(|x| x as i32),
        used: header_num("x-ratelimit-used").map(|x| x as i32),
        reset_at: header_num("x-ratelimit-reset")
            .and_then(|epoch| chrono::DateTime::<chrono::Utc>::from_timestamp(epoch, 0))
            .map(|dt| dt.to_rfc3339()),
    }
}

pub fn build_client(cfg: &Config) -> reqwest::Result<Client> {
    let mut default_headers = HeaderMap::new();
    if let Ok(ua) = HeaderValue::from_str(&cfg.user_agent) {
        default_headers.insert(USER_AGENT, ua);
    }
    // Authorization header is injected per request: it depends on the caller.
    Client::builder()
        .default_headers(default_headers)
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .use_rustls_tls()
        .build()
}

fn auth_header(token: &str) -> Result<HeaderValue, ProxyError> {
    HeaderValue::from_str(&format!("token {}", token))
        .map_err(|_| ProxyError::BadRequest("credential is not a valid header value".into()))
}

/// reqwest-backed [`IssueApi`] talking to the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: Client,
    api_url: String,
    api_version: String,
    bot_token: String,
}

impl GithubClient {
    pub fn new(cfg: &Config) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(cfg)?,
            api_url: cfg.api_url.clone(),
            api_version: cfg.api_version.clone(),
            bot_token: cfg.bot_token.clone(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl IssueApi for GithubClient {
    async fn request(&self, caller: &Caller, req: ApiRequest) -> Result<ApiResponse, ProxyError> {
        let url = self.url_for(&req.path);
        // Anonymous reads go out as the proxy bot.
        let token = caller.token().unwrap_or(&self.bot_token);
        let accept = req.accept.unwrap_or(JSON_MIME);

        let mut builder = self
            .client
            .request(req.method.clone(), &url)
            .header(AUTHORIZATION, auth_header(token)?)
            .header("X-GitHub-Api-Version", &self.api_version)
            .header(ACCEPT, accept);
        if !req.params.is_empty() {
            builder = builder.query(req.params.pairs());
        }
        for name in CONDITIONAL_HEADERS.iter() {
            if let Some(v) = req.conditional.get(name) {
                builder = builder.header(name, v);
            }
        }
        if let Some(body) = req.body {
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body);
        }

        let res = builder.send().await.map_err(|e| {
            warn!("upstream {} {} failed: {}", req.method, url, e);
            ProxyError::Transport(e.to_string())
        })?;

        let status = res.status();
        let headers = res.headers().clone();
        let rate = extract_rate_from_rest(&headers);
        debug!(
            "upstream {} {} -> {} (remaining={:?}, reset_at={:?})",
            req.method, url, status, rate.remaining, rate.reset_at
        );
        let body = res
            .bytes()
            .await
            .map_err(|e| ProxyError::Transport(e.to_string()))?;
        Ok(ApiResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
