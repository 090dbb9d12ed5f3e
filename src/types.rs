use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const JSON_MIME: &str = "application/vnd.github.v3+json";
pub const JSON_MIME_HTML: &str = "application/vnd.github.v3.html+json";
pub const HTML_MIME: &str = "text/html";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
        }
    }
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Milestone id plus the lifecycle state an issue must have while in it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusDefinition {
    pub id: u64,
    pub state: IssueState,
}

/// The only shape of issue edit the proxy forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditRequest {
    pub milestone: u64,
    pub state: IssueState,
}

impl EditRequest {
    /// Decodes a PATCH body. Anything other than an object with exactly the
    /// `milestone` and `state` keys yields `None`. A whole-number float
    /// such as `2.0` is the same milestone as `2`.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let obj: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(body).ok()?;
        if obj.len() != 2 {
            return None;
        }
        let milestone = obj.get("milestone")?;
        let milestone = milestone.as_u64().or_else(|| {
            milestone
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        })?;
        let state = serde_json::from_value(obj.get("state")?.clone()).ok()?;
        Some(Self { milestone, state })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueReference {
    pub repo_path: String,
    pub number: u64,
}

impl IssueReference {
    pub fn new(repo_path: &str, number: u64) -> Self {
        Self {
            repo_path: repo_path.to_string(),
            number,
        }
    }

    /// Upstream path of the issue, e.g. `repos/org/repo/issues/7`.
    pub fn api_path(&self) -> String {
        format!("repos/{}/{}", self.repo_path, self.number)
    }
}

/// Comment body as posted by the browser.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentPayload {
    #[serde(rename = "rawBody")]
    pub raw_body: String,
}

impl CommentPayload {
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }

    /// Body in the shape the upstream comments endpoint expects.
    pub fn to_upstream(&self) -> Vec<u8> {
        serde_json::json!({ "body": self.raw_body }).to_string().into_bytes()
    }
}

/// Ordered query parameters. Keys may repeat; `set` replaces every value of
/// a key while `add` appends another one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(query: Option<&str>) -> Self {
        let pairs = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        Self { pairs }
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        self.pairs.push((key.to_string(), value.into()));
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.pairs.iter().position(|(k, _)| k == key) {
            Some(idx) => {
                self.pairs[idx].1 = value;
                let mut seen = 0usize;
                self.pairs.retain(|(k, _)| {
                    if k != key {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    /// Removes every value of `key`, returning the first one.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let first = self.get(key).map(str::to_string);
        self.pairs.retain(|(k, _)| k != key);
        first
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

/// One outbound call to the upstream API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API root, without a leading slash.
    pub path: String,
    pub params: Params,
    pub body: Option<Vec<u8>>,
    pub accept: Option<&'static str>,
    /// Conditional headers from the browser (`If-None-Match`, ...).
    pub conditional: HeaderMap,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Params::new(),
            body: None,
            accept: None,
            conditional: HeaderMap::new(),
        }
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn accept(mut self, mime: &'static str) -> Self {
        self.accept = Some(mime);
        self
    }

    pub fn conditional(mut self, headers: HeaderMap) -> Self {
        self.conditional = headers;
        self
    }
}

/// Upstream answer, status and headers untouched.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// What the proxy sends back to the browser.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ProxyResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
