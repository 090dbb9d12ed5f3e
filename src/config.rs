use crate::error::ConfigError;
use crate::types::{IssueState, StatusDefinition};
use std::collections::BTreeMap;
use std::env;
use std::net::SocketAddr;

const ISSUES_SUFFIX: &str = "/issues";

/// Runtime configuration for the proxy and its upstream client.
/// Values are sourced from environment variables with sensible defaults.
/// Read-only once loaded.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_version: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Credential used for anonymous callers.
    pub bot_token: String,
    pub issues_repo: String,
    pub private_repo: String,
    pub autoclosed_milestone_id: u64,
    pub statuses: BTreeMap<String, StatusDefinition>,
    pub listen_addr: SocketAddr,
    pub max_body_bytes: usize,
    pub search_rate_per_minute: u32,
}

impl Config {
    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - WEBCOMPAT_BOT_TOKEN (or GITHUB_TOKEN) [required]
    /// - WEBCOMPAT_ISSUES_REPO (default: webcompat/web-bugs/issues)
    /// - WEBCOMPAT_PRIVATE_REPO (default: webcompat/web-bugs-private/issues)
    /// - WEBCOMPAT_AUTOCLOSED_MILESTONE_ID (default: 15)
    /// - WEBCOMPAT_STATUSES (JSON object, default: stock web-bugs milestones)
    /// - WEBCOMPAT_LISTEN (default: 127.0.0.1:5000)
    /// - WEBCOMPAT_MAX_BODY_BYTES (default: 1048576)
    /// - WEBCOMPAT_SEARCH_RATE (default: 30 per minute)
    /// - GITHUB_API_URL (default: https://api.github.com)
    /// - GITHUB_API_VERSION (default: 2022-11-28)
    /// - GITHUB_HTTP_TIMEOUT_SECS (default: 30)
    /// - GITHUB_USER_AGENT (default: webcompat-proxy/<version>)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Config::from_env`] but over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("WEBCOMPAT_BOT_TOKEN")
            .or_else(|| lookup("GITHUB_TOKEN"))
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::Missing("WEBCOMPAT_BOT_TOKEN"))?;

        let api_url = lookup("GITHUB_API_URL")
            .unwrap_or_else(|| "https://api.github.com".to_string())
            .trim_end_matches('/')
            .to_string();
        let api_version = lookup("GITHUB_API_VERSION").unwrap_or_else(|| "2022-11-28".to_string());
        let timeout_secs = parse_or("GITHUB_HTTP_TIMEOUT_SECS", lookup("GITHUB_HTTP_TIMEOUT_SECS"), 30)?;
        let user_agent = lookup("GITHUB_USER_AGENT")
            .unwrap_or_else(|| format!("webcompat-proxy/{}", env!("CARGO_PKG_VERSION")));

        let issues_repo = lookup("WEBCOMPAT_ISSUES_REPO")
            .unwrap_or_else(|| "webcompat/web-bugs/issues".to_string());
        if !issues_repo.ends_with(ISSUES_SUFFIX) || issues_repo.len() == ISSUES_SUFFIX.len() {
            return Err(ConfigError::Invalid {
                name: "WEBCOMPAT_ISSUES_REPO",
                message: format!("{issues_repo:?} must look like owner/repo/issues"),
            });
        }
        let private_repo = lookup("WEBCOMPAT_PRIVATE_REPO")
            .unwrap_or_else(|| "webcompat/web-bugs-private/issues".to_string());
        let autoclosed_milestone_id = parse_or(
            "WEBCOMPAT_AUTOCLOSED_MILESTONE_ID",
            lookup("WEBCOMPAT_AUTOCLOSED_MILESTONE_ID"),
            15,
        )?;

        let statuses = match lookup("WEBCOMPAT_STATUSES") {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
                name: "WEBCOMPAT_STATUSES",
                message: e.to_string(),
            })?,
            None => default_statuses(),
        };

        let listen_addr = parse_or(
            "WEBCOMPAT_LISTEN",
            lookup("WEBCOMPAT_LISTEN"),
            SocketAddr::from(([127, 0, 0, 1], 5000)),
        )?;
        let max_body_bytes = parse_or("WEBCOMPAT_MAX_BODY_BYTES", lookup("WEBCOMPAT_MAX_BODY_BYTES"), 1 << 20)?;
        let search_rate_per_minute = parse_or("WEBCOMPAT_SEARCH_RATE", lookup("WEBCOMPAT_SEARCH_RATE"), 30)?;

        Ok(Self {
            api_url,
            api_version,
            user_agent,
            timeout_secs,
            bot_token,
            issues_repo,
            private_repo,
            autoclosed_milestone_id,
            statuses,
            listen_addr,
            max_body_bytes,
            search_rate_per_minute,
        })
    }

    /// `owner/repo` for the issues repository.
    pub fn repo_path(&self) -> &str {
        self.issues_repo
            .strip_suffix(ISSUES_SUFFIX)
            .unwrap_or(&self.issues_repo)
    }

    /// Status names usable as a category filter, in name order.
    pub fn open_categories(&self) -> Vec<&str> {
        self.statuses
            .iter()
            .filter(|(_, s)| s.state == IssueState::Open)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn status(&self, name: &str) -> Option<&StatusDefinition> {
        self.statuses.get(name)
    }

    pub fn is_valid_status(&self, milestone: u64, state: IssueState) -> bool {
        self.statuses
            .values()
            .any(|s| s.id == milestone && s.state == state)
    }
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(s) => s.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            message: e.to_string(),
        }),
    }
}

/// Milestones of the public web-bugs repository.
pub fn default_statuses() -> BTreeMap<String, StatusDefinition> {
    use IssueState::{Closed, Open};
    [
        ("needstriage", 1, Open),
        ("needsdiagnosis", 2, Open),
        ("needscontact", 3, Open),
        ("contactready", 4, Open),
        ("sitewait", 5, Open),
        ("wontfix", 6, Closed),
        ("duplicate", 7, Closed),
        ("fixed", 8, Closed),
        ("incomplete", 9, Closed),
        ("invalid", 10, Closed),
        ("non-compat", 11, Closed),
        ("worksforme", 12, Closed),
        ("moved", 13, Closed),
    ]
    .into_iter()
    .map(|(name, id, state)| (name.to_string(), StatusDefinition { id, state }))
    .collect()
}
