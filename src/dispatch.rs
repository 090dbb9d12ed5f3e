//! Issue-API proxy dispatcher.
//!
//! Every operation checks the caller and the request shape, then makes at
//! most one upstream call. Local rejections never reach upstream; upstream
//! answers are relayed with their status untouched.

use crate::config::Config;
use crate::error::ProxyError;
use crate::http::IssueApi;
use crate::identity::Caller;
use crate::render::CommentRenderer;
use crate::types::{
    ApiRequest, ApiResponse, CommentPayload, EditRequest, IssueReference, Params, ProxyResponse,
    HTML_MIME, JSON_MIME, JSON_MIME_HTML,
};
use http::header::{HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, ETAG, LAST_MODIFIED, LINK};
use http::{HeaderMap, Method, StatusCode};
use log::debug;
use std::sync::Arc;

/// Comments fetched per request; later pages are left to the client.
pub const COMMENTS_PER_PAGE: u32 = 100;

const NEEDSINFO_PARAMETER: &str = "needsinfo";
const CLOSED_CATEGORY: &str = "closed";

/// Everything an operation needs from the inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub caller: Caller,
    pub params: Params,
    pub body: Vec<u8>,
    /// Conditional headers to forward upstream.
    pub conditional: HeaderMap,
}

impl RequestContext {
    pub fn new(caller: Caller) -> Self {
        Self {
            caller,
            params: Params::new(),
            body: Vec::new(),
            conditional: HeaderMap::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_conditional(mut self, headers: HeaderMap) -> Self {
        self.conditional = headers;
        self
    }

    /// Whether `/issues` hands this request over to search: only signed-in
    /// callers with a non-empty `q`.
    pub fn list_redirects_to_search(&self) -> bool {
        self.caller.is_authenticated() && has_query(&self.params)
    }
}

fn has_query(params: &Params) -> bool {
    params.get("q").is_some_and(|q| !q.is_empty())
}

pub struct Dispatcher<A> {
    cfg: Arc<Config>,
    api: A,
    renderer: CommentRenderer,
}

impl<A: IssueApi> Dispatcher<A> {
    pub fn new(cfg: Arc<Config>, api: A) -> Result<Self, ProxyError> {
        Ok(Self {
            cfg,
            api,
            renderer: CommentRenderer::new()?,
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    fn issue(&self, number: u64) -> IssueReference {
        IssueReference::new(&self.cfg.issues_repo, number)
    }

    fn issues_path(&self) -> String {
        format!("repos/{}", self.cfg.issues_repo)
    }

    async fn call(&self, caller: &Caller, req: ApiRequest) -> Result<ApiResponse, ProxyError> {
        debug!("-> upstream {} {}", req.method, req.path);
        self.api.request(caller, req).await
    }

    /// GET a single issue, as the caller or the proxy bot.
    pub async fn get_issue(&self, ctx: RequestContext, number: u64) -> Result<ProxyResponse, ProxyError> {
        let req = ApiRequest::new(Method::GET, self.issue(number).api_path())
            .accept(JSON_MIME_HTML)
            .conditional(ctx.conditional);
        let resp = self.call(&ctx.caller, req).await?;
        Ok(self.relay(resp, JSON_MIME_HTML))
    }

    /// PATCH milestone and state of an issue. Only an exact configured
    /// (milestone, state) pair gets through; everything else is Forbidden.
    pub async fn edit_issue(&self, ctx: RequestContext, number: u64) -> Result<ProxyResponse, ProxyError> {
        if !ctx.caller.is_authenticated() {
            return Err(ProxyError::Forbidden);
        }
        let Some(edit) = EditRequest::parse(&ctx.body) else {
            debug!("edit of #{} rejected: body is not a status edit", number);
            return Err(ProxyError::Forbidden);
        };
        if !self.cfg.is_valid_status(edit.milestone, edit.state) {
            debug!(
                "edit of #{} rejected: ({}, {}) is not a configured status",
                number, edit.milestone, edit.state
            );
            return Err(ProxyError::Forbidden);
        }
        let req = ApiRequest::new(Method::PATCH, self.issue(number).api_path()).body(ctx.body);
        let resp = self.call(&ctx.caller, req).await?;
        Ok(self.relay(resp, JSON_MIME_HTML))
    }

    /// List issues of the public repository. A `q` parameter turns this
    /// into a search for signed-in callers.
    pub async fn list_issues(&self, ctx: RequestContext) -> Result<ProxyResponse, ProxyError> {
        if ctx.list_redirects_to_search() {
            return self.search_issues(ctx).await;
        }
        if has_query(&ctx.params) {
            // Anonymous searches are made by the browser directly.
            return Err(ProxyError::NotFound);
        }
        self.list_in(&self.issues_path(), ctx).await
    }

    /// Auto-closed issues from the private repository.
    pub async fn list_private(&self, mut ctx: RequestContext) -> Result<ProxyResponse, ProxyError> {
        if !ctx.caller.is_authenticated() {
            return Err(ProxyError::NotFound);
        }
        ctx.params
            .set("milestone", self.cfg.autoclosed_milestone_id.to_string());
        let path = format!("repos/{}", self.cfg.private_repo);
        self.list_in(&path, ctx).await
    }

    /// Issues a user created, is mentioned in, or that wait on them for
    /// more information (`needsinfo`).
    pub async fn user_activity_issues(
        &self,
        mut ctx: RequestContext,
        username: &str,
        parameter: &str,
    ) -> Result<ProxyResponse, ProxyError> {
        if !ctx.caller.is_authenticated() {
            return Err(ProxyError::Unauthorized);
        }
        ctx.params.set("state", "all");
        if parameter == NEEDSINFO_PARAMETER {
            ctx.params
                .set("labels", format!("status-needsinfo-{}", username));
        } else {
            ctx.params.set(parameter, username);
        }
        self.list_in(&self.issues_path(), ctx).await
    }

    /// Issues in an open status category, or all closed issues.
    pub async fn category_issues(
        &self,
        mut ctx: RequestContext,
        category: &str,
    ) -> Result<ProxyResponse, ProxyError> {
        if self.cfg.open_categories().contains(&category) {
            let status = self.cfg.status(category).ok_or(ProxyError::NotFound)?;
            ctx.params.set("milestone", status.id.to_string());
        } else if category == CLOSED_CATEGORY {
            ctx.params.set("state", "closed");
        } else {
            return Err(ProxyError::NotFound);
        }
        self.list_in(&self.issues_path(), ctx).await
    }

    /// Search API restricted to issues of the configured repository.
    pub async fn search_issues(&self, ctx: RequestContext) -> Result<ProxyResponse, ProxyError> {
        let query = ctx.params.get("q").unwrap_or_default().to_string();
        if query.trim().is_empty() {
            return Err(ProxyError::NotFound);
        }
        let params = search_params(&query, ctx.params, self.cfg.repo_path());
        let req = ApiRequest::new(Method::GET, "search/issues")
            .params(params)
            .accept(JSON_MIME_HTML)
            .conditional(ctx.conditional);
        let resp = self.call(&ctx.caller, req).await?;
        Ok(self.relay(resp, JSON_MIME_HTML))
    }

    /// GET or POST on an issue's comments. POST from an anonymous caller
    /// is served as a GET.
    pub async fn comments(
        &self,
        method: &Method,
        ctx: RequestContext,
        number: u64,
    ) -> Result<ProxyResponse, ProxyError> {
        if *method == Method::POST && ctx.caller.is_authenticated() {
            self.post_comment(ctx, number).await
        } else {
            self.get_comments(ctx, number).await
        }
    }

    /// First page of comments rendered as HTML. A 304 from upstream is
    /// relayed with an empty body so the browser cache answers.
    pub async fn get_comments(&self, mut ctx: RequestContext, number: u64) -> Result<ProxyResponse, ProxyError> {
        // TODO: fetch further pages when an issue has more than 100 comments
        ctx.params.set("per_page", COMMENTS_PER_PAGE.to_string());
        let path = format!("{}/comments", self.issue(number).api_path());
        let req = ApiRequest::new(Method::GET, path)
            .params(ctx.params)
            .accept(JSON_MIME_HTML)
            .conditional(ctx.conditional);
        let resp = self.call(&ctx.caller, req).await?;

        if resp.status == StatusCode::NOT_MODIFIED {
            let mut out = self.relay(resp, HTML_MIME);
            out.body.clear();
            return Ok(out);
        }
        if !resp.status.is_success() {
            return Ok(self.relay(resp, JSON_MIME));
        }
        let html = self.renderer.render_comment_list(&resp.body)?;
        Ok(self.rendered(resp, html))
    }

    /// Creates a comment as the signed-in caller and returns it as HTML.
    pub async fn post_comment(&self, ctx: RequestContext, number: u64) -> Result<ProxyResponse, ProxyError> {
        if !ctx.caller.is_authenticated() {
            return Err(ProxyError::Forbidden);
        }
        let payload = CommentPayload::parse(&ctx.body)
            .ok_or_else(|| ProxyError::BadRequest("expected {\"rawBody\": string}".into()))?;
        let path = format!("{}/comments", self.issue(number).api_path());
        let req = ApiRequest::new(Method::POST, path)
            .params(ctx.params)
            .body(payload.to_upstream())
            .accept(JSON_MIME_HTML);
        let resp = self.call(&ctx.caller, req).await?;
        if !resp.status.is_success() {
            return Ok(self.relay(resp, JSON_MIME));
        }
        let html = self.renderer.render_comment(&resp.body)?;
        Ok(self.rendered(resp, html))
    }

    /// Replaces the labels of an issue. An empty array clears them.
    pub async fn modify_labels(&self, ctx: RequestContext, number: u64) -> Result<ProxyResponse, ProxyError> {
        if !ctx.caller.is_authenticated() {
            return Err(ProxyError::Forbidden);
        }
        if serde_json::from_slice::<Vec<String>>(&ctx.body).is_err() {
            return Err(ProxyError::BadRequest("expected an array of label names".into()));
        }
        let path = format!("{}/labels", self.issue(number).api_path());
        let req = ApiRequest::new(Method::PUT, path).body(ctx.body);
        let resp = self.call(&ctx.caller, req).await?;
        Ok(self.relay(resp, JSON_MIME))
    }

    /// Every label defined in the repository.
    pub async fn repo_labels(&self, ctx: RequestContext) -> Result<ProxyResponse, ProxyError> {
        let path = format!("repos/{}/labels", self.cfg.repo_path());
        self.list_in(&path, ctx).await
    }

    async fn list_in(&self, path: &str, ctx: RequestContext) -> Result<ProxyResponse, ProxyError> {
        let req = ApiRequest::new(Method::GET, path)
            .params(ctx.params)
            .conditional(ctx.conditional);
        let resp = self.call(&ctx.caller, req).await?;
        Ok(self.relay(resp, JSON_MIME))
    }

    fn rendered(&self, resp: ApiResponse, html: String) -> ProxyResponse {
        let mut out = self.relay(resp, HTML_MIME);
        out.body = html.into_bytes();
        out
    }

    /// Upstream status and body with the cache, pagination and rate-limit
    /// headers carried over. The content type is always the operation's own.
    fn relay(&self, resp: ApiResponse, mime: &'static str) -> ProxyResponse {
        let mut headers = HeaderMap::new();
        for (name, value) in resp.headers.iter() {
            if !is_relayed_header(name) {
                continue;
            }
            if *name == LINK {
                let rewritten = value
                    .to_str()
                    .ok()
                    .map(|v| rewrite_link_header(v, &self.cfg))
                    .and_then(|v| HeaderValue::from_str(&v).ok());
                if let Some(v) = rewritten {
                    headers.insert(LINK, v);
                }
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(mime));
        ProxyResponse {
            status: resp.status,
            headers,
            body: resp.body,
        }
    }
}

fn is_relayed_header(name: &HeaderName) -> bool {
    *name == ETAG
        || *name == CACHE_CONTROL
        || *name == LAST_MODIFIED
        || *name == LINK
        || name.as_str().starts_with("x-ratelimit-")
}

/// Points upstream pagination URLs back at the proxy's own routes.
pub fn rewrite_link_header(link: &str, cfg: &Config) -> String {
    let api = cfg.api_url.trim_end_matches('/');
    link.replace(
        &format!("{}/repos/{}/labels", api, cfg.repo_path()),
        "/api/issues/labels",
    )
    .replace(
        &format!("{}/repos/{}", api, cfg.private_repo),
        "/api/private",
    )
    .replace(&format!("{}/repos/{}", api, cfg.issues_repo), "/api/issues")
    .replace(&format!("{}/search/issues", api), "/api/issues/search")
}

fn is_scope_term(term: &str) -> bool {
    term.starts_with("repo:") || term == "is:issue" || term == "is:pr"
}

fn qualifier(name: &str, value: &str) -> String {
    if value.contains(char::is_whitespace) {
        format!("{}:\"{}\"", name, value)
    } else {
        format!("{}:{}", name, value)
    }
}

/// Rewrites issue-list parameters into a search query scoped to
/// `repo_path`. The query always ends with `repo:<repo_path> is:issue`,
/// whatever scope terms the caller supplied.
pub fn search_params(query: &str, mut params: Params, repo_path: &str) -> Params {
    let mut terms: Vec<String> = query
        .split_whitespace()
        .filter(|t| !is_scope_term(t))
        .map(str::to_string)
        .collect();

    if let Some(direction) = params.remove("direction") {
        params.set("order", direction);
    }
    if let Some(state) = params.remove("state") {
        if state != "all" {
            terms.push(qualifier("state", &state));
        }
    }
    for (param, name) in [("creator", "author"), ("mentioned", "mentions"), ("assignee", "assignee")] {
        if let Some(value) = params.remove(param) {
            terms.push(qualifier(name, &value));
        }
    }
    if let Some(labels) = params.remove("labels") {
        terms.extend(
            labels
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(|l| qualifier("label", l)),
        );
    }

    terms.push(format!("repo:{}", repo_path));
    terms.push("is:issue".to_string());
    params.set("q", terms.join(" "));
    params
}
