use crate::dispatch::{Dispatcher, RequestContext};
use crate::error::ProxyError;
use crate::http::{IssueApi, CONDITIONAL_HEADERS};
use crate::identity::Caller;
use crate::ratelimit::RateLimiter;
use crate::routes::Route;
use crate::types::{Params, ProxyResponse};
use http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, RETRY_AFTER};
use http::{HeaderMap, Method, Request, Response};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use log::{debug, info, warn};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

/// Shared by every connection.
pub struct AppState<A> {
    pub dispatcher: Dispatcher<A>,
    pub search_limiter: RateLimiter,
}

impl<A: IssueApi> AppState<A> {
    pub fn new(dispatcher: Dispatcher<A>) -> Self {
        let per_minute = dispatcher.config().search_rate_per_minute;
        Self {
            dispatcher,
            search_limiter: RateLimiter::per_minute(per_minute),
        }
    }
}

/// Accepts connections until the task is dropped, one task per connection.
pub async fn serve<A>(listener: TcpListener, state: Arc<AppState<A>>) -> std::io::Result<()>
where
    A: IssueApi + 'static,
{
    info!("listening on http://{}", listener.local_addr()?);
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };
        debug!("accepted connection from {}", peer);
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| {
                let state = Arc::clone(&state);
                async move { Ok::<_, Infallible>(handle_request(req, state, peer).await) }
            });
            if let Err(e) = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(io, service)
                .await
            {
                debug!("connection from {} closed with error: {}", peer, e);
            }
        });
    }
}

/// Entry point for one inbound request.
pub async fn handle_request<A: IssueApi>(
    req: Request<Incoming>,
    state: Arc<AppState<A>>,
    peer: SocketAddr,
) -> Response<Full<Bytes>> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let is_head = method == Method::HEAD;

    let response = match process(req, &state).await {
        Ok(resp) => build_response(resp, is_head),
        Err(e) => {
            debug!("{} {} rejected: {}", method, path, e);
            error_response(&e)
        }
    };
    info!(
        "{} \"{} {}\" {} {}ms",
        peer,
        method,
        path,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

async fn process<A: IssueApi>(
    req: Request<Incoming>,
    state: &AppState<A>,
) -> Result<ProxyResponse, ProxyError> {
    let method = req.method().clone();
    let route = Route::resolve(&method, req.uri().path())?;
    let caller = Caller::from_headers(req.headers());
    let params = Params::parse(req.uri().query());
    let conditional = conditional_headers(req.headers());

    let max_body = state.dispatcher.config().max_body_bytes;
    let declared_len = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > max_body) {
        return Err(ProxyError::PayloadTooLarge);
    }
    let body = Limited::new(req.into_body(), max_body)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<LengthLimitError>() {
                ProxyError::PayloadTooLarge
            } else {
                ProxyError::BadRequest(e.to_string())
            }
        })?
        .to_bytes();

    let ctx = RequestContext::new(caller)
        .with_params(params)
        .with_body(body.to_vec())
        .with_conditional(conditional);

    let hits_search = match route {
        Route::Search => true,
        Route::ListIssues => ctx.list_redirects_to_search(),
        _ => false,
    };
    if hits_search {
        state.search_limiter.check(ctx.caller.rate_limit_key())?;
    }

    let d = &state.dispatcher;
    match route {
        Route::GetIssue(n) => d.get_issue(ctx, n).await,
        Route::EditIssue(n) => d.edit_issue(ctx, n).await,
        Route::ListIssues => d.list_issues(ctx).await,
        Route::ListPrivate => d.list_private(ctx).await,
        Route::Search => d.search_issues(ctx).await,
        Route::RepoLabels => d.repo_labels(ctx).await,
        Route::Category(category) => d.category_issues(ctx, &category).await,
        Route::Comments(n) => d.comments(&method, ctx, n).await,
        Route::ModifyLabels(n) => d.modify_labels(ctx, n).await,
        Route::UserActivity { username, parameter } => {
            d.user_activity_issues(ctx, &username, &parameter).await
        }
    }
}

fn conditional_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for name in CONDITIONAL_HEADERS.iter() {
        if let Some(v) = headers.get(name) {
            out.insert(name.clone(), v.clone());
        }
    }
    out
}

fn build_response(resp: ProxyResponse, is_head: bool) -> Response<Full<Bytes>> {
    let body = if is_head { Vec::new() } else { resp.body };
    let mut out = Response::new(Full::new(Bytes::from(body)));
    *out.status_mut() = resp.status;
    *out.headers_mut() = resp.headers;
    out
}

pub fn error_response(err: &ProxyError) -> Response<Full<Bytes>> {
    let status = err.status();
    let text = match err {
        // Upstream details stay in the log.
        ProxyError::Transport(_) | ProxyError::Render(_) => status
            .canonical_reason()
            .unwrap_or("error")
            .to_string(),
        other => other.to_string(),
    };
    let mut out = Response::new(Full::new(Bytes::from(text)));
    *out.status_mut() = status;
    out.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    if let ProxyError::RateLimited { retry_after_secs } = err {
        out.headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(*retry_after_secs));
    }
    if matches!(err, ProxyError::Transport(_) | ProxyError::Render(_)) {
        warn!("request failed: {}", err);
    }
    out
}
