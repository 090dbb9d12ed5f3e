use httpmock::{Method::GET, Method::PATCH, MockServer};
use reqwest::header::{HeaderMap, IF_NONE_MATCH};
use reqwest::{Method, StatusCode};
use webcompat_proxy::config::Config;
use webcompat_proxy::error::ProxyError;
use webcompat_proxy::http::{GithubClient, IssueApi};
use webcompat_proxy::identity::Caller;
use webcompat_proxy::types::{ApiRequest, Params, JSON_MIME, JSON_MIME_HTML};

fn client_for(api_url: &str) -> GithubClient {
    let vars = [("WEBCOMPAT_BOT_TOKEN", "bot-token"), ("GITHUB_API_URL", api_url)];
    let cfg = Config::from_lookup(|name| {
        vars.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    })
    .unwrap();
    GithubClient::new(&cfg).unwrap()
}

#[tokio::test]
async fn anonymous_calls_use_bot_token() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/repos/o/r/issues/1")
                .header("authorization", "token bot-token")
                .header("accept", JSON_MIME_HTML);
            then.status(200)
                .header("etag", "\"v1\"")
                .json_body(serde_json::json!({"number": 1}));
        })
        .await;
    let client = client_for(&server.base_url());
    let req = ApiRequest::new(Method::GET, "repos/o/r/issues/1").accept(JSON_MIME_HTML);
    let resp = client.request(&Caller::Anonymous, req).await?;
    m.assert_async().await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.headers["etag"], "\"v1\"");
    let body: serde_json::Value = serde_json::from_slice(&resp.body)?;
    assert_eq!(body["number"], 1);
    Ok(())
}

#[tokio::test]
async fn user_calls_use_user_token_and_body() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/repos/o/r/issues/2")
                .header("authorization", "token user-token")
                .header("accept", JSON_MIME)
                .header("content-type", "application/json")
                .body(r#"{"milestone":2,"state":"open"}"#);
            then.status(200).json_body(serde_json::json!({}));
        })
        .await;
    let client = client_for(&server.base_url());
    let req = ApiRequest::new(Method::PATCH, "repos/o/r/issues/2")
        .body(br#"{"milestone":2,"state":"open"}"#.to_vec());
    let resp = client
        .request(&Caller::user("alice", "user-token"), req)
        .await?;
    m.assert_async().await;
    assert_eq!(resp.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn params_and_conditional_headers_forwarded() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let m = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/repos/o/r/issues")
                .query_param("milestone", "3")
                .query_param("page", "2")
                .header("if-none-match", "\"abc\"");
            then.status(304).header("etag", "\"abc\"");
        })
        .await;
    let client = client_for(&server.base_url());
    let mut conditional = HeaderMap::new();
    conditional.insert(IF_NONE_MATCH, "\"abc\"".parse()?);
    let req = ApiRequest::new(Method::GET, "repos/o/r/issues")
        .params(Params::parse(Some("page=2&milestone=3")))
        .conditional(conditional);
    let resp = client.request(&Caller::Anonymous, req).await?;
    m.assert_async().await;
    assert_eq!(resp.status, StatusCode::NOT_MODIFIED);
    assert!(resp.body.is_empty());
    Ok(())
}

#[tokio::test]
async fn upstream_errors_are_not_errors() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let _m = server
        .mock_async(|when, then| {
            when.method(GET).path("/repos/o/r/labels");
            then.status(422)
                .header("x-ratelimit-remaining", "0")
                .body("Validation Failed");
        })
        .await;
    let client = client_for(&server.base_url());
    let resp = client
        .request(&Caller::Anonymous, ApiRequest::new(Method::GET, "repos/o/r/labels"))
        .await?;
    assert_eq!(resp.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(resp.body, b"Validation Failed");
    Ok(())
}

#[tokio::test]
async fn unreachable_upstream_is_transport_error() {
    // Nothing listens on the discard port.
    let client = client_for("http://127.0.0.1:9");
    let err = client
        .request(&Caller::Anonymous, ApiRequest::new(Method::GET, "repos/o/r/labels"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::Transport(_)));
}
