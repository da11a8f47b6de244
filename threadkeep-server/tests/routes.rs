use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use threadkeep_config::{
    AuthConfig, CryptoConfig, ProviderConfig, ServerConfig, ThreadConfig, TokenGrant,
};
use threadkeep_server::{AppState, StaticTokens, router};
use threadkeep_store::{SecretCipher, Store};
use tower::ServiceExt;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ALICE: &str = "tok-alice";

fn config(provider: &MockServer, default_key: Option<&str>, sync: bool) -> ServerConfig {
    ServerConfig {
        provider: ProviderConfig {
            base_url: provider.uri(),
            api_key: default_key.map(str::to_string),
            timeout_secs: 5,
            retries: 0,
        },
        thread: ThreadConfig { max_pages: 3 },
        crypto: sync.then(|| CryptoConfig {
            key_id: "v1".into(),
            key: "A".repeat(43),
        }),
        auth: AuthConfig {
            tokens: vec![TokenGrant {
                token: ALICE.into(),
                user_id: "alice".into(),
            }],
        },
        ..Default::default()
    }
}

async fn app(config: ServerConfig) -> Router {
    let store = Store::memory().await.unwrap();
    let tokens = Arc::new(StaticTokens::new(&config.auth.tokens));
    router(AppState::from_parts(config, store, tokens).unwrap())
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn tweet(id: &str) -> Value {
    json!({ "id": id, "text": format!("tweet {id}"), "author": { "id": "1", "userName": "ann" } })
}

async fn mount_tweets(server: &MockServer, ids: &str, key: &str, tweets: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/twitter/tweets"))
        .and(query_param("tweet_ids", ids))
        .and(header("x-api-key", key))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "tweets": tweets, "status": "success" })),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn health_is_ok() {
    let provider = MockServer::start().await;
    let app = app(config(&provider, None, false)).await;
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn header_key_is_forwarded() {
    let provider = MockServer::start().await;
    mount_tweets(&provider, "1,2", "hdr-key", vec![tweet("1"), tweet("2")]).await;
    let app = app(config(&provider, Some("default-key"), false)).await;

    let req = Request::get("/api/tweets?ids=1,2,1")
        .header("X-API-Key", "hdr-key")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tweets"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn default_key_is_the_fallback() {
    let provider = MockServer::start().await;
    mount_tweets(&provider, "7", "default-key", vec![tweet("7")]).await;
    let app = app(config(&provider, Some("default-key"), false)).await;

    let (status, body) = send(&app, get("/api/tweets/7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "7");
    assert_eq!(body["author"]["userName"], "ann");
}

#[tokio::test]
async fn requests_without_any_key_are_unauthorized() {
    let provider = MockServer::start().await;
    let app = app(config(&provider, None, true)).await;

    let (status, body) = send(&app, get("/api/tweets/7")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("API key"));
}

#[tokio::test]
async fn invalid_ids_are_rejected_before_the_provider() {
    let provider = MockServer::start().await;
    let app = app(config(&provider, Some("k"), false)).await;

    assert_eq!(send(&app, get("/api/tweets")).await.0, StatusCode::BAD_REQUEST);
    assert_eq!(send(&app, get("/api/tweets?ids=1,x")).await.0, StatusCode::BAD_REQUEST);
    assert_eq!(send(&app, get("/api/tweets/abc")).await.0, StatusCode::BAD_REQUEST);
    let many = (1..=101).map(|n| n.to_string()).collect::<Vec<_>>().join(",");
    assert_eq!(
        send(&app, get(&format!("/api/tweets?ids={many}"))).await.0,
        StatusCode::BAD_REQUEST
    );
    assert!(provider.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn provider_failures_are_mapped() {
    let provider = MockServer::start().await;
    Mock::given(path("/twitter/tweets"))
        .and(query_param("tweet_ids", "1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "msg": "bad key" })))
        .mount(&provider)
        .await;
    Mock::given(path("/twitter/tweets"))
        .and(query_param("tweet_ids", "2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&provider)
        .await;
    mount_tweets(&provider, "3", "k", vec![]).await;
    let app = app(config(&provider, Some("k"), false)).await;

    assert_eq!(send(&app, get("/api/tweets/1")).await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(send(&app, get("/api/tweets/2")).await.0, StatusCode::BAD_GATEWAY);
    assert_eq!(send(&app, get("/api/tweets/3")).await.0, StatusCode::NOT_FOUND);
}

async fn mount_thread_page(server: &MockServer, cursor: Option<&str>, next: &str) {
    let mock = Mock::given(path("/twitter/tweet/thread_context")).and(query_param("tweetId", "101"));
    let mock = match cursor {
        Some(c) => mock.and(query_param("cursor", c)),
        None => mock.and(query_param_is_missing("cursor")),
    };
    mock.respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "tweets": [tweet("101")],
        "has_next_page": true,
        "next_cursor": next,
        "status": "success"
    })))
    .mount(server)
    .await;
}

#[tokio::test]
async fn thread_pages_are_clamped_to_the_configured_cap() {
    let provider = MockServer::start().await;
    mount_thread_page(&provider, None, "c1").await;
    mount_thread_page(&provider, Some("c1"), "c2").await;
    mount_thread_page(&provider, Some("c2"), "c3").await;
    mount_thread_page(&provider, Some("c3"), "c4").await;
    let app = app(config(&provider, Some("k"), false)).await;

    let (status, body) = send(&app, get("/api/thread/101?max_pages=50")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pages"], 3);
    assert_eq!(body["truncated"], true);
    assert_eq!(body["rootTweetId"], "101");
    assert_eq!(body["tweets"].as_array().unwrap().len(), 1);

    let (_, body) = send(&app, get("/api/thread/101?max_pages=0")).await;
    assert_eq!(body["pages"], 1);
}

fn with_bearer(builder: axum::http::request::Builder, token: &str) -> axum::http::request::Builder {
    builder.header("Authorization", format!("Bearer {token}"))
}

#[tokio::test]
async fn stored_keys_sync_and_back_tweet_requests() {
    let provider = MockServer::start().await;
    mount_tweets(&provider, "5", "stored-key", vec![tweet("5")]).await;
    let app = app(config(&provider, None, true)).await;

    let put = with_bearer(Request::put("/api/key"), ALICE)
        .header("content-type", "application/json")
        .body(Body::from(json!({ "apiKey": "stored-key" }).to_string()))
        .unwrap();
    let (status, body) = send(&app, put).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["updatedAt"].is_string());

    let (status, body) = send(&app, with_bearer(Request::get("/api/key"), ALICE).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["apiKey"], "stored-key");

    let req = with_bearer(Request::get("/api/tweets/5"), ALICE)
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, req).await.0, StatusCode::OK);

    let del = with_bearer(Request::delete("/api/key"), ALICE)
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, del).await.0, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, with_bearer(Request::get("/api/key"), ALICE).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn key_sealed_under_a_retired_id_falls_back_to_the_default() {
    let provider = MockServer::start().await;
    mount_tweets(&provider, "5", "default-key", vec![tweet("5")]).await;

    let store = Store::memory().await.unwrap();
    let retired = SecretCipher::new("v0", [3u8; 32]).unwrap();
    store.put_api_key("alice", "old-key", &retired).await.unwrap();
    let config = config(&provider, Some("default-key"), true);
    let tokens = Arc::new(StaticTokens::new(&config.auth.tokens));
    let app = router(AppState::from_parts(config, store, tokens).unwrap());

    let req = with_bearer(Request::get("/api/tweets/5"), ALICE)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "5");
}

#[tokio::test]
async fn key_routes_require_a_valid_bearer() {
    let provider = MockServer::start().await;
    let app = app(config(&provider, None, true)).await;

    assert_eq!(send(&app, get("/api/key")).await.0, StatusCode::UNAUTHORIZED);
    let req = with_bearer(Request::get("/api/key"), "tok-mallory")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, req).await.0, StatusCode::UNAUTHORIZED);

    let empty = with_bearer(Request::put("/api/key"), ALICE)
        .header("content-type", "application/json")
        .body(Body::from(json!({ "apiKey": "  " }).to_string()))
        .unwrap();
    assert_eq!(send(&app, empty).await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn key_sync_without_crypto_is_unavailable() {
    let provider = MockServer::start().await;
    let app = app(config(&provider, None, false)).await;

    let req = with_bearer(Request::get("/api/key"), ALICE)
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, req).await.0, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn serves_over_tcp_until_shutdown() {
    let provider = MockServer::start().await;
    let store = Store::memory().await.unwrap();
    let cfg = config(&provider, None, false);
    let tokens = Arc::new(StaticTokens::new(&cfg.auth.tokens));
    let state = AppState::from_parts(cfg, store, tokens).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(threadkeep_server::serve_with_shutdown(listener, state, async {
        let _ = rx.await;
    }));

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    assert!(raw.starts_with("HTTP/1.1 200"));
    assert!(raw.contains(r#"{"status":"ok"}"#));

    tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
