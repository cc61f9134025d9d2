mod common;

use axum::body::{to_bytes, Body};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use common::{codec, empty_profile, window};
use pretty_assertions::assert_eq;
use rtprof::report::request_router;
use rtprof::server::{build_app, AccessPolicy};
use rtprof::utils::error::ServeError;
use rtprof::{AccessControlledServer, Aggregator, Fetcher, RequestRouter};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

fn ping_router() -> RequestRouter {
    RequestRouter::new().handle("/ping", get(|| async { "pong" }))
}

fn app_for(host: &str, peer: [u8; 4]) -> Router {
    build_app(ping_router(), AccessPolicy::for_host(host))
        .layer(MockConnectInfo(SocketAddr::from((peer, 40000))))
}

async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_loopback_host_rejects_remote_peer() {
    let (status, body) = get_body(app_for("localhost", [10, 1, 2, 3]), "/ping").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "permission denied");
}

#[tokio::test]
async fn test_loopback_host_admits_local_peer() {
    let (status, body) = get_body(app_for("localhost", [127, 0, 0, 1]), "/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "pong");
}

#[tokio::test]
async fn test_open_host_admits_remote_peer() {
    let (status, _) = get_body(app_for("0.0.0.0", [10, 1, 2, 3]), "/ping").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_peer_is_refused_when_loopback_only() {
    let app = build_app(ping_router(), AccessPolicy::for_host("127.0.0.1"));
    let (status, _) = get_body(app, "/ping").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unregistered_path_uses_fallback() {
    let (status, body) = get_body(app_for("localhost", [127, 0, 0, 1]), "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "no handler registered for /nope");

    let router = ping_router().fallback(get(|| async { "custom" }));
    let app = build_app(router, AccessPolicy::for_host("0.0.0.0"));
    let (status, body) = get_body(app, "/elsewhere").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "custom");
}

#[test]
fn test_router_paths_are_normalized() {
    let router = RequestRouter::new()
        .handle("top", get(|| async { "a" }))
        .handle("/top", get(|| async { "b" }))
        .handle("/profile", get(|| async { "c" }));
    let paths: Vec<&str> = router.paths().collect();
    assert_eq!(paths, vec!["/top", "/profile"]);
}

fn report_app() -> (Arc<Aggregator>, Router) {
    let agg = Arc::new(Aggregator::new(codec(), Arc::new(empty_profile())));
    let fetcher: Arc<dyn Fetcher> = agg.clone();
    let app = build_app(request_router(fetcher, codec()), AccessPolicy::for_host("0.0.0.0"));
    (agg, app)
}

#[tokio::test]
async fn test_report_endpoints() {
    let (agg, app) = report_app();
    agg.update(&window(&[("main;work;hash", 30), ("main;io", 10)]))
        .unwrap();

    let (status, body) = get_body(app.clone(), "/collapsed").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("main;work;hash 30\n"));

    let (status, body) = get_body(app.clone(), "/top?n=1&unit=us").await;
    assert_eq!(status, StatusCode::OK);
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["unit"], "us");
    assert_eq!(report["rows"].as_array().unwrap().len(), 1);
    assert_eq!(report["rows"][0]["function"], "hash");

    let (status, body) = get_body(app.clone(), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("hash"));

    let (status, body) = get_body(app.clone(), "/profile").await;
    assert_eq!(status, StatusCode::OK);
    let profile: rtprof::Profile = serde_json::from_str(&body).unwrap();
    assert_eq!(profile.total_weight(), 40);
}

#[tokio::test]
async fn test_report_rejects_bad_queries() {
    let (_agg, app) = report_app();

    let (status, body) = get_body(app.clone(), "/top?unit=hours").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "invalid unit string");

    let (status, body) = get_body(app.clone(), "/profile?source=remote").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "unknown source remote");
}

#[tokio::test]
async fn test_reset_endpoint() {
    let (agg, app) = report_app();
    agg.update(&window(&[("main", 5)])).unwrap();

    let (status, _) = get_body(app.clone(), "/reset").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(agg.current().weight_of("main"), 5);

    let request = Request::post("/reset").body(Body::empty()).unwrap();
    let (status, _) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(agg.current().is_empty());

    agg.update(&window(&[("main", 2)])).unwrap();
    let (status, body) = get_body(app, "/profile?source=-").await;
    assert_eq!(status, StatusCode::OK);
    let profile: rtprof::Profile = serde_json::from_str(&body).unwrap();
    assert!(profile.is_empty());
}

#[tokio::test]
async fn test_real_listener_serves_and_shuts_down() {
    let server = AccessControlledServer::bind("127.0.0.1:0", "localhost", ping_router())
        .await
        .unwrap();
    assert!(server.policy().loopback_only);
    let mut handle = server.spawn();
    let addr = handle.local_addr();

    let body = reqwest::get(format!("http://{}/ping", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "pong");
    assert!(handle.is_serving());

    handle.shutdown().await.unwrap();
    assert!(!handle.is_serving());
    handle.shutdown().await.unwrap();

    assert!(reqwest::get(format!("http://{}/ping", addr)).await.is_err());
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    let err = AccessControlledServer::bind(&addr, "localhost", ping_router())
        .await
        .err()
        .expect("second bind fails");

    match err {
        ServeError::Bind { addr: failed, .. } => assert_eq!(failed, addr),
        other => panic!("expected bind error, got {other}"),
    }
}

/// Sets the flag when the handler future is dropped
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_shutdown_terminates_stuck_requests() {
    let dropped = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&dropped);
    let router = RequestRouter::new().handle(
        "/hang",
        get(move || async move {
            let _flag = DropFlag(flag);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            "never"
        }),
    );
    let mut handle = AccessControlledServer::bind("127.0.0.1:0", "localhost", router)
        .await
        .unwrap()
        .spawn();
    let url = format!("http://{}/hang", handle.local_addr());
    let client = tokio::spawn(async move { reqwest::get(url).await.map(|r| r.status()) });

    for _ in 0..200 {
        if handle.in_flight() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(handle.in_flight(), 1);

    let started = Instant::now();
    handle
        .shutdown_within(Duration::from_millis(200))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    let status = tokio::time::timeout(Duration::from_secs(5), client)
        .await
        .expect("client is released after shutdown")
        .unwrap();
    if let Ok(status) = status {
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(handle.in_flight(), 0);
}
