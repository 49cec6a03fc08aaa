//! End-to-end tests: real relay server, real sockets, mock origin
//!
//! Spins up the full hyper front end on an ephemeral port and drives it with
//! an HTTP client, with wiremock standing in for the video origin.

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use std::net::SocketAddr;
use stream_relay::{Course, Lecture, RelayConfig, RelayServer, StaticCatalog};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JWT_SECRET: &str = "integration-test-secret";

#[derive(Serialize)]
struct TestClaims {
    _id: String,
    email: String,
    exp: usize,
}

fn token_for(user_id: &str) -> String {
    let claims = TestClaims {
        _id: user_id.to_string(),
        email: format!("{}@example.com", user_id),
        exp: 4102444800,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

fn catalog(origin: &str) -> StaticCatalog {
    StaticCatalog::default()
        .with_course(Course {
            id: "course-paid".into(),
            is_paid: true,
            price: 4900,
            is_active: true,
        })
        .with_course(Course {
            id: "course-free".into(),
            is_paid: false,
            price: 0,
            is_active: true,
        })
        .with_lecture(Lecture {
            id: "lec-locked".into(),
            course_id: "course-paid".into(),
            is_preview: false,
            preview_url: None,
            video_url: Some(format!("{}/locked.mp4", origin)),
        })
        .with_lecture(Lecture {
            id: "lec-preview".into(),
            course_id: "course-paid".into(),
            is_preview: true,
            preview_url: Some(format!("{}/preview.mp4", origin)),
            video_url: Some(format!("{}/locked.mp4", origin)),
        })
        .with_lecture(Lecture {
            id: "lec-hls".into(),
            course_id: "course-free".into(),
            is_preview: false,
            preview_url: None,
            video_url: Some(format!("{}/hls/index.m3u8", origin)),
        })
        .with_grant("buyer", "course-paid")
}

/// Start a relay wired to the given origin and return its address.
async fn start_relay(origin: &str) -> SocketAddr {
    let config = RelayConfig {
        listen_address: "127.0.0.1:0".to_string(),
        probe_timeout_secs: 2,
        fetch_timeout_secs: 3,
        jwt_secret: Some(JWT_SECRET.to_string()),
        ..Default::default()
    };

    let server = RelayServer::new(&config, catalog(origin)).unwrap();
    let bound = server.bind().await.unwrap();
    let addr = bound.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = bound.serve().await;
    });
    addr
}

#[tokio::test]
async fn test_locked_lecture_denied_without_any_upstream_call() {
    let origin = MockServer::start().await;

    // The gate must reject before any upstream connection is opened
    Mock::given(method("GET"))
        .and(path("/locked.mp4"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&origin)
        .await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&origin)
        .await;

    let relay = start_relay(&origin.uri()).await;
    let client = reqwest::Client::new();

    // Anonymous caller: 401
    let response = client
        .get(format!("http://{}/stream/lec-locked", relay))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // Verified caller without a grant: 403
    let response = client
        .get(format!("http://{}/stream/lec-locked", relay))
        .bearer_auth(token_for("stranger"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Not authorized to stream this video");
}

#[tokio::test]
async fn test_preview_streams_anonymously() {
    let origin = MockServer::start().await;
    let data: Vec<u8> = (0u8..=255).cycle().take(512).collect();

    Mock::given(method("GET"))
        .and(path("/preview.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "video/mp4")
                .set_body_bytes(data.clone()),
        )
        .mount(&origin)
        .await;

    let relay = start_relay(&origin.uri()).await;

    let response = reqwest::get(format!("http://{}/stream/lec-preview", relay))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
    assert_eq!(response.bytes().await.unwrap(), data);
}

#[tokio::test]
async fn test_grant_holder_gets_sliced_206() {
    let origin = MockServer::start().await;
    let data: Vec<u8> = (0u8..=255).cycle().take(1000).collect();

    // Range-naive origin: always the full body
    Mock::given(method("GET"))
        .and(path("/locked.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(data.clone()))
        .mount(&origin)
        .await;

    let relay = start_relay(&origin.uri()).await;
    let client = reqwest::Client::new();

    // Token passed as a query parameter, the header-less player path
    let response = client
        .get(format!(
            "http://{}/stream/lec-locked?token={}",
            relay,
            token_for("buyer")
        ))
        .header("Range", "bytes=100-199")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 206);
    assert_eq!(response.headers()["content-range"], "bytes 100-199/1000");
    assert_eq!(response.headers()["content-length"], "100");
    assert_eq!(response.headers()["accept-ranges"], "bytes");
    assert_eq!(response.bytes().await.unwrap(), &data[100..=199]);
}

#[tokio::test]
async fn test_generic_stream_proxies_by_url() {
    let origin = MockServer::start().await;
    let data = b"generic proxy payload".to_vec();

    Mock::given(method("GET"))
        .and(path("/asset.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(data.clone()))
        .mount(&origin)
        .await;

    let relay = start_relay(&origin.uri()).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{}/stream", relay))
        .query(&[("url", format!("{}/asset.mp4", origin.uri()))])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.bytes().await.unwrap(), data);
}

#[tokio::test]
async fn test_generic_stream_requires_url() {
    let origin = MockServer::start().await;
    let relay = start_relay(&origin.uri()).await;

    let response = reqwest::get(format!("http://{}/stream", relay))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "URL parameter is required");
}

#[tokio::test]
async fn test_unknown_lecture_404() {
    let origin = MockServer::start().await;
    let relay = start_relay(&origin.uri()).await;

    let response = reqwest::get(format!("http://{}/stream/nope", relay))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_manifest_rewrites_playlist_references() {
    let origin = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/hls/index.m3u8"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/vnd.apple.mpegurl"),
        )
        .mount(&origin)
        .await;

    Mock::given(method("GET"))
        .and(path("/hls/index.m3u8"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("#EXTM3U\n#EXTINF:10.0,\nseg1.ts"),
        )
        .mount(&origin)
        .await;

    let relay = start_relay(&origin.uri()).await;

    let response = reqwest::get(format!("http://{}/stream/lec-hls/manifest", relay))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "application/vnd.apple.mpegurl"
    );
    let body = response.text().await.unwrap();
    assert!(
        body.contains("/stream?url=") && body.contains("seg1.ts"),
        "segment not proxied: {}",
        body
    );
}

#[tokio::test]
async fn test_cors_preflight() {
    let origin = MockServer::start().await;
    let relay = start_relay(&origin.uri()).await;
    let client = reqwest::Client::new();

    let response = client
        .request(
            reqwest::Method::OPTIONS,
            format!("http://{}/stream/lec-preview", relay),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 204);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_health_and_stats() {
    let origin = MockServer::start().await;
    let relay = start_relay(&origin.uri()).await;

    let health: serde_json::Value = reqwest::get(format!("http://{}/health", relay))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let stats: serde_json::Value = reqwest::get(format!("http://{}/stats", relay))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(stats["total_requests"].is_u64());
}
