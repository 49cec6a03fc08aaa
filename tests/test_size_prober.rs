//! Integration tests for the upstream size prober

use std::time::Duration;
use stream_relay::SizeProber;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn prober() -> SizeProber {
    SizeProber::new(reqwest::Client::new(), Duration::from_secs(2))
}

#[tokio::test]
async fn test_head_probe_reads_content_length() {
    let mock_server = MockServer::start().await;

    // The body sets the Content-Length the HEAD response advertises
    Mock::given(method("HEAD"))
        .and(path("/video.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
        .mount(&mock_server)
        .await;

    let total = prober()
        .probe(&format!("{}/video.mp4", mock_server.uri()))
        .await;
    assert_eq!(total, Some(4096));
}

#[tokio::test]
async fn test_falls_back_to_range_probe() {
    let mock_server = MockServer::start().await;

    // Origin refuses HEAD outright
    Mock::given(method("HEAD"))
        .and(path("/video.mp4"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/video.mp4"))
        .and(header("range", "bytes=0-0"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 0-0/52428800")
                .set_body_bytes(vec![0u8; 1]),
        )
        .mount(&mock_server)
        .await;

    let total = prober()
        .probe(&format!("{}/video.mp4", mock_server.uri()))
        .await;
    assert_eq!(total, Some(52428800));
}

#[tokio::test]
async fn test_both_probes_failing_yields_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    // Range probe answers 200 without a Content-Range: nothing to parse
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
        .mount(&mock_server)
        .await;

    let total = prober()
        .probe(&format!("{}/video.mp4", mock_server.uri()))
        .await;
    assert_eq!(total, None);
}

#[tokio::test]
async fn test_unreachable_origin_yields_none() {
    let prober = SizeProber::new(reqwest::Client::new(), Duration::from_millis(300));
    let total = prober.probe("http://192.0.2.1:9/video.mp4").await;
    assert_eq!(total, None);
}
