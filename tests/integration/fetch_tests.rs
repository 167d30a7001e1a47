//! Fetcher tests against a mock HTTP server

use crate::create_test_config;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wayfarer::crawler::{FetchOutcome, FetchRequest, Fetcher, TransportErrorKind};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Answers 200 and records when each request reached the server
#[derive(Clone, Default)]
struct ArrivalRecorder {
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl ArrivalRecorder {
    fn sorted_arrivals(&self) -> Vec<Instant> {
        let mut arrivals = self.arrivals.lock().unwrap().clone();
        arrivals.sort();
        arrivals
    }
}

impl Respond for ArrivalRecorder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        ResponseTemplate::new(200).set_body_raw("ok", "text/plain")
    }
}

fn fetcher(politeness_delay_ms: u64, max_download_size: u64) -> Fetcher {
    Fetcher::from_config(&create_test_config(politeness_delay_ms, max_download_size))
        .expect("Failed to build fetcher")
}

#[tokio::test]
async fn test_success_returns_payload_and_headers() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<html>ok</html>", "text/html; charset=ISO-8859-1")
                .insert_header("x-served-by", "mock"),
        )
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(0, 1024);
    let url = format!("{}/page", mock_server.uri());
    let outcome = fetcher.fetch(&FetchRequest::new(url.clone())).await;

    match outcome {
        FetchOutcome::Success {
            fetched_url,
            final_url,
            content_type,
            charset_hint,
            payload,
            response_headers,
        } => {
            assert_eq!(fetched_url, url);
            assert_eq!(final_url, url);
            assert!(content_type.unwrap().starts_with("text/html"));
            assert_eq!(charset_hint.unwrap().to_ascii_lowercase(), "iso-8859-1");
            assert_eq!(payload, b"<html>ok</html>");
            assert_eq!(response_headers.get("x-served-by").unwrap(), "mock");
        }
        other => panic!("Expected success, got {:?}", other),
    }

    assert_eq!(fetcher.active_connections(), 0);
}

#[tokio::test]
async fn test_request_carries_gzip_and_user_agent() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("accept-encoding", "gzip"))
        .and(header("user-agent", "TestBot/1.0.0"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("hello", "text/plain"))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(0, 1024);
    let outcome = fetcher
        .fetch(&FetchRequest::new(format!("{}/", mock_server.uri())))
        .await;

    // Unmatched requests get a 404 from the mock server
    assert!(outcome.is_success(), "got {:?}", outcome);
}

#[tokio::test]
async fn test_not_found() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(0, 1024);
    let outcome = fetcher
        .fetch(&FetchRequest::new(format!("{}/missing", mock_server.uri())))
        .await;

    assert!(matches!(outcome, FetchOutcome::NotFound));
    assert_eq!(outcome.status_code(), Some(404));
}

#[tokio::test]
async fn test_redirect_is_reported_not_followed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new#top"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("new", "text/plain"))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(0, 1024);
    let outcome = fetcher
        .fetch(&FetchRequest::new(format!("{}/old", mock_server.uri())))
        .await;

    match outcome {
        FetchOutcome::Redirect {
            status_code,
            target_url,
        } => {
            assert_eq!(status_code, 301);
            assert_eq!(target_url, Some(format!("{}/new", mock_server.uri())));
        }
        other => panic!("Expected redirect, got {:?}", other),
    }

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn test_redirect_statuses_and_missing_location() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/found"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "http://other.example/landing"),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/temporary"))
        .respond_with(ResponseTemplate::new(307))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(0, 1024);

    let found = fetcher
        .fetch(&FetchRequest::new(format!("{}/found", mock_server.uri())))
        .await;
    assert!(matches!(
        found,
        FetchOutcome::Redirect { status_code: 302, target_url: Some(ref target) }
            if target == "http://other.example/landing"
    ));

    let temporary = fetcher
        .fetch(&FetchRequest::new(format!("{}/temporary", mock_server.uri())))
        .await;
    assert!(matches!(
        temporary,
        FetchOutcome::Redirect {
            status_code: 307,
            target_url: None
        }
    ));
}

#[tokio::test]
async fn test_other_statuses_are_http_errors() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/forbidden"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(0, 1024);

    for (route, expected) in [("/broken", 500), ("/forbidden", 403), ("/empty", 204)] {
        let outcome = fetcher
            .fetch(&FetchRequest::new(format!("{}{}", mock_server.uri(), route)))
            .await;
        assert!(
            matches!(outcome, FetchOutcome::HttpError { status_code } if status_code == expected),
            "{} gave {:?}",
            route,
            outcome
        );
    }
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Grab a free port, then close it so nothing is listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let fetcher = fetcher(0, 1024);
    let outcome = fetcher
        .fetch(&FetchRequest::with_parent(
            format!("http://127.0.0.1:{}/", port),
            "42",
        ))
        .await;

    assert!(
        matches!(
            outcome,
            FetchOutcome::TransportError {
                kind: TransportErrorKind::Connect,
                ..
            }
        ),
        "got {:?}",
        outcome
    );
    assert_eq!(fetcher.active_connections(), 0);
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(500))
                .set_body_raw("slow", "text/plain"),
        )
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(0, 1024);
    config.fetcher.socket_timeout = 50;
    let fetcher = Fetcher::from_config(&config).unwrap();

    let outcome = fetcher
        .fetch(&FetchRequest::new(format!("{}/slow", mock_server.uri())))
        .await;

    assert!(
        matches!(
            outcome,
            FetchOutcome::TransportError {
                kind: TransportErrorKind::Timeout,
                ..
            }
        ),
        "got {:?}",
        outcome
    );
    assert_eq!(fetcher.active_connections(), 0);
}

#[tokio::test]
async fn test_declared_size_over_limit_is_too_large() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/large"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![b'x'; 2048], "text/plain"))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(0, 1024);
    let outcome = fetcher
        .fetch(&FetchRequest::new(format!("{}/large", mock_server.uri())))
        .await;

    assert!(matches!(outcome, FetchOutcome::TooLarge { size: 2048 }), "got {:?}", outcome);
    assert_eq!(fetcher.active_connections(), 0);
}

#[tokio::test]
async fn test_payload_at_limit_is_accepted() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/exact"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![b'x'; 1024], "text/plain"))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(0, 1024);
    let outcome = fetcher
        .fetch(&FetchRequest::new(format!("{}/exact", mock_server.uri())))
        .await;

    match outcome {
        FetchOutcome::Success { payload, .. } => assert_eq!(payload.len(), 1024),
        other => panic!("Expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_compressed_body_over_limit_is_too_large() {
    // Compresses far below the limit but inflates well above it
    let compressed = gzip(&vec![b'a'; 64 * 1024]);
    assert!(compressed.len() < 1024);

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bomb"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(compressed, "text/html")
                .insert_header("content-encoding", "gzip"),
        )
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(0, 1024);
    let outcome = fetcher
        .fetch(&FetchRequest::new(format!("{}/bomb", mock_server.uri())))
        .await;

    match outcome {
        FetchOutcome::TooLarge { size } => assert!(size > 1024),
        other => panic!("Expected too large, got {:?}", other),
    }
    assert_eq!(fetcher.active_connections(), 0);
}

#[tokio::test]
async fn test_compressed_body_is_decoded() {
    let html = b"<html><body><a href=\"/x\">x</a></body></html>";

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gz"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(gzip(html), "text/html")
                .insert_header("content-encoding", "gzip"),
        )
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(0, 1024);
    let outcome = fetcher
        .fetch(&FetchRequest::new(format!("{}/gz", mock_server.uri())))
        .await;

    match outcome {
        FetchOutcome::Success { payload, .. } => assert_eq!(payload, html),
        other => panic!("Expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_politeness_delay_spaces_concurrent_fetches() {
    let mock_server = MockServer::start().await;
    let recorder = ArrivalRecorder::default();
    Mock::given(method("GET"))
        .respond_with(recorder.clone())
        .mount(&mock_server)
        .await;

    let fetcher = Arc::new(fetcher(100, 1024));

    let mut handles = Vec::new();
    for i in 0..4 {
        let fetcher = Arc::clone(&fetcher);
        let url = format!("{}/page{}", mock_server.uri(), i);
        handles.push(tokio::spawn(async move {
            fetcher.fetch(&FetchRequest::new(url)).await.is_success()
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap());
    }

    let arrivals = recorder.sorted_arrivals();
    assert_eq!(arrivals.len(), 4);

    // Every consecutive pair of starts is a full delay apart; the slack only
    // absorbs connection setup on the first request
    for pair in arrivals.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap >= Duration::from_millis(90), "gap was {:?}", gap);
    }
}

#[tokio::test]
async fn test_separate_fetchers_keep_separate_clocks() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("ok", "text/plain"))
        .mount(&mock_server)
        .await;

    let first = fetcher(2_000, 1024);
    let second = fetcher(2_000, 1024);
    let url = format!("{}/", mock_server.uri());

    let started = Instant::now();
    assert!(first.fetch(&FetchRequest::new(url.clone())).await.is_success());
    assert!(second.fetch(&FetchRequest::new(url)).await.is_success());

    assert!(started.elapsed() < Duration::from_millis(2_000));
}

#[tokio::test]
async fn test_shutdown_rejects_further_fetches() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("ok", "text/plain"))
        .mount(&mock_server)
        .await;

    let fetcher = fetcher(0, 1024);
    let url = format!("{}/", mock_server.uri());
    assert!(fetcher.fetch(&FetchRequest::new(url.clone())).await.is_success());

    fetcher.shutdown().await;
    assert!(fetcher.is_shut_down());

    let outcome = fetcher.fetch(&FetchRequest::new(url)).await;
    assert!(matches!(
        outcome,
        FetchOutcome::TransportError {
            kind: TransportErrorKind::Closed,
            ..
        }
    ));
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
}
