//! Fetch-then-parse tests over a mock HTTP server

use crate::create_test_config;
use wayfarer::crawler::{FetchOutcome, FetchRequest, Fetcher, ParseOutcome, Parser};
use wayfarer::ParseError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fetches `route` and parses the payload the way a crawler loop would
async fn fetch_and_parse(
    mock_server: &MockServer,
    route: &str,
) -> Result<ParseOutcome, ParseError> {
    let config = create_test_config(0, 64 * 1024);
    let fetcher = Fetcher::from_config(&config).expect("Failed to build fetcher");
    let parser = Parser::new(config.parser.clone());

    let outcome = fetcher
        .fetch(&FetchRequest::new(format!("{}{}", mock_server.uri(), route)))
        .await;

    match outcome {
        FetchOutcome::Success {
            fetched_url,
            content_type,
            charset_hint,
            payload,
            ..
        } => parser.parse(
            &payload,
            content_type.as_deref(),
            charset_hint.as_deref(),
            &fetched_url,
        ),
        other => panic!("Expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_html_page_links_are_canonical() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/docs/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><title>Docs</title></head><body>
                <p>Read the <a href="guide.html#intro">guide</a>.</p>
                <a href="../about?b=2&a=1">About us</a>
                <a href="mailto:team@example.com">Mail</a>
                <a href="javascript:void(0)">Nothing</a>
                <a href="https://other.example/">Elsewhere</a>
            </body></html>"#,
            "text/html",
        ))
        .mount(&mock_server)
        .await;

    let outcome = fetch_and_parse(&mock_server, "/docs/index.html")
        .await
        .unwrap();

    match &outcome {
        ParseOutcome::Html {
            title, body_text, ..
        } => {
            assert_eq!(title.as_deref(), Some("Docs"));
            assert!(body_text.contains("Read the guide"));
        }
        other => panic!("Expected HTML, got {:?}", other),
    }

    let links: Vec<(String, String)> = outcome
        .outgoing_links()
        .iter()
        .map(|link| (link.target_url.clone(), link.anchor_text.clone()))
        .collect();

    assert_eq!(
        links,
        vec![
            (format!("{}/docs/guide.html", base_url), "guide".to_string()),
            (format!("{}/about?a=1&b=2", base_url), "About us".to_string()),
            ("https://other.example/".to_string(), "Elsewhere".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_latin1_page_decoded_from_header_charset() {
    let mock_server = MockServer::start().await;

    let mut body = b"<html><body><p>caf".to_vec();
    body.push(0xE9);
    body.extend_from_slice(b"</p></body></html>");

    Mock::given(method("GET"))
        .and(path("/cafe"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=ISO-8859-1"))
        .mount(&mock_server)
        .await;

    let outcome = fetch_and_parse(&mock_server, "/cafe").await.unwrap();
    match outcome {
        ParseOutcome::Html { body_text, .. } => assert_eq!(body_text, "café"),
        other => panic!("Expected HTML, got {:?}", other),
    }
}

#[tokio::test]
async fn test_plain_text_page() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("just some notes", "text/plain"))
        .mount(&mock_server)
        .await;

    let outcome = fetch_and_parse(&mock_server, "/notes.txt").await.unwrap();
    assert_eq!(
        outcome,
        ParseOutcome::PlainText {
            text: "just some notes".to_string()
        }
    );
}

#[tokio::test]
async fn test_image_is_excluded_by_default() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .mount(&mock_server)
        .await;

    let result = fetch_and_parse(&mock_server, "/logo.png").await;
    assert!(matches!(result, Err(ParseError::BinaryExcluded { .. })));
}
