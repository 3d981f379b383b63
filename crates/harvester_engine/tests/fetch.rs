use std::time::Duration;

use harvester_engine::{
    FailureKind, FetchRequest, FetchSettings, Fetcher, NavigateOptions, PlainHttpRenderer,
    Renderer, ReqwestFetcher,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn get(url: String) -> FetchRequest {
    FetchRequest {
        url,
        headers: Vec::new(),
    }
}

#[tokio::test]
async fn fetcher_returns_decoded_html() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let url = format!("{}/doc", server.uri());

    let result = fetcher.fetch(&get(url.clone())).await.expect("fetch ok");
    assert_eq!(result.requested_url, url);
    assert_eq!(result.final_url, url);
    assert_eq!(result.status, 200);
    assert!(result.content_type.unwrap().starts_with("text/html"));
    assert_eq!(result.body, "<html>ok</html>");
}

#[tokio::test]
async fn non_success_status_is_a_result_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let result = fetcher
        .fetch(&get(format!("{}/missing", server.uri())))
        .await
        .expect("status passthrough");
    assert_eq!(result.status, 404);
    assert!(!result.is_success());
}

#[tokio::test]
async fn session_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/offer/1"))
        .and(header("cookie", "sid=abc"))
        .and(header("user-agent", "TestAgent/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let request = FetchRequest {
        url: format!("{}/offer/1", server.uri()),
        headers: vec![
            ("Cookie".to_string(), "sid=abc".to_string()),
            ("User-Agent".to_string(), "TestAgent/1.0".to_string()),
        ],
    };
    let result = fetcher.fetch(&request).await.expect("fetch ok");
    assert_eq!(result.status, 200);
}

#[tokio::test]
async fn fetcher_times_out_on_slow_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(250))
                .set_body_string("slow"),
        )
        .mount(&server)
        .await;

    let settings = FetchSettings {
        request_timeout: Duration::from_millis(50),
        ..FetchSettings::default()
    };
    let fetcher = ReqwestFetcher::new(settings);

    let err = fetcher
        .fetch(&get(format!("{}/slow", server.uri())))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
    assert!(err.is_transient());
}

#[tokio::test]
async fn fetcher_rejects_too_large_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/large"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "text/html")
                .insert_header("Content-Length", "11")
                .set_body_string("01234567890"),
        )
        .mount(&server)
        .await;

    let settings = FetchSettings {
        max_bytes: 10,
        ..FetchSettings::default()
    };
    let fetcher = ReqwestFetcher::new(settings);

    let err = fetcher
        .fetch(&get(format!("{}/large", server.uri())))
        .await
        .unwrap_err();
    assert_eq!(
        err.kind,
        FailureKind::TooLarge {
            max_bytes: 10,
            actual: Some(11)
        }
    );
    assert!(!err.is_transient());
}

#[tokio::test]
async fn invalid_url_is_permanent() {
    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let err = fetcher.fetch(&get("not a url".to_string())).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}

#[tokio::test]
async fn plain_renderer_collects_cookies_across_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/landing")
                .insert_header("Set-Cookie", "first=1; Path=/"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/landing"))
        .and(header("cookie", "first=1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "second=2; Path=/; HttpOnly")
                .set_body_raw("<html><body>welcome</body></html>", "text/html"),
        )
        .mount(&server)
        .await;

    let renderer =
        PlainHttpRenderer::new(FetchSettings::default()).with_user_agent("TestAgent/1.0");
    let options = NavigateOptions {
        settle: Duration::from_millis(1),
        scroll_steps: 0,
    };
    let page = renderer
        .navigate(&format!("{}/start", server.uri()), &options)
        .await
        .expect("render ok");

    let names: Vec<&str> = page.cookies.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);
    assert_eq!(page.user_agent, "TestAgent/1.0");
    assert!(page.html.contains("welcome"));
}
