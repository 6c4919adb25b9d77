use url::Url;
use url_summary::{
    summarize, Fetcher, FetcherConfig, NetworkGuard, PreviewError, SummarizeOptions,
    ALLOW_PRIVATE_IP_ENV,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn local_page() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<title>Internal dashboard</title>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_loopback_target_is_blocked_before_connecting() {
    let server = local_page().await;

    let error = summarize(&server.uri(), SummarizeOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(error, PreviewError::PrivateAddressBlocked { .. }));
    assert!(error.is_permanent());
    let received = server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty(), "guard let {} request(s) through", received.len());
}

#[tokio::test]
async fn test_private_targets_are_blocked() {
    let targets = [
        "http://localhost:9/",
        "http://127.0.0.1/",
        "http://10.0.0.1/",
        "http://172.16.5.4/admin",
        "http://192.168.1.1/",
        "http://169.254.169.254/latest/meta-data/",
        "http://100.64.0.1/",
        "http://0.0.0.0/",
        "http://[::1]/",
        "http://[fd00::1]/",
        "http://[fe80::1]/",
        "http://[::ffff:127.0.0.1]/",
    ];

    for target in targets {
        let result = summarize(target, SummarizeOptions::default()).await;
        assert!(
            matches!(result, Err(PreviewError::PrivateAddressBlocked { .. })),
            "{target} was not blocked: {result:?}"
        );
    }
}

#[tokio::test]
async fn test_agent_override_allows_private_target() {
    let server = local_page().await;

    let preview = summarize(
        &server.uri(),
        SummarizeOptions::default().with_agent(reqwest::Client::new()),
    )
    .await
    .unwrap();

    assert_eq!(preview.summary.title.as_deref(), Some("Internal dashboard"));
}

#[tokio::test]
async fn test_allow_private_ip_flag() {
    let server = local_page().await;

    let options = SummarizeOptions::default()
        .with_config(FetcherConfig::default().with_allow_private_ip(true));
    let preview = summarize(&server.uri(), options).await.unwrap();
    assert_eq!(preview.summary.title.as_deref(), Some("Internal dashboard"));
}

#[test]
fn test_allow_private_ip_from_env() {
    std::env::set_var(ALLOW_PRIVATE_IP_ENV, "true");
    assert!(FetcherConfig::from_env().allow_private_ip);
    std::env::set_var(ALLOW_PRIVATE_IP_ENV, "0");
    assert!(!FetcherConfig::from_env().allow_private_ip);
    std::env::remove_var(ALLOW_PRIVATE_IP_ENV);
    assert!(!FetcherConfig::from_env().allow_private_ip);
}

#[tokio::test]
async fn test_guarded_fetch_and_probe() {
    let server = local_page().await;
    let fetcher = Fetcher::new(FetcherConfig::default()).unwrap();
    let url = Url::parse(&server.uri()).unwrap();

    let error = fetcher.fetch_html(&url, None).await.unwrap_err();
    assert!(matches!(error, PreviewError::PrivateAddressBlocked { .. }));
    assert!(!fetcher.probe(&url.join("/favicon.ico").unwrap()).await);
    assert!(server
        .received_requests()
        .await
        .unwrap_or_default()
        .is_empty());
}

#[tokio::test]
async fn test_unsupported_schemes_are_rejected() {
    for target in ["file:///etc/passwd", "ftp://example.com/", "gopher://example.com/"] {
        let result = summarize(target, SummarizeOptions::default()).await;
        assert!(
            matches!(result, Err(PreviewError::InvalidUrlScheme(_))),
            "{target}: {result:?}"
        );
    }
}

#[test]
fn test_guard_decisions() {
    let guard = NetworkGuard::enabled();
    assert!(!guard.is_allowed(&"127.0.0.1".parse().unwrap()));
    assert!(!guard.is_allowed(&"fc00::1".parse().unwrap()));
    assert!(guard.is_allowed(&"93.184.216.34".parse().unwrap()));
    assert!(NetworkGuard::disabled().is_allowed(&"127.0.0.1".parse().unwrap()));
}
