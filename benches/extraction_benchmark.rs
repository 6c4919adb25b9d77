use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;
use tokio::runtime::Runtime;
use url::Url;
use url_summary::{extract, FetcherConfig, PlayerPolicy, SummarizeOptions, Summarizer};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MOCK_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Strawberry Pasta | Alice's Site</title>
    <meta property="og:title" content="Strawberry Pasta">
    <meta property="og:description" content="A quick weeknight recipe with fresh strawberries.">
    <meta property="og:site_name" content="Alice's Site">
    <meta property="og:image" content="/images/pasta.jpg">
    <meta property="og:video:url" content="https://example.com/embedurl">
    <meta property="og:video:width" content="640">
    <meta property="og:video:height" content="360">
    <meta name="twitter:card" content="player">
    <meta name="twitter:player" content="https://example.com/embedurl">
    <link rel="icon" href="/favicon.png">
</head>
<body>
    <h1>Strawberry Pasta</h1>
</body>
</html>"#;

const OEMBED_IFRAME: &str = r#"<iframe src="https://example.com/embed" width="640" height="360" allow="autoplay; encrypted-media; gyroscope; picture-in-picture" allowfullscreen></iframe>"#;

fn bench_extraction(c: &mut Criterion) {
    let url = Url::parse("https://example.com/recipes/strawberry-pasta").unwrap();
    let policy = PlayerPolicy::default();

    let mut group = c.benchmark_group("extraction");
    group.bench_function("extract_metadata", |b| {
        b.iter(|| black_box(extract(black_box(MOCK_HTML), &url)))
    });

    let metadata = extract(MOCK_HTML, &url);
    group.bench_function("stage_summaries", |b| {
        b.iter(|| {
            let mut summary = metadata.open_graph_summary(&policy);
            summary.fill_missing(metadata.twitter_summary(&policy));
            summary.fill_missing(metadata.generic_summary());
            black_box(summary)
        })
    });

    group.bench_function("oembed_player", |b| {
        b.iter(|| black_box(policy.synthesize_from_oembed(black_box(OEMBED_IFRAME), None, None)))
    });
    group.finish();
}

fn bench_local_summarize(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let server = rt.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/recipe"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(MOCK_HTML, "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;
        server
    });

    let summarizer = Summarizer::new(
        SummarizeOptions::default()
            .with_config(FetcherConfig::default().with_allow_private_ip(true)),
    )
    .unwrap();
    let target = format!("{}/recipe", server.uri());

    let mut group = c.benchmark_group("summarize");
    group
        .sample_size(50)
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3));

    group.bench_function("local_page", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(summarizer.summarize(&target).await.unwrap()) });
    });
    group.finish();
}

criterion_group!(benches, bench_extraction, bench_local_summarize);
criterion_main!(benches);
