//! Resolution pipeline integration tests
//!
//! Drives the pipeline and the resolver service against a scripted browser.

mod common;

use common::{FakeEngine, FakeLauncher, FakeWeb, MockData, PageScript, TestConfig};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use stream_proxy::{
    config::SessionPolicy,
    proxy::token,
    resolver::{AutomationLauncher, ResolutionPipeline, StreamResolver},
    session::SessionStore,
};

const SOURCE: &str = "https://embed.example/movie/550";

fn store() -> Arc<SessionStore> {
    Arc::new(SessionStore::new(Duration::from_secs(1800)))
}

#[tokio::test(start_paused = true)]
async fn test_hinted_manifest_yields_clean_url_and_referer() {
    let web = FakeWeb::new().page(SOURCE, PageScript::emitting(MockData::HINTED_MANIFEST, ""));
    let engine = FakeEngine::new(Arc::new(web));
    let pipeline = ResolutionPipeline::new(TestConfig::minimal().resolver);

    let outcome = pipeline.run(&engine, "550").await;

    assert_eq!(outcome.streams.len(), 1);
    assert_eq!(outcome.streams[0].url, "https://cdn.example/path/index.m3u8");
    assert_eq!(outcome.streams[0].referer, "https://up.example/");
}

#[tokio::test(start_paused = true)]
async fn test_variants_prefetched_in_live_page() {
    let master = "https://cdn.example/path/master.m3u8";
    let web = FakeWeb::new()
        .page(SOURCE, PageScript::emitting(master, MockData::master_manifest()))
        .fetchable("https://cdn.example/path/360/index.m3u8", MockData::media_manifest().as_bytes())
        .fetchable("https://cdn.example/path/720/index.m3u8", MockData::media_manifest().as_bytes())
        .cookie("cf_clearance", "secret", ".cdn.example");
    let engine = FakeEngine::new(Arc::new(web));
    let pipeline = ResolutionPipeline::new(TestConfig::minimal().resolver);

    let outcome = pipeline.run(&engine, "550").await;

    let stream = &outcome.streams[0];
    assert_eq!(stream.body.as_deref(), Some(MockData::master_manifest()));
    assert_eq!(stream.variants.len(), 2);
    assert!(stream.variants.contains_key("https://cdn.example/path/720/index.m3u8"));
    assert_eq!(outcome.cookies.len(), 1);
    // page retained for later in-browser fetches
    assert!(outcome.page.is_some());
    assert_eq!(engine.open_pages(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_blocked_resource_types_installed() {
    let web = FakeWeb::new().page(SOURCE, PageScript::emitting(MockData::HINTED_MANIFEST, ""));
    let engine = FakeEngine::new(Arc::new(web));
    let pipeline = ResolutionPipeline::new(TestConfig::minimal().resolver);

    pipeline.run(&engine, "550").await;

    let pages = engine.pages.lock().unwrap();
    assert_eq!(pages[0].blocked.lock().unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_iframes_probed_after_empty_top_level() {
    let web = FakeWeb::new()
        .page(
            SOURCE,
            PageScript::with_iframes(&[
                "about:blank",
                "https://frame.example/e/1",
                "https://frame.example/e/2",
                "https://frame.example/e/3",
            ]),
        )
        .page("https://frame.example/e/2", PageScript::emitting(MockData::HINTED_MANIFEST, ""))
        .page("https://frame.example/e/3", PageScript::emitting("https://never.example/x.m3u8", ""));
    let engine = FakeEngine::new(Arc::new(web));
    let pipeline = ResolutionPipeline::new(TestConfig::minimal().resolver);

    let outcome = pipeline.run(&engine, "550").await;

    assert_eq!(outcome.streams.len(), 1);
    assert_eq!(
        engine.navigations(),
        vec![SOURCE, "https://frame.example/e/1", "https://frame.example/e/2"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_only_first_two_iframes_probed() {
    let web = FakeWeb::new()
        .page(
            SOURCE,
            PageScript::with_iframes(&[
                "https://frame.example/e/1",
                "https://frame.example/e/2",
                "https://frame.example/e/3",
            ]),
        )
        .page("https://frame.example/e/3", PageScript::emitting(MockData::HINTED_MANIFEST, ""));
    let engine = FakeEngine::new(Arc::new(web));
    let pipeline = ResolutionPipeline::new(TestConfig::minimal().resolver);

    let outcome = pipeline.run(&engine, "550").await;

    assert!(outcome.streams.is_empty());
    assert_eq!(engine.navigations().len(), 3);
    assert_eq!(engine.open_pages(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failing_source_falls_through_in_order() {
    let settings = TestConfig::with_sources(&[
        "https://broken.example/{id}",
        "https://slow.example/{id}",
        "https://good.example/{id}",
        "https://unused.example/{id}",
    ]);
    let web = FakeWeb::new()
        .page("https://broken.example/550", PageScript::failing())
        .page("https://slow.example/550", PageScript::hanging())
        .page("https://good.example/550", PageScript::emitting(MockData::HINTED_MANIFEST, ""));
    let engine = FakeEngine::new(Arc::new(web));
    let pipeline = ResolutionPipeline::new(settings.resolver);

    let outcome = pipeline.run(&engine, "550").await;

    assert_eq!(outcome.streams.len(), 1);
    assert_eq!(
        engine.navigations(),
        vec![
            "https://broken.example/550",
            "https://slow.example/550",
            "https://good.example/550"
        ]
    );
    // failed and timed-out pages were closed
    assert_eq!(engine.open_pages(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manifest_seen_before_navigation_timeout_is_kept() {
    let settings = TestConfig::with_sources(&[
        "https://slow.example/{id}",
        "https://unused.example/{id}",
    ]);
    let web = FakeWeb::new()
        .page(
            "https://slow.example/550",
            PageScript::emitting("https://cdn.example/p/index.m3u8", "#EXTM3U").then_hang(),
        )
        .page("https://unused.example/550", PageScript::emitting(MockData::HINTED_MANIFEST, ""));
    let engine = FakeEngine::new(Arc::new(web));
    let pipeline = ResolutionPipeline::new(settings.resolver);

    let outcome = pipeline.run(&engine, "550").await;

    assert_eq!(outcome.streams.len(), 1);
    assert_eq!(outcome.streams[0].url, "https://cdn.example/p/index.m3u8");
    assert_eq!(outcome.streams[0].body.as_deref(), Some("#EXTM3U"));
    assert_eq!(engine.navigations(), vec!["https://slow.example/550"]);
    assert!(outcome.page.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_manifest_seen_before_navigation_error_is_kept() {
    let web = FakeWeb::new().page(
        SOURCE,
        PageScript::emitting(MockData::HINTED_MANIFEST, "").then_fail(),
    );
    let engine = FakeEngine::new(Arc::new(web));
    let pipeline = ResolutionPipeline::new(TestConfig::minimal().resolver);

    let outcome = pipeline.run(&engine, "550").await;

    assert_eq!(outcome.streams.len(), 1);
    assert_eq!(outcome.streams[0].referer, "https://up.example/");
}

#[tokio::test(start_paused = true)]
async fn test_iframe_manifest_seen_before_timeout_is_kept() {
    let web = FakeWeb::new()
        .page(SOURCE, PageScript::with_iframes(&["https://frame.example/e/1"]))
        .page(
            "https://frame.example/e/1",
            PageScript::emitting("https://cdn.example/f/index.m3u8", "").then_hang(),
        );
    let engine = FakeEngine::new(Arc::new(web));
    let pipeline = ResolutionPipeline::new(TestConfig::minimal().resolver);

    let outcome = pipeline.run(&engine, "550").await;

    assert_eq!(outcome.streams.len(), 1);
    assert_eq!(outcome.streams[0].url, "https://cdn.example/f/index.m3u8");
}

#[tokio::test(start_paused = true)]
async fn test_service_opens_session_per_stream() {
    let web = FakeWeb::new()
        .page(
            SOURCE,
            PageScript {
                responses: vec![
                    (MockData::HINTED_MANIFEST.to_string(), String::new()),
                    ("https://cdn.example/alt/index.m3u8".to_string(), String::new()),
                ],
                ..Default::default()
            },
        )
        .cookie("sid", "abc", "cdn.example")
        .cookie("other", "zzz", "elsewhere.example");
    let launcher = FakeLauncher::new(web);
    let store = store();
    let resolver = StreamResolver::new(
        &TestConfig::minimal(),
        Arc::clone(&store),
        Some(launcher.clone() as Arc<dyn AutomationLauncher>),
    );

    let urls = resolver
        .resolve_to_proxy_urls("550", "https://proxy.example")
        .await;

    assert_eq!(urls.len(), 2);
    assert_eq!(store.len().await, 2);

    let tok = urls[0]
        .strip_prefix("https://proxy.example/hls/")
        .and_then(|rest| rest.strip_suffix(".m3u8"))
        .unwrap();
    let (session_id, url) = token::decode(tok).unwrap();
    assert_eq!(url, "https://cdn.example/path/index.m3u8");

    let session = store.get(&session_id).await.unwrap();
    assert_eq!(session.referer(), "https://up.example/");
    assert_eq!(session.cookie_header(), Some("sid=abc"));
    assert!(session.fallback().is_some());
    assert!(!launcher.last_engine().is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_primary_policy_keeps_first_stream() {
    let web = FakeWeb::new().page(
        SOURCE,
        PageScript {
            responses: vec![
                ("https://cdn.example/a/index.m3u8".to_string(), String::new()),
                ("https://cdn.example/b/index.m3u8".to_string(), String::new()),
            ],
            ..Default::default()
        },
    );
    let mut settings = TestConfig::minimal();
    settings.resolver.session_policy = SessionPolicy::Primary;
    let store = store();
    let resolver = StreamResolver::new(
        &settings,
        Arc::clone(&store),
        Some(FakeLauncher::new(web) as Arc<dyn AutomationLauncher>),
    );

    let urls = resolver.resolve_to_proxy_urls("550", "http://p").await;

    assert_eq!(urls.len(), 1);
    assert_eq!(store.len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_resolution_is_empty_and_closes_engine() {
    let launcher = FakeLauncher::new(FakeWeb::new());
    let store = store();
    let resolver = StreamResolver::new(
        &TestConfig::minimal(),
        Arc::clone(&store),
        Some(launcher.clone() as Arc<dyn AutomationLauncher>),
    );

    let urls = resolver.resolve_to_proxy_urls("550", "http://p").await;

    assert!(urls.is_empty());
    assert!(store.is_empty().await);
    assert!(launcher.last_engine().is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_engine_closed_when_context_not_kept() {
    let web = FakeWeb::new().page(SOURCE, PageScript::emitting(MockData::HINTED_MANIFEST, ""));
    let launcher = FakeLauncher::new(web);
    let mut settings = TestConfig::minimal();
    settings.resolver.keep_fallback_context = false;
    let store = store();
    let resolver = StreamResolver::new(
        &settings,
        Arc::clone(&store),
        Some(launcher.clone() as Arc<dyn AutomationLauncher>),
    );

    let urls = resolver.resolve_to_proxy_urls("550", "http://p").await;

    assert_eq!(urls.len(), 1);
    let engine = launcher.last_engine();
    assert!(engine.is_closed());
    assert_eq!(engine.open_pages(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_released_after_idle() {
    let web = FakeWeb::new().page(SOURCE, PageScript::emitting(MockData::HINTED_MANIFEST, ""));
    let launcher = FakeLauncher::new(web);
    let settings = TestConfig::minimal();
    let idle = Duration::from_secs(settings.session.fallback_idle_secs);
    let resolver = StreamResolver::new(
        &settings,
        store(),
        Some(launcher.clone() as Arc<dyn AutomationLauncher>),
    );

    resolver.resolve_to_proxy_urls("550", "http://p").await;
    let engine = launcher.last_engine();
    assert!(!engine.is_closed());

    tokio::time::sleep(idle + Duration::from_secs(1)).await;
    assert!(engine.is_closed());
    assert_eq!(engine.open_pages(), 0);
}

#[tokio::test]
async fn test_no_launcher_resolves_nothing() {
    let resolver = StreamResolver::new(&TestConfig::minimal(), store(), None);
    assert!(!resolver.has_launcher());
    assert!(resolver.resolve_to_proxy_urls("550", "http://p").await.is_empty());
}
