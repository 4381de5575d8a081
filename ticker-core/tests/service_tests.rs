use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use ticker_core::storage::keys;
use ticker_core::{
    CachedState, CategoryTable, ChannelObserver, Inbound, LocalStore, ObserverRegistry, Outbound,
    PollError, PollOutcome, ServiceConfig, SettingsError, SettingsUpdate, Settings, TickerService,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn headlines_body(titles: &[&str]) -> serde_json::Value {
    let articles: Vec<_> = titles
        .iter()
        .enumerate()
        .map(|(i, title)| json!({ "title": title, "url": format!("https://news.example/{i}") }))
        .collect();
    json!({ "status": "ok", "totalResults": titles.len(), "articles": articles })
}

fn numbered_titles(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("Headline {i}")).collect()
}

fn service_for(server: &MockServer, store: LocalStore) -> TickerService {
    service_with_config(
        ServiceConfig {
            endpoint: format!("{}/v2/top-headlines", server.uri()),
            ..Default::default()
        },
        store,
    )
}

fn service_with_config(config: ServiceConfig, store: LocalStore) -> TickerService {
    TickerService::new(
        Client::new(),
        config,
        Arc::new(CategoryTable::bundled()),
        store,
        ObserverRegistry::new(),
    )
}

async fn store_with_key(key: &str) -> LocalStore {
    let store = LocalStore::in_memory();
    let settings = Settings {
        api_key: key.into(),
        ..Default::default()
    };
    store.save_settings(&settings).await.unwrap();
    store
}

async fn mount_headlines(server: &MockServer, titles: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(headlines_body(titles)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn keeps_first_ten_articles_in_provider_order() {
    let server = MockServer::start().await;
    let titles = numbered_titles(15);
    let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
    mount_headlines(&server, &refs).await;

    let store = store_with_key("k").await;
    let service = service_for(&server, store.clone());

    let articles = match service.start().await {
        PollOutcome::Success(articles) => articles,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(articles.len(), 10);
    let got: Vec<&str> = articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(got, &refs[..10]);

    let cached = store.load_cached_state().await;
    assert_eq!(cached.articles.len(), 10);
    assert!(cached.error.is_none());
    assert!(cached.last_update.is_some());
    let headlines: String = store.get_as(keys::HEADLINES).await.unwrap();
    assert!(headlines.contains(" +++ "));

    service.shutdown().await;
}

#[tokio::test]
async fn missing_credential_skips_network_and_reports_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(headlines_body(&["x"])))
        .expect(0)
        .mount(&server)
        .await;

    let store = LocalStore::in_memory();
    store
        .save_cached_state(&CachedState::success(vec![ticker_core::Article {
            title: "old".into(),
            url: "https://old".into(),
            emoji: None,
        }]))
        .await
        .unwrap();

    let service = service_for(&server, store.clone());
    let (observer, mut rx) = ChannelObserver::pair("tab-1", 8);
    service.observers().register(Arc::new(observer)).await;

    let outcome = service.fetch_and_publish().await;
    assert!(matches!(outcome, PollOutcome::Failed(PollError::MissingCredential)));

    let cached = store.load_cached_state().await;
    assert!(cached.articles.is_empty());
    let message = cached.error.expect("error message stored");
    assert!(message.contains("API key"));
    assert_eq!(rx.recv().await, Some(Outbound::error(message)));
}

#[tokio::test]
async fn zero_results_is_informational() {
    let server = MockServer::start().await;
    mount_headlines(&server, &[]).await;

    let store = store_with_key("k").await;
    let service = service_for(&server, store.clone());
    let (observer, mut rx) = ChannelObserver::pair("tab-1", 8);
    service.observers().register(Arc::new(observer)).await;

    assert!(matches!(service.start().await, PollOutcome::Empty));
    match rx.recv().await {
        Some(Outbound::InfoMessage { .. }) => {}
        other => panic!("expected info message, got {other:?}"),
    }

    let cached = store.load_cached_state().await;
    assert!(cached.articles.is_empty());
    assert!(cached.error.is_none());
    assert!(cached.last_update.is_some());
    service.shutdown().await;
}

#[tokio::test]
async fn provider_error_clears_articles_and_keeps_timestamp() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({ "message": "Too many requests" })))
        .mount(&server)
        .await;

    let store = store_with_key("k").await;
    let mut previous = CachedState::success(Vec::new());
    previous.last_update = Some(1_000);
    store.save_cached_state(&previous).await.unwrap();

    let service = service_for(&server, store.clone());
    assert!(matches!(
        service.start().await,
        PollOutcome::Failed(PollError::Api { status: 429, .. })
    ));

    let cached = store.load_cached_state().await;
    assert_eq!(cached.error.as_deref(), Some("Too many requests"));
    assert_eq!(cached.last_update, Some(1_000));
    service.shutdown().await;
}

#[tokio::test]
async fn scroll_speed_update_keeps_credential_and_cadence_but_polls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/top-headlines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(headlines_body(&["A"])))
        .expect(2)
        .mount(&server)
        .await;

    let service = service_for(&server, LocalStore::in_memory());
    service
        .reconfigure(SettingsUpdate {
            api_key: Some("k".into()),
            refresh_interval: Some(30),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(service.timer_period().await, Some(Duration::from_secs(30 * 60)));

    service
        .reconfigure(SettingsUpdate {
            scroll_speed: Some(80),
            ..Default::default()
        })
        .await
        .unwrap();

    let settings = service.settings().await;
    assert_eq!(settings.api_key, "k");
    assert_eq!(settings.refresh_interval, 30);
    assert_eq!(settings.scroll_speed, 80);
    assert_eq!(service.timer_period().await, Some(Duration::from_secs(30 * 60)));
    assert_eq!(service.store().load_settings().await, Some(settings));

    service.shutdown().await;
}

#[tokio::test]
async fn invalid_updates_change_nothing() {
    let server = MockServer::start().await;
    mount_headlines(&server, &["A"]).await;

    let service = service_for(&server, store_with_key("k").await);
    service.start().await;

    let err = service
        .handle(None, Inbound::UpdateRefreshInterval { interval: 0 })
        .await
        .unwrap_err();
    assert_eq!(err, SettingsError::ZeroRefreshInterval);
    assert_eq!(service.settings().await.refresh_interval, 15);

    service
        .handle(None, Inbound::UpdateRefreshInterval { interval: 5 })
        .await
        .unwrap();
    assert_eq!(service.timer_period().await, Some(Duration::from_secs(5 * 60)));
    service.shutdown().await;
}

#[tokio::test]
async fn failed_delivery_does_not_block_other_observers() {
    let server = MockServer::start().await;
    mount_headlines(&server, &["Stocks slide", "Cup final tonight"]).await;

    let service = service_for(&server, store_with_key("k").await);
    let (first, mut rx1) = ChannelObserver::pair("tab-1", 8);
    let (second, rx2) = ChannelObserver::pair("tab-2", 8);
    let (third, mut rx3) = ChannelObserver::pair("tab-3", 8);
    for observer in [first, second, third] {
        service.observers().register(Arc::new(observer)).await;
    }
    drop(rx2);

    assert!(matches!(service.start().await, PollOutcome::Success(_)));

    for rx in [&mut rx1, &mut rx3] {
        match rx.recv().await {
            Some(Outbound::UpdateHeadlines { articles, .. }) => assert_eq!(articles.len(), 2),
            other => panic!("expected headlines, got {other:?}"),
        }
    }
    // The dropped tab is pruned; the others stay.
    assert_eq!(service.observers().len().await, 2);
    assert!(!service.observers().contains("tab-2").await);
    service.shutdown().await;
}

#[tokio::test]
async fn stalled_observer_does_not_hold_up_later_cycles() {
    let server = MockServer::start().await;
    mount_headlines(&server, &["Markets open"]).await;

    let service = service_for(&server, store_with_key("k").await);
    // Room for one message and nobody reading it.
    let (stalled, _stalled_rx) = ChannelObserver::pair("tab-1", 1);
    let (healthy, mut healthy_rx) = ChannelObserver::pair("tab-2", 8);
    service.observers().register(Arc::new(stalled)).await;
    service.observers().register(Arc::new(healthy)).await;

    assert!(matches!(service.start().await, PollOutcome::Success(_)));
    for _ in 0..2 {
        let outcome = tokio::time::timeout(Duration::from_secs(1), service.fetch_and_publish())
            .await
            .expect("cycle finished despite the stalled observer");
        assert!(matches!(outcome, PollOutcome::Success(_)));
    }

    for _ in 0..3 {
        assert!(matches!(
            healthy_rx.recv().await,
            Some(Outbound::UpdateHeadlines { .. })
        ));
    }
    // Slow, not gone: it keeps its registration.
    assert!(service.observers().contains("tab-1").await);
    service.shutdown().await;
}

#[tokio::test]
async fn closed_observer_stops_receiving() {
    let server = MockServer::start().await;
    mount_headlines(&server, &["A"]).await;

    let service = service_for(&server, store_with_key("k").await);
    let (first, mut rx1) = ChannelObserver::pair("tab-1", 8);
    let (second, mut rx2) = ChannelObserver::pair("tab-2", 8);
    service.observers().register(Arc::new(first)).await;
    service.observers().register(Arc::new(second)).await;

    service
        .handle(Some("tab-1"), Inbound::ContentScriptClosed)
        .await
        .unwrap();
    assert_eq!(service.observers().len().await, 1);

    assert!(matches!(service.fetch_and_publish().await, PollOutcome::Success(_)));
    assert!(matches!(rx2.recv().await, Some(Outbound::UpdateHeadlines { .. })));
    assert!(rx1.try_recv().is_err());
}

#[tokio::test]
async fn timer_keeps_polling_after_a_failed_cycle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_headlines(&server, &["Recovered"]).await;

    let service = service_with_config(
        ServiceConfig {
            endpoint: format!("{}/v2/top-headlines", server.uri()),
            refresh_period_override_ms: Some(100),
            ..Default::default()
        },
        store_with_key("k").await,
    );
    let (observer, mut rx) = ChannelObserver::pair("tab-1", 8);
    service.observers().register(Arc::new(observer)).await;

    assert!(matches!(
        service.start().await,
        PollOutcome::Failed(PollError::Api { status: 500, .. })
    ));
    assert_eq!(service.timer_period().await, Some(Duration::from_millis(100)));
    assert_eq!(rx.recv().await, Some(Outbound::error("HTTP status 500")));

    // No manual trigger: only the timer can produce this.
    let next = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timer tick after the failure");
    match next {
        Some(Outbound::UpdateHeadlines { articles, .. }) => assert_eq!(articles[0].title, "Recovered"),
        other => panic!("expected headlines from the timer, got {other:?}"),
    }
    assert!(service.store().load_cached_state().await.error.is_none());
    service.shutdown().await;
}

#[tokio::test]
async fn ready_observer_gets_replay_only_for_itself() {
    let server = MockServer::start().await;
    mount_headlines(&server, &["Only story"]).await;

    let service = service_for(&server, store_with_key("k").await);
    let (early, mut early_rx) = ChannelObserver::pair("tab-1", 8);
    service.observers().register(Arc::new(early)).await;
    service.start().await;
    assert!(matches!(
        early_rx.recv().await,
        Some(Outbound::UpdateHeadlines { .. })
    ));

    let (late, mut late_rx) = ChannelObserver::pair("tab-2", 8);
    service.observers().register(Arc::new(late)).await;
    service
        .handle(Some("tab-2"), Inbound::ContentScriptReady)
        .await
        .unwrap();

    match late_rx.recv().await {
        Some(Outbound::UpdateHeadlines { articles, .. }) => assert_eq!(articles[0].title, "Only story"),
        other => panic!("expected replay, got {other:?}"),
    }
    assert!(early_rx.try_recv().is_err());
    service.shutdown().await;
}

#[tokio::test]
async fn persisted_state_is_replayed_before_first_poll_completes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(headlines_body(&["Fresh"]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let store = store_with_key("k").await;
    store
        .save_cached_state(&CachedState::success(vec![ticker_core::Article {
            title: "Cached".into(),
            url: "https://cached".into(),
            emoji: None,
        }]))
        .await
        .unwrap();

    let service = service_for(&server, store);
    let starting = {
        let service = service.clone();
        tokio::spawn(async move { service.start().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (late, mut late_rx) = ChannelObserver::pair("tab-9", 8);
    service.observers().register(Arc::new(late)).await;
    service.on_observer_ready("tab-9").await;
    match late_rx.recv().await {
        Some(Outbound::UpdateHeadlines { articles, .. }) => assert_eq!(articles[0].title, "Cached"),
        other => panic!("expected cached replay, got {other:?}"),
    }

    assert!(matches!(starting.await.unwrap(), PollOutcome::Success(_)));
    service.shutdown().await;
}

#[tokio::test]
async fn persisted_empty_result_is_replayed_as_info() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(headlines_body(&[]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let store = store_with_key("k").await;
    store.save_cached_state(&CachedState::empty()).await.unwrap();

    let service = service_for(&server, store);
    let starting = {
        let service = service.clone();
        tokio::spawn(async move { service.start().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (late, mut late_rx) = ChannelObserver::pair("tab-9", 8);
    service.observers().register(Arc::new(late)).await;
    service.on_observer_ready("tab-9").await;
    assert_eq!(late_rx.try_recv().ok(), Some(Outbound::info(ticker_core::service::EMPTY_MESSAGE)));

    assert!(matches!(starting.await.unwrap(), PollOutcome::Empty));
    service.shutdown().await;
}

#[tokio::test]
async fn overlapping_requests_coalesce_into_one_follow_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(headlines_body(&["Slow"]))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let service = service_for(&server, LocalStore::in_memory());
    let first = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .reconfigure(SettingsUpdate {
                    api_key: Some("k".into()),
                    ..Default::default()
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(matches!(service.fetch_and_publish().await, PollOutcome::Skipped));
    assert!(matches!(service.fetch_and_publish().await, PollOutcome::Skipped));

    first.await.unwrap().unwrap();
    service.shutdown().await;
}

#[tokio::test]
async fn reset_restores_defaults_and_polls() {
    let server = MockServer::start().await;
    mount_headlines(&server, &["A"]).await;

    let service = service_for(&server, store_with_key("k").await);
    service.start().await;
    service
        .reconfigure(SettingsUpdate {
            refresh_interval: Some(60),
            scroll_speed: Some(10),
            enable_ticker: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();

    let (observer, mut rx) = ChannelObserver::pair("tab-1", 8);
    service.observers().register(Arc::new(observer)).await;
    service.handle(None, Inbound::ResetSettings).await.unwrap();

    assert_eq!(service.settings().await, Settings::default());
    assert_eq!(service.timer_period().await, Some(Duration::from_secs(15 * 60)));
    assert_eq!(rx.recv().await, Some(Outbound::settings_changed(&Settings::default())));
    match rx.recv().await {
        Some(Outbound::Error { message }) => assert!(message.contains("API key")),
        other => panic!("expected missing credential error, got {other:?}"),
    }
    service.shutdown().await;
}

#[tokio::test]
async fn emoji_annotation_follows_config() {
    let server = MockServer::start().await;
    mount_headlines(&server, &["Stock market closes higher", "Quiet day"]).await;

    let endpoint = format!("{}/v2/top-headlines", server.uri());
    let with_emoji = service_with_config(
        ServiceConfig {
            endpoint: endpoint.clone(),
            ..Default::default()
        },
        store_with_key("k").await,
    );
    match with_emoji.start().await {
        PollOutcome::Success(articles) => {
            assert_eq!(articles[0].emoji.as_deref(), Some("💰"));
            assert_eq!(articles[1].emoji.as_deref(), Some(ticker_core::DEFAULT_EMOJI));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    with_emoji.shutdown().await;

    let without_emoji = service_with_config(
        ServiceConfig {
            endpoint,
            annotate_emoji: false,
            ..Default::default()
        },
        store_with_key("k").await,
    );
    match without_emoji.start().await {
        PollOutcome::Success(articles) => assert!(articles.iter().all(|a| a.emoji.is_none())),
        other => panic!("unexpected outcome: {other:?}"),
    }
    without_emoji.shutdown().await;
}
