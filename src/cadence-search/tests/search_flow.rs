use cadence_core::{
    BusMessage, ExtractorRegistry, LegacyReply, LocalBus, MediaType, MessageBus, ProviderReply,
    SearchConfig,
};
use cadence_search::{SearchAggregator, StopReason};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

fn aggregator(config: SearchConfig) -> (SearchAggregator, Arc<LocalBus>) {
    let bus = Arc::new(LocalBus::new(256));
    let mut agg = SearchAggregator::new(bus.clone(), config, Arc::new(ExtractorRegistry::new()));
    agg.set_gui_available(true);
    (agg, bus)
}

fn typed_only() -> SearchConfig {
    SearchConfig {
        search_fallback: false,
        ..SearchConfig::default()
    }
}

fn reply(phrase: &str, provider: &str, results: Value) -> BusMessage {
    BusMessage::ProviderReply(ProviderReply {
        phrase: phrase.into(),
        provider_id: provider.into(),
        searching: false,
        timeout: None,
        results: results.as_array().cloned().unwrap_or_default(),
    })
}

fn result(uri: &str, confidence: u32) -> Value {
    json!({"uri": uri, "title": uri, "match_confidence": confidence, "media_type": "radio"})
}

/// Emits each message at its offset after the first search query is seen.
fn script(bus: &Arc<LocalBus>, steps: Vec<(u64, BusMessage)>) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    let bus = bus.clone();
    tokio::spawn(async move {
        let start = loop {
            match rx.recv().await {
                Ok(BusMessage::SearchStart { .. }) => break Instant::now(),
                Ok(_) => continue,
                Err(_) => return,
            }
        };
        for (offset_ms, message) in steps {
            tokio::time::sleep_until(start + Duration::from_millis(offset_ms)).await;
            bus.emit(message);
        }
    })
}

#[tokio::test(start_paused = true)]
async fn high_confidence_reply_stops_after_grace() {
    let (mut agg, bus) = aggregator(typed_only());
    script(
        &bus,
        vec![(200, reply("relax fm", "radio", json!([result("http://relax.fm/live", 95)])))],
    );

    let start = Instant::now();
    let groups = agg.search("relax fm", MediaType::Radio).await;
    let elapsed = start.elapsed();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].provider_id, "radio");
    assert_eq!(groups[0].results[0].match_confidence, 95);
    assert!(elapsed >= Duration::from_millis(1200), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(1300), "{elapsed:?}");
    assert_eq!(
        agg.last_session().and_then(|s| s.stop_reason()),
        Some(StopReason::EarlyStop)
    );
}

#[tokio::test(start_paused = true)]
async fn replies_inside_grace_window_still_land() {
    let (mut agg, bus) = aggregator(typed_only());
    script(
        &bus,
        vec![(100, reply("jazz", "a", json!([result("http://a/jazz", 95)])))],
    );
    script(
        &bus,
        vec![(600, reply("jazz", "b", json!([result("http://b/jazz", 96)])))],
    );

    let start = Instant::now();
    let groups = agg.search("jazz", MediaType::Radio).await;
    assert_eq!(groups.len(), 2);
    assert_eq!(agg.results().len(), 2);
    // only the first high-confidence reply arms the stop
    assert!(start.elapsed() < Duration::from_millis(1200));
}

#[tokio::test(start_paused = true)]
async fn silence_returns_empty_at_ceiling() {
    let (mut agg, _bus) = aggregator(typed_only());
    let start = Instant::now();
    let groups = agg.search("nothing", MediaType::Radio).await;
    assert!(groups.is_empty());
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_millis(5100));
    assert_eq!(
        agg.last_session().and_then(|s| s.stop_reason()),
        Some(StopReason::Ceiling)
    );
}

#[tokio::test(start_paused = true)]
async fn empty_typed_search_falls_back_to_generic() {
    let (mut agg, bus) = aggregator(SearchConfig::default());
    let mut rx = bus.subscribe();
    let start = Instant::now();
    let groups = agg.search("nothing", MediaType::Music).await;
    assert!(groups.is_empty());
    assert!(start.elapsed() >= Duration::from_secs(13));

    let mut queried = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let BusMessage::SearchStart { media_type, .. } = message {
            queried.push(media_type);
        }
    }
    assert_eq!(queried, [MediaType::Music, MediaType::Generic]);
}

#[tokio::test(start_paused = true)]
async fn extension_keeps_late_reply_inside_deadline() {
    let (mut agg, bus) = aggregator(typed_only());
    let searching = BusMessage::ProviderReply(ProviderReply {
        phrase: "jazz".into(),
        provider_id: "slow".into(),
        searching: true,
        timeout: Some(2.0),
        results: Vec::new(),
    });
    script(
        &bus,
        vec![
            (100, searching),
            (2500, reply("jazz", "slow", json!([result("http://slow/jazz", 50)]))),
        ],
    );

    let groups = agg.search("jazz", MediaType::Radio).await;
    assert_eq!(groups.len(), 1);
    assert_eq!(
        agg.last_session().and_then(|s| s.stop_reason()),
        Some(StopReason::Ceiling)
    );
}

#[tokio::test(start_paused = true)]
async fn reply_past_deadline_ends_search() {
    let config = SearchConfig {
        allow_extensions: false,
        ..typed_only()
    };
    let (mut agg, bus) = aggregator(config);
    script(
        &bus,
        vec![(1500, reply("jazz", "slow", json!([result("http://slow/jazz", 50)])))],
    );

    let start = Instant::now();
    let groups = agg.search("jazz", MediaType::Radio).await;
    assert_eq!(groups.len(), 1);
    assert_eq!(start.elapsed(), Duration::from_millis(1500));
    assert_eq!(
        agg.last_session().and_then(|s| s.stop_reason()),
        Some(StopReason::Deadline)
    );
}

#[tokio::test(start_paused = true)]
async fn extension_requests_ignored_when_disabled() {
    let config = SearchConfig {
        allow_extensions: false,
        ..typed_only()
    };
    let (mut agg, bus) = aggregator(config);
    let searching = BusMessage::ProviderReply(ProviderReply {
        phrase: "jazz".into(),
        provider_id: "slow".into(),
        searching: true,
        timeout: Some(2.0),
        results: Vec::new(),
    });
    script(
        &bus,
        vec![
            (100, searching),
            (1500, reply("jazz", "slow", json!([result("http://slow/jazz", 50)]))),
        ],
    );

    let start = Instant::now();
    let groups = agg.search("jazz", MediaType::Radio).await;
    assert_eq!(groups.len(), 1);
    assert_eq!(start.elapsed(), Duration::from_millis(1500));
    assert_eq!(
        agg.last_session().and_then(|s| s.stop_reason()),
        Some(StopReason::Deadline)
    );
}

#[tokio::test(start_paused = true)]
async fn search_provider_keeps_only_that_provider() {
    let (mut agg, bus) = aggregator(typed_only());
    script(
        &bus,
        vec![
            (100, reply("jazz", "a", json!([result("http://a/jazz", 60)]))),
            (200, reply("jazz", "b", json!([result("http://b/jazz", 70)]))),
        ],
    );

    let group = agg
        .search_provider("b", "jazz", MediaType::Radio)
        .await
        .unwrap();
    assert_eq!(group.provider_id, "b");
    assert_eq!(group.results.len(), 1);
    assert_eq!(group.results[0].uri.as_deref(), Some("http://b/jazz"));

    script(
        &bus,
        vec![(100, reply("jazz", "a", json!([result("http://a/jazz", 60)])))],
    );
    assert!(agg
        .search_provider("missing", "jazz", MediaType::Radio)
        .await
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn replies_for_other_phrases_are_ignored() {
    let (mut agg, bus) = aggregator(typed_only());
    script(
        &bus,
        vec![(100, reply("yesterday", "old", json!([result("http://old/x", 99)])))],
    );
    let groups = agg.search("today", MediaType::Radio).await;
    assert!(groups.is_empty());
    assert!(agg.results().is_empty());
}

#[tokio::test(start_paused = true)]
async fn search_ends_once_all_providers_finish() {
    let (mut agg, bus) = aggregator(typed_only());
    script(
        &bus,
        vec![
            (
                0,
                BusMessage::ProviderSearchBegin {
                    provider_id: "a".into(),
                },
            ),
            (100, reply("jazz", "a", json!([result("http://a/jazz", 40)]))),
            (
                100,
                BusMessage::ProviderSearchEnd {
                    provider_id: "a".into(),
                },
            ),
        ],
    );

    let start = Instant::now();
    let groups = agg.search("jazz", MediaType::Radio).await;
    assert_eq!(groups.len(), 1);
    assert_eq!(start.elapsed(), Duration::from_millis(600));
    assert_eq!(
        agg.last_session().and_then(|s| s.stop_reason()),
        Some(StopReason::AllProvidersDone)
    );
}

#[tokio::test(start_paused = true)]
async fn queued_replies_after_stop_are_late() {
    let config = SearchConfig {
        early_stop_grace_secs: 0.0,
        ..typed_only()
    };
    let (mut agg, bus) = aggregator(config);
    let bus_for_provider = bus.clone();
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(message) = rx.recv().await {
            if matches!(message, BusMessage::SearchStart { .. }) {
                bus_for_provider.emit(reply("jazz", "fast", json!([result("http://fast/jazz", 99)])));
                bus_for_provider.emit(reply("jazz", "slow", json!([result("http://slow/jazz", 70)])));
                break;
            }
        }
    });

    let groups = agg.search("jazz", MediaType::Radio).await;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].provider_id, "fast");
    let session = agg.last_session().unwrap();
    assert_eq!(session.late_replies().len(), 1);
    assert_eq!(session.late_replies()[0].provider_id, "slow");
}

#[tokio::test(start_paused = true)]
async fn duplicates_are_collected_once() {
    let (mut agg, bus) = aggregator(typed_only());
    script(
        &bus,
        vec![
            (100, reply("jazz", "a", json!([result("http://same/jazz", 60)]))),
            (200, reply("jazz", "b", json!([result("http://same/jazz", 60)]))),
        ],
    );
    let groups = agg.search("jazz", MediaType::Radio).await;
    assert_eq!(groups.len(), 2);
    assert_eq!(agg.results().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn legacy_replies_are_translated() {
    let (mut agg, bus) = aggregator(typed_only());
    let responder = bus.clone();
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(message) = rx.recv().await {
            if let BusMessage::LegacyQuery { phrase } = message {
                responder.emit(BusMessage::LegacyReply(LegacyReply {
                    phrase,
                    skill_id: "old.skill".into(),
                    conf: 0.7,
                    callback_data: json!({"stream": "http://old/jazz"})
                        .as_object()
                        .cloned()
                        .unwrap(),
                    searching: false,
                }));
                break;
            }
        }
    });

    let groups = agg.search("jazz", MediaType::Music).await;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].provider_id, "old.skill");
    assert_eq!(groups[0].results[0].match_confidence, 70);
}

#[tokio::test(start_paused = true)]
async fn search_emits_ui_progress() {
    let (mut agg, bus) = aggregator(typed_only());
    let mut ui = bus.subscribe();
    script(
        &bus,
        vec![(100, reply("jazz", "a", json!([result("http://a/jazz", 95)])))],
    );
    agg.search("jazz", MediaType::Radio).await;

    let mut names = Vec::new();
    while let Ok(message) = ui.try_recv() {
        names.push(message.name());
    }
    assert_eq!(names.first(), Some(&"query.search.stop"));
    assert!(names.contains(&"ui.search.spinner"));
    assert!(names.contains(&"ui.search.footer"));
    assert_eq!(names.last(), Some(&"ui.search.results"));
}
