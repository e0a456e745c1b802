//! Cross-module integration tests for the concrete end-to-end scenarios in
//! spec §8, beyond what the inline unit tests already cover.

use chrono::{Duration, Utc};
use mallku_core::event::{Event, EventType};
use mallku_correlation::detectors::{ConcurrentDetector, Detector};
use mallku_correlation::models::{CorrelationWindow, TemporalPrecision};

fn at(event_type: EventType, stream: &str, t0: chrono::DateTime<Utc>, secs: f64) -> Event {
    let mut e = Event::new(event_type, stream);
    e.timestamp = t0 + Duration::milliseconds((secs * 1000.0) as i64);
    e
}

fn window_with(events: Vec<Event>) -> CorrelationWindow {
    let start = events.iter().map(|e| e.timestamp).min().unwrap() - Duration::seconds(1);
    let end = events.iter().map(|e| e.timestamp).max().unwrap() + Duration::seconds(1);
    let mut w = CorrelationWindow::new(start, end, 0.3, 2);
    for e in events {
        w.insert(e);
    }
    w
}

#[test]
fn concurrent_scenario_from_spec() {
    let t0 = Utc::now();
    let events = vec![
        at(EventType::Activity, "S1", t0, 0.0),
        at(EventType::Storage, "S2", t0, 0.5),
        at(EventType::Activity, "S1", t0, 60.0),
        at(EventType::Storage, "S2", t0, 60.4),
        at(EventType::Activity, "S1", t0, 120.0),
        at(EventType::Storage, "S2", t0, 120.3),
    ];
    let window = window_with(events);
    let correlations = ConcurrentDetector.detect(&window, 3, 0.6);
    let hit = correlations
        .iter()
        .find(|c| c.occurrence_frequency == 3 && c.temporal_precision == TemporalPrecision::Minute)
        .expect("expected one concurrent correlation within the 30s horizon mapped to minute precision");
    assert!(hit.pattern_stability >= 0.99);
}

#[tokio::test]
async fn engine_end_to_end_accepts_sequential_and_creates_anchor() {
    use mallku_core::config::EngineConfig;
    use mallku_correlation::engine::{CorrelationEngine, NullAnchorSink};
    use std::sync::Arc;

    let config = EngineConfig { min_occurrences: 3, min_confidence: 0.5, ..EngineConfig::default() };
    let engine = CorrelationEngine::new(config, None, Arc::new(NullAnchorSink));
    let t0 = Utc::now() - Duration::minutes(2);
    let events = vec![
        at(EventType::Communication, "S1", t0, 0.0),
        at(EventType::Communication, "S1", t0, 60.0),
        at(EventType::Communication, "S1", t0, 120.0),
        at(EventType::Storage, "S2", t0, 5.0),
        at(EventType::Storage, "S2", t0, 65.0),
        at(EventType::Storage, "S2", t0, 125.0),
    ];
    let accepted = engine.process(events).await;
    assert!(!accepted.is_empty());
    for c in &accepted {
        assert!((0.0..=1.0).contains(&c.confidence_score));
    }
    let stats = engine.stats().await;
    assert_eq!(stats.correlations_accepted as usize, accepted.len());
}
