//! The bounded two-lane scheduler (§9 redesign note "Async/await and
//! background learning"): a tick lane that advances the correlation
//! engine's windows on a fixed cadence, and a maintenance lane that sweeps
//! the pattern library for evolution opportunities. Feedback learning
//! itself is triggered inline from `CorrelationEngine::add_feedback` once
//! its batch threshold is reached; the maintenance lane only drives the
//! slower, periodic sweep over already-stored patterns.

use mallku_core::event::Event;
use mallku_correlation::CorrelationEngine;
use mallku_patterns::{PatternEvolution, PatternLibrary, PatternQuery};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

const TICK_INTERVAL: Duration = Duration::from_secs(5);
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);
pub const EVENT_CHANNEL_CAPACITY: usize = 10_000;

/// Spawns the tick lane: drains whatever events have arrived since the
/// last tick (non-blocking) and advances the engine regardless, so window
/// boundaries move forward even during quiet periods.
pub fn spawn_tick_lane(engine: Arc<CorrelationEngine>, mut events: mpsc::Receiver<Event>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            let mut batch = Vec::new();
            while let Ok(event) = events.try_recv() {
                batch.push(event);
            }
            let accepted = engine.process(batch).await;
            if !accepted.is_empty() {
                info!(accepted = accepted.len(), "tick lane accepted correlations");
            }
        }
    })
}

/// Spawns the maintenance lane: periodically asks Pattern Evolution
/// whether any cached pattern has an evolution opportunity and applies it.
pub fn spawn_maintenance_lane(library: Arc<PatternLibrary>, evolution: Arc<PatternEvolution>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            interval.tick().await;
            let candidates = library.find(&PatternQuery::new());
            for pattern in candidates {
                let now = chrono::Utc::now();
                match evolution.detect_opportunity(pattern.pattern_id, now).await {
                    Ok(Some(evolution_type)) => {
                        match evolution.evolve(pattern.pattern_id, evolution_type, Vec::new(), now).await {
                            Ok(Some(_)) => info!(pattern_id = %pattern.pattern_id, ?evolution_type, "maintenance lane evolved pattern"),
                            Ok(None) => {}
                            Err(e) => warn!(pattern_id = %pattern.pattern_id, error = %e, "maintenance lane evolution failed"),
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(pattern_id = %pattern.pattern_id, error = %e, "maintenance lane opportunity detection failed"),
                }
            }
        }
    })
}
