//! §4.E Correlation Engine — orchestrates windowing, detection, scoring,
//! and threshold-gating behind a single per-engine exclusion lock, and
//! requests memory anchor creation for accepted correlations.

use crate::detectors::{all_detectors, Detector};
use crate::models::{CorrelationFeedback, CorrelationWindow, PatternType, TemporalCorrelation};
use crate::scoring::ConfidenceScorer;
use crate::thresholds::AdaptiveThresholds;
use crate::windowing::{EventBuffer, WindowManager};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mallku_core::config::EngineConfig;
use mallku_core::event::Event;
use mallku_core::ids::Id;
use mallku_core::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Egress contract for memory anchor creation (§6 "Memory Anchor
/// contract"). The engine never talks to a concrete store; it calls this
/// trait, letting the CLI wire in a `mallku-store`-backed implementation
/// or a test double.
#[async_trait]
pub trait MemoryAnchorSink: Send + Sync {
    async fn create_anchor(&self, anchor: MemoryAnchor) -> Result<Id>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CursorEntry {
    pub timestamp: DateTime<Utc>,
    pub content: mallku_core::event::ValueMap,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MemoryAnchor {
    pub anchor_id: Id,
    pub timestamp: DateTime<Utc>,
    pub cursors: HashMap<String, CursorEntry>,
    pub predecessor_id: Option<Id>,
    pub metadata: serde_json::Value,
}

/// A no-op sink, used when persistence is disabled or for tests that do
/// not care about anchor egress.
pub struct NullAnchorSink;

#[async_trait]
impl MemoryAnchorSink for NullAnchorSink {
    async fn create_anchor(&self, anchor: MemoryAnchor) -> Result<Id> {
        Ok(anchor.anchor_id)
    }
}

/// Backs anchor creation with a `mallku-store` `CollectionStore`,
/// inserting into the `memory_anchors` collection (§6).
pub struct StoreAnchorSink {
    store: Arc<dyn mallku_store::CollectionStore>,
}

impl StoreAnchorSink {
    pub fn new(store: Arc<dyn mallku_store::CollectionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MemoryAnchorSink for StoreAnchorSink {
    async fn create_anchor(&self, anchor: MemoryAnchor) -> Result<Id> {
        let doc = serde_json::json!({
            "_key": anchor.anchor_id.to_string(),
            "anchor_id": anchor.anchor_id.to_string(),
            "timestamp_iso": anchor.timestamp.to_rfc3339(),
            "cursors": anchor.cursors,
            "predecessor_id": anchor.predecessor_id.map(|i| i.to_string()),
            "metadata": anchor.metadata,
        });
        self.store.upsert(mallku_store::collections::MEMORY_ANCHORS, doc, "_key").await?;
        Ok(anchor.anchor_id)
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CorrelationStats {
    pub total_correlations_detected: u64,
    pub correlations_accepted: u64,
    pub correlations_rejected: u64,
    pub memory_anchors_created: u64,
    pub last_tick: Option<DateTime<Utc>>,
}

const CORRELATION_CACHE_CAPACITY: usize = 2_000;
const FEEDBACK_QUEUE_CAPACITY_FACTOR: usize = 10;

struct EngineInner {
    buffer: EventBuffer,
    windows: WindowManager,
    scorer: ConfidenceScorer,
    thresholds: AdaptiveThresholds,
    stats: CorrelationStats,
    feedback_queue: VecDeque<CorrelationFeedback>,
    /// Bounded cache of recently emitted correlations, keyed by id, used to
    /// pair incoming feedback with the correlation it refers to for scorer
    /// weight learning (§4.C `update_from_feedback` needs the pair).
    correlation_cache: HashMap<Id, TemporalCorrelation>,
    correlation_order: VecDeque<Id>,
    detectors: Vec<Box<dyn Detector + Send + Sync>>,
}

impl EngineInner {
    fn remember(&mut self, correlation: TemporalCorrelation) {
        if self.correlation_cache.len() >= CORRELATION_CACHE_CAPACITY {
            if let Some(oldest) = self.correlation_order.pop_front() {
                self.correlation_cache.remove(&oldest);
            }
        }
        self.correlation_order.push_back(correlation.correlation_id);
        self.correlation_cache.insert(correlation.correlation_id, correlation);
    }
}

/// §4.E — the tightly-coupled pipeline over §4.A-D, gated by a single
/// per-engine exclusion lock (`Mutex<EngineInner>`). Evolution, wisdom
/// promotion, and feedback learning triggered from here never hold this
/// lock longer than a single `process()` tick, per §2's control model.
pub struct CorrelationEngine {
    inner: Mutex<EngineInner>,
    config: EngineConfig,
    anchor_sink: Arc<dyn MemoryAnchorSink>,
}

impl CorrelationEngine {
    pub fn new(config: EngineConfig, thresholds_path: Option<&std::path::Path>, anchor_sink: Arc<dyn MemoryAnchorSink>) -> Self {
        let window_size = chrono::Duration::seconds(config.window_size_secs);
        let inner = EngineInner {
            buffer: EventBuffer::new(config.ring_buffer_capacity),
            windows: WindowManager::new(window_size, config.overlap_factor, config.min_occurrences.max(2)),
            scorer: ConfidenceScorer::default(),
            thresholds: AdaptiveThresholds::new(thresholds_path),
            stats: CorrelationStats::default(),
            feedback_queue: VecDeque::new(),
            correlation_cache: HashMap::new(),
            correlation_order: VecDeque::new(),
            detectors: all_detectors(),
        };
        Self { inner: Mutex::new(inner), config, anchor_sink }
    }

    pub async fn stats(&self) -> CorrelationStats {
        self.inner.lock().await.stats.clone()
    }

    /// Snapshot of the learned threshold state, for `mallku export-state`.
    pub async fn thresholds_state(&self) -> crate::thresholds::AdaptiveThresholdsState {
        self.inner.lock().await.thresholds.state.clone()
    }

    /// Snapshot of the learned scorer weights, for `mallku export-state`.
    pub async fn scorer_weights(&self) -> HashMap<String, f64> {
        self.inner.lock().await.scorer.weights.clone()
    }

    /// Resets scorer weights and adaptive thresholds to the §4.C/§4.D
    /// defaults and re-persists (§6 `reset-learning`).
    pub async fn reset_learning(&self) -> Result<()> {
        let mut state = self.inner.lock().await;
        state.scorer = ConfidenceScorer::default();
        state.thresholds.reset_to_defaults()
    }

    /// Single public entry point. Serialized by the per-engine lock —
    /// concurrent callers queue behind this `await` (§5's "queued-future"
    /// caller preference).
    pub async fn process(&self, events: Vec<Event>) -> Vec<TemporalCorrelation> {
        let mut guard = self.inner.lock().await;
        self.process_locked(&mut guard, events).await
    }

    /// Non-blocking variant: returns `Error::Transient` instead of queuing
    /// when another tick already holds the lock (§5's "or error depending
    /// on caller preference").
    pub async fn try_process(&self, events: Vec<Event>) -> Result<Vec<TemporalCorrelation>> {
        match self.inner.try_lock() {
            Ok(mut guard) => Ok(self.process_locked(&mut guard, events).await),
            Err(_) => Err(Error::transient("engine tick lock is held")),
        }
    }

    async fn process_locked(&self, state: &mut EngineInner, events: Vec<Event>) -> Vec<TemporalCorrelation> {
        let tick_start = std::time::Instant::now();
        let now = events.iter().map(|e| e.timestamp).max().unwrap_or_else(Utc::now);

        for event in &events {
            if event.validate(Utc::now()).is_err() {
                warn!(event_id = %event.event_id, "dropping invalid event");
                continue;
            }
            state.buffer.push(event.clone());
        }
        state.windows.advance(now);
        for event in &events {
            state.windows.distribute(event);
        }

        let mut raw = Vec::new();
        for window in state.windows.active_windows() {
            raw.extend(self.detect_in_window(window, &state.detectors));
        }

        let deduped = dedupe_correlations(raw);

        let feedback_snapshot: Vec<CorrelationFeedback> = state.feedback_queue.iter().cloned().collect();
        let rejected_before = state.stats.correlations_rejected;
        let mut accepted = Vec::new();
        for mut correlation in deduped {
            let (score, factors) = state.scorer.score(&correlation, &feedback_snapshot, now);
            correlation.confidence_score = score;
            correlation.confidence_factors = factors;

            if state.thresholds.should_accept(score, correlation.occurrence_frequency as i64, correlation.pattern_type) {
                state.stats.correlations_accepted += 1;
                if self.request_anchor(&correlation).await {
                    state.stats.memory_anchors_created += 1;
                }
                state.remember(correlation.clone());
                accepted.push(correlation);
            } else {
                state.stats.correlations_rejected += 1;
            }
        }

        let rejected_delta = state.stats.correlations_rejected - rejected_before;
        state.stats.total_correlations_detected += accepted.len() as u64 + rejected_delta;
        state.stats.last_tick = Some(now);

        let elapsed = tick_start.elapsed();
        if elapsed.as_millis() as u64 > self.config.tick_soft_cap_ms {
            warn!(elapsed_ms = elapsed.as_millis() as u64, "tick exceeded soft cap; continuing");
        }
        debug!(accepted = accepted.len(), rejected = state.stats.correlations_rejected, "tick complete");

        accepted
    }

    /// Runs every detector over the window, catching panics per detector
    /// so one misbehaving detector never drops the others' output (§4.E
    /// step 2, §7 "detectors never throw upward").
    fn detect_in_window(&self, window: &CorrelationWindow, detectors: &[Box<dyn Detector + Send + Sync>]) -> Vec<TemporalCorrelation> {
        if window.events.len() < window.minimum_events {
            return Vec::new();
        }
        let mut out = Vec::new();
        for detector in detectors {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                detector.detect(window, self.config.min_occurrences, self.config.min_confidence)
            }));
            match result {
                Ok(correlations) => out.extend(correlations),
                Err(_) => {
                    error!(window_id = %window.window_id, pattern_type = ?detector.pattern_type(), "detector panicked; skipping this window for this detector");
                }
            }
        }
        out
    }

    /// Returns whether the anchor was created, so the caller (already
    /// holding the tick lock) can update `memory_anchors_created`.
    async fn request_anchor(&self, correlation: &TemporalCorrelation) -> bool {
        let anchor = build_anchor(correlation);
        let sink = self.anchor_sink.clone();
        let result = mallku_core::retry::with_backoff(|| {
            let sink = sink.clone();
            let anchor = anchor.clone();
            async move { sink.create_anchor(anchor).await }
        })
        .await;
        match result {
            Ok(_) => true,
            Err(e) => {
                error!(correlation_id = %correlation.correlation_id, error = %e, "failed to create memory anchor after retries");
                false
            }
        }
    }

    /// §4.E "Feedback": enqueues, discarding the oldest on overflow (§5
    /// backpressure), and triggers learning once the queue reaches the
    /// configured batch size.
    pub async fn add_feedback(&self, feedback: CorrelationFeedback) {
        let mut state = self.inner.lock().await;
        let capacity = self.config.learning_batch_size * FEEDBACK_QUEUE_CAPACITY_FACTOR;
        if state.feedback_queue.len() >= capacity {
            state.feedback_queue.pop_front();
        }
        state.feedback_queue.push_back(feedback);

        if state.feedback_queue.len() >= self.config.learning_batch_size {
            self.run_learning(&mut state).await;
        }
    }

    async fn run_learning(&self, state: &mut EngineInner) {
        let batch: Vec<CorrelationFeedback> = state.feedback_queue.drain(..).collect();
        let now = Utc::now();

        let pairs: Vec<(TemporalCorrelation, CorrelationFeedback)> = batch
            .iter()
            .filter_map(|f| state.correlation_cache.get(&f.correlation_id).map(|c| (c.clone(), f.clone())))
            .collect();

        match state.scorer.update_from_feedback(&pairs, now) {
            Ok(weights) => info!(?weights, "scorer weights updated from feedback"),
            Err(e) => info!(reason = %e, "scorer weight update skipped"),
        }

        match state.thresholds.update_from_feedback(&batch) {
            Ok(metrics) => info!(precision = metrics.precision, recall = metrics.recall, "thresholds updated from feedback"),
            Err(e) => info!(reason = %e, "threshold update skipped"),
        }
    }
}

fn build_anchor(correlation: &TemporalCorrelation) -> MemoryAnchor {
    let mut all_events = vec![&correlation.primary_event];
    all_events.extend(correlation.correlated_events.iter());

    let mut cursors = HashMap::new();
    for event in &all_events {
        let key = format!("{:?}:{}", event.event_type, event.stream_id);
        cursors.insert(
            key,
            CursorEntry { timestamp: event.timestamp, content: event.content.clone() },
        );
    }

    let providers: std::collections::HashSet<String> = all_events.iter().map(|e| e.stream_id.clone()).collect();
    let metadata = serde_json::json!({
        "correlation_id": correlation.correlation_id.to_string(),
        "pattern_type": format!("{:?}", correlation.pattern_type),
        "confidence_score": correlation.confidence_score,
        "occurrence_frequency": correlation.occurrence_frequency,
        "temporal_gap_secs": correlation.temporal_gap.num_milliseconds() as f64 / 1000.0,
        "event_count": all_events.len(),
        "providers": providers,
        "creation_trigger": "correlation_detection",
    });

    MemoryAnchor {
        anchor_id: Id::new(),
        timestamp: correlation.primary_event.timestamp,
        cursors,
        predecessor_id: None,
        metadata,
    }
}

/// §4.B tie-break: when multiple detectors emit overlapping correlations,
/// de-duplicate by `(primary_event, pattern_type)`, keeping the higher
/// confidence.
fn dedupe_correlations(raw: Vec<TemporalCorrelation>) -> Vec<TemporalCorrelation> {
    let mut best: HashMap<(Id, PatternType), TemporalCorrelation> = HashMap::new();
    for c in raw {
        let key = (c.primary_event.event_id, c.pattern_type);
        match best.get(&key) {
            Some(existing) if existing.confidence_score >= c.confidence_score => {}
            _ => {
                best.insert(key, c);
            }
        }
    }
    best.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mallku_core::event::EventType;

    fn evt(event_type: EventType, stream: &str, t0: DateTime<Utc>, secs: f64) -> Event {
        let mut e = Event::new(event_type, stream);
        e.timestamp = t0 + chrono::Duration::milliseconds((secs * 1000.0) as i64);
        e
    }

    #[tokio::test]
    async fn sequential_scenario_produces_an_accepted_correlation() {
        let config = EngineConfig { min_occurrences: 3, min_confidence: 0.5, ..EngineConfig::default() };
        let engine = CorrelationEngine::new(config, None, Arc::new(NullAnchorSink));
        let t0 = Utc::now() - chrono::Duration::minutes(1);
        let events = vec![
            evt(EventType::Communication, "S1", t0, 0.0),
            evt(EventType::Communication, "S1", t0, 60.0),
            evt(EventType::Communication, "S1", t0, 120.0),
            evt(EventType::Storage, "S2", t0, 5.0),
            evt(EventType::Storage, "S2", t0, 65.0),
            evt(EventType::Storage, "S2", t0, 125.0),
        ];
        let accepted = engine.process(events).await;
        assert!(accepted.iter().any(|c| c.pattern_type == PatternType::Sequential));
        let stats = engine.stats().await;
        assert_eq!(stats.correlations_accepted as usize, accepted.len());
    }

    #[tokio::test]
    async fn single_event_tick_accepts_nothing() {
        let engine = CorrelationEngine::new(EngineConfig::default(), None, Arc::new(NullAnchorSink));
        let accepted = engine.process(vec![Event::new(EventType::Activity, "s1")]).await;
        assert!(accepted.is_empty());
    }

    #[tokio::test]
    async fn concurrent_process_calls_serialize_without_losing_data() {
        let engine = Arc::new(CorrelationEngine::new(EngineConfig::default(), None, Arc::new(NullAnchorSink)));
        let t0 = Utc::now();
        let mut handles = Vec::new();
        for i in 0..4 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                let events = vec![evt(EventType::Activity, "s1", t0, i as f64)];
                engine.process(events).await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let stats = engine.stats().await;
        assert!(stats.last_tick.is_some());
    }

    #[tokio::test]
    async fn feedback_below_batch_size_does_not_panic() {
        let engine = CorrelationEngine::new(EngineConfig::default(), None, Arc::new(NullAnchorSink));
        let feedback = CorrelationFeedback {
            feedback_id: Id::new(),
            correlation_id: Id::new(),
            is_meaningful: true,
            confidence_rating: 0.9,
            explanation: String::new(),
            feedback_timestamp: Utc::now(),
            user_context: Default::default(),
            feedback_source: "test".into(),
            implicit_signal: false,
        };
        engine.add_feedback(feedback).await;
    }
}
