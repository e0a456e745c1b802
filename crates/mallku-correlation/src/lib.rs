//! §4.A-E — event windowing, the four pattern detectors, the confidence
//! scorer, adaptive thresholds, and the Correlation Engine that wires them
//! together into a single `process(events)` tick.

pub mod detectors;
pub mod engine;
pub mod models;
pub mod scoring;
pub mod thresholds;
pub mod windowing;

pub use engine::{CorrelationEngine, CorrelationStats, MemoryAnchorSink, StoreAnchorSink};
pub use models::{CorrelationFeedback, CorrelationWindow, PatternType, TemporalCorrelation, TemporalPrecision};
pub use scoring::ConfidenceScorer;
pub use thresholds::AdaptiveThresholdsState;
