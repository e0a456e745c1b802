//! Engine configuration — layered TOML file + environment + CLI flags, the
//! same pattern the teacher uses for `GatewayConfig` (`agenticlaw-core/src/types.rs`).

use serde::{Deserialize, Serialize};

fn default_ring_buffer_capacity() -> usize {
    10_000
}
fn default_window_size_secs() -> i64 {
    2 * 3600
}
fn default_overlap_factor() -> f64 {
    0.3
}
fn default_min_occurrences() -> usize {
    3
}
fn default_min_confidence() -> f64 {
    0.6
}
fn default_learning_batch_size() -> usize {
    50
}
fn default_tick_soft_cap_ms() -> u64 {
    2_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ring_buffer_capacity: usize,
    pub window_size_secs: i64,
    pub overlap_factor: f64,
    pub min_occurrences: usize,
    pub min_confidence: f64,
    pub learning_batch_size: usize,
    pub tick_soft_cap_ms: u64,
    /// When true, persistence is disabled and the store runs purely
    /// in-memory (mirrors `MALLKU_SKIP_DATABASE=true`).
    pub skip_database: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ring_buffer_capacity: default_ring_buffer_capacity(),
            window_size_secs: default_window_size_secs(),
            overlap_factor: default_overlap_factor(),
            min_occurrences: default_min_occurrences(),
            min_confidence: default_min_confidence(),
            learning_batch_size: default_learning_batch_size(),
            tick_soft_cap_ms: default_tick_soft_cap_ms(),
            skip_database: false,
        }
    }
}

impl EngineConfig {
    /// Load from an optional TOML file, then apply the `MALLKU_SKIP_DATABASE`
    /// environment override. Missing file is not an error — defaults apply.
    pub fn load(path: Option<&std::path::Path>) -> crate::Result<Self> {
        let mut cfg = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p)?;
                toml::from_str(&text)
                    .map_err(|e| crate::Error::Configuration(format!("invalid config: {e}")))?
            }
            _ => Self::default(),
        };

        if std::env::var("MALLKU_SKIP_DATABASE").as_deref() == Ok("true") {
            cfg.skip_database = true;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> crate::Result<()> {
        if self.overlap_factor < 0.0 || self.overlap_factor > 1.0 {
            return Err(crate::Error::Configuration(
                "overlap_factor must be in [0, 1]".into(),
            ));
        }
        if self.window_size_secs <= 0 {
            return Err(crate::Error::Configuration(
                "window_size_secs must be positive".into(),
            ));
        }
        if self.ring_buffer_capacity == 0 {
            return Err(crate::Error::Configuration(
                "ring_buffer_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_overlap() {
        let mut cfg = EngineConfig::default();
        cfg.overlap_factor = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = EngineConfig::load(Some(std::path::Path::new("/nonexistent/mallku.toml"))).unwrap();
        assert_eq!(cfg.ring_buffer_capacity, 10_000);
    }
}
