//! §3-§4.G: the `Pattern` entity, its closed taxonomies, the Pattern
//! Library (typed store, lineage graph, synergy discovery) and Pattern
//! Evolution (fitness evaluation and the seven evolution effects).

pub mod evolution;
pub mod library;
pub mod model;
pub mod taxonomy;

pub use evolution::{EvolutionEvent, EvolutionType, FitnessMetrics, PatternEvolution};
pub use library::{PatternLibrary, PatternLibrarySummary};
pub use model::{Pattern, PatternIndicator, PatternMutation, PatternQuery, PatternStructure};
pub use taxonomy::{PatternLifecycle, PatternTaxonomy, PatternType};
