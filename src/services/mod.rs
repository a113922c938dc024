pub mod affinity;
pub mod recommendations;
pub mod similarity;
pub mod weights;

pub use affinity::AffinityStore;
pub use recommendations::RecommendationEngine;
pub use similarity::SimilarityStore;
pub use weights::ActionWeights;

/// What a store did with one incoming record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// First record for the key
    Created,
    /// Stored value moved forward
    Updated,
    /// Merge produced the value already stored (replay or weaker signal)
    Unchanged,
    /// Logically older than the stored value and discarded
    Stale,
}
