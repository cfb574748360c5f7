use serde::{Deserialize, Serialize};

/// Threshold constants for one pipeline run.
///
/// Every tunable lives here so the core algorithms stay reusable across
/// subjects and datasets with different duplication characteristics. The
/// defaults are the reference configuration used for the stimulus corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cosine similarity at or above `embedding_threshold - embedding_tolerance`
    /// makes a pair a duplicate *candidate*. The reference value of 1.0 means
    /// "effectively identical" embeddings only.
    pub embedding_threshold: f32,

    /// Floating-point slack applied below `embedding_threshold`.
    pub embedding_tolerance: f32,

    /// Length of the vectors the embedding provider must produce.
    pub embedding_dimension: usize,

    /// Post-alignment mean frame correlation required to confirm a candidate
    /// pair. Independent of the embedding threshold; structural similarity
    /// and cosine similarity are on different scales.
    pub confirmation_threshold: f64,

    /// Minimum number of aligned overlapping frames. Below this there is too
    /// little evidence to confirm a match.
    pub min_overlap: usize,

    /// Additive constant in variance denominators, guarding constant frames
    /// and constant signals against division by zero.
    pub normalize_eps: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embedding_threshold: 1.0,
            embedding_tolerance: 1e-4,
            embedding_dimension: 512,
            confirmation_threshold: 0.8,
            min_overlap: 5,
            normalize_eps: 1e-8,
        }
    }
}

impl PipelineConfig {
    /// Effective lower bound for candidate edges.
    pub fn candidate_cutoff(&self) -> f32 {
        self.embedding_threshold - self.embedding_tolerance
    }
}
