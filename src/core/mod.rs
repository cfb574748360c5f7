pub mod alignment;
pub mod cluster;
pub mod digest;
pub mod embedding;
pub mod metadata;
pub mod normalize;
pub mod overrides;
pub mod similarity;
pub mod video;

pub use alignment::{validate_pair, AlignmentError, AlignmentResult};
pub use cluster::{build_clusters, EquivalenceCluster};
pub use digest::frame_digest;
pub use embedding::{
    validate_embedding, Embedding, EmbeddingError, EmbeddingProvider, MeanPoolProvider,
};
pub use metadata::{CombinedMetadata, MetadataSummary, Provenance, VideoRecord};
pub use normalize::normalize_frame;
pub use overrides::{
    ForcedDecision, ManualOverrideEntry, ManualOverrideTable, OverrideError, OverrideOutcome,
};
pub use similarity::{cosine_similarity, find_candidates, CandidateEdge, SimilarityError};
pub use video::{CorpusError, Frame, VideoAsset};
