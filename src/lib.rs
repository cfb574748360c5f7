pub mod config;
pub mod core;
pub mod services;

pub use config::PipelineConfig;
pub use core::{
    CombinedMetadata, EquivalenceCluster, ManualOverrideTable, MeanPoolProvider, Provenance,
    VideoAsset,
};
pub use services::{SubjectPipeline, SubjectReport};
