pub mod pipeline;

pub use pipeline::{
    PipelineError, PipelinePhase, PipelineProgress, PipelineWarning, SubjectPipeline,
    SubjectReport,
};
