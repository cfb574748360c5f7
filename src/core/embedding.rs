use crate::core::similarity::l2_norm;
use crate::core::video::VideoAsset;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("video {id}: embedding provider failed: {message}")]
    Provider { id: String, message: String },

    #[error("video {id}: embedding is empty")]
    Empty { id: String },

    #[error("video {id}: embedding has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("video {id}: embedding has zero magnitude")]
    ZeroMagnitude { id: String },

    #[error("video {id}: embedding contains non-finite values")]
    NonFinite { id: String },
}

/// Fixed-length vector summarizing one video's visual content. Computed once
/// per video and cached for the lifetime of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    vector: Vec<f32>,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.vector
    }
}

/// External embedding capability: video in, fixed-length vector out.
///
/// Implementations must be deterministic for identical input so clustering
/// stays reproducible across runs. The pipeline treats the model as opaque;
/// tests inject stub providers.
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, video: &VideoAsset) -> Result<Embedding, EmbeddingError>;
}

/// Rejects vectors the matcher cannot use: wrong dimensionality, NaN/inf
/// values, or zero norm. Rejected videos are reported, never silently
/// dropped.
pub fn validate_embedding(
    id: &str,
    embedding: &Embedding,
    expected_dimension: usize,
) -> Result<(), EmbeddingError> {
    if embedding.vector.is_empty() {
        return Err(EmbeddingError::Empty { id: id.to_string() });
    }
    if embedding.dimension() != expected_dimension {
        return Err(EmbeddingError::DimensionMismatch {
            id: id.to_string(),
            expected: expected_dimension,
            actual: embedding.dimension(),
        });
    }
    if embedding.vector.iter().any(|v| !v.is_finite()) {
        return Err(EmbeddingError::NonFinite { id: id.to_string() });
    }
    if l2_norm(&embedding.vector) < f32::EPSILON {
        return Err(EmbeddingError::ZeroMagnitude { id: id.to_string() });
    }
    Ok(())
}

/// Built-in deterministic provider: resamples the per-frame mean-intensity
/// signal to a fixed length and standardizes it.
///
/// Standardizing makes the vector invariant to global `a*x + b` intensity
/// transforms, so intensity-scaled copies embed identically. This is a
/// stand-in for a pretrained network, good enough to run the pipeline end to
/// end and for tests; it is not a perceptual model.
pub struct MeanPoolProvider {
    dimension: usize,
}

impl MeanPoolProvider {
    const EPS: f64 = 1e-8;

    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl EmbeddingProvider for MeanPoolProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, video: &VideoAsset) -> Result<Embedding, EmbeddingError> {
        let signal: Vec<f64> = video.frames().iter().map(|f| f.mean()).collect();
        let resampled = resample(&signal, self.dimension);

        let mean = resampled.iter().sum::<f64>() / resampled.len() as f64;
        let variance =
            resampled.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / resampled.len() as f64;
        let denom = variance.sqrt() + Self::EPS;

        let vector = resampled
            .iter()
            .map(|v| ((v - mean) / denom) as f32)
            .collect();
        Ok(Embedding::new(vector))
    }
}

/// Linear-interpolation resampling of a 1-D signal to `target_len` points.
fn resample(signal: &[f64], target_len: usize) -> Vec<f64> {
    if signal.len() == 1 || target_len == 1 {
        return vec![signal[0]; target_len];
    }

    let step = (signal.len() - 1) as f64 / (target_len - 1) as f64;
    (0..target_len)
        .map(|i| {
            let pos = i as f64 * step;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(signal.len() - 1);
            let frac = pos - lo as f64;
            signal[lo] * (1.0 - frac) + signal[hi] * frac
        })
        .collect()
}
