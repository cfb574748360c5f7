use crate::config::PipelineConfig;
use crate::core::embedding::Embedding;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimilarityError {
    #[error("empty vector")]
    EmptyVector,

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("zero magnitude vector, cosine undefined")]
    ZeroMagnitude,
}

#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity in [-1.0, 1.0], clamped against floating-point drift.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, SimilarityError> {
    if a.is_empty() || b.is_empty() {
        return Err(SimilarityError::EmptyVector);
    }
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return Err(SimilarityError::ZeroMagnitude);
    }

    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// An unordered candidate pair. Endpoints are stored with `a < b`, which
/// rules out self-edges and makes the score trivially symmetric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEdge {
    pub a: String,
    pub b: String,
    pub score: f32,
    pub validated: bool,
}

impl CandidateEdge {
    pub fn between(x: impl Into<String>, y: impl Into<String>, score: f32) -> Self {
        let (x, y) = (x.into(), y.into());
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        Self {
            a,
            b,
            score,
            validated: false,
        }
    }

    fn exact(x: &str, y: &str) -> Self {
        let mut edge = Self::between(x, y, 1.0);
        edge.validated = true;
        edge
    }
}

/// Pairwise matcher for one subject.
///
/// Compares every unordered pair of embedded videos; pairs whose cosine
/// similarity reaches the configured cutoff become candidate edges. Subjects
/// hold a few hundred clips, so the quadratic scan is the natural bound and
/// no index structure is needed.
///
/// Pairs with identical frame digests are emitted pre-validated with score
/// 1.0; bit-identical content needs no alignment check.
pub fn find_candidates(
    embeddings: &BTreeMap<String, Embedding>,
    digests: &BTreeMap<String, String>,
    config: &PipelineConfig,
) -> Vec<CandidateEdge> {
    let ids: Vec<&String> = embeddings.keys().collect();
    let cutoff = config.candidate_cutoff();

    let mut pairs = Vec::with_capacity(ids.len().saturating_sub(1) * ids.len() / 2);
    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            pairs.push((ids[i], ids[j]));
        }
    }

    pairs
        .par_iter()
        .filter_map(|&(a, b)| {
            if let (Some(da), Some(db)) = (digests.get(a), digests.get(b)) {
                if da == db {
                    return Some(CandidateEdge::exact(a, b));
                }
            }

            match cosine_similarity(embeddings[a].as_slice(), embeddings[b].as_slice()) {
                Ok(score) if score >= cutoff => Some(CandidateEdge::between(a, b, score)),
                Ok(_) => None,
                Err(e) => {
                    // Embeddings are validated before matching, so this only
                    // fires on a provider contract violation.
                    log::warn!("skipping pair ({a}, {b}): {e}");
                    None
                }
            }
        })
        .collect()
}
