use crate::config::PipelineConfig;
use crate::core::normalize::normalize_frame;
use crate::core::video::{Frame, VideoAsset};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AlignmentError {
    #[error(
        "videos {a} and {b}: no alignment with at least {min_overlap} overlapping frames \
         (longest possible overlap is {max_overlap})"
    )]
    OverlapTooShort {
        a: String,
        b: String,
        min_overlap: usize,
        max_overlap: usize,
    },

    #[error(
        "videos {a} and {b}: frame shapes differ ({a_rows}x{a_cols} vs {b_rows}x{b_cols})"
    )]
    FrameShapeMismatch {
        a: String,
        b: String,
        a_rows: usize,
        a_cols: usize,
        b_rows: usize,
        b_cols: usize,
    },
}

/// Outcome of one confirmed alignment attempt. Transient: consumed for the
/// validation decision and logging, never persisted in the metadata artifact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentResult {
    /// Estimated frame offset. Positive means the second video lags the
    /// first: `b[t + shift]` shows the same content as `a[t]`.
    pub shift: i64,
    /// Mean per-frame correlation across the aligned overlap.
    pub score: f64,
    /// Number of frame pairs the score was averaged over.
    pub overlap: usize,
}

/// Confirms or refutes a candidate pair independent of global intensity
/// transforms and a constant time offset.
///
/// The per-frame mean signal is taken from raw frames; per-frame
/// normalization would make every mean identically zero. The frame
/// normalizer is applied at the structural step instead, where the mean
/// product of two normalized frames is exactly their pixel correlation.
///
/// Known limitation: a constant offset and a global `a*x + b` transform are
/// the only distortions modeled. Local warps or time-varying transforms are
/// not detected.
pub fn validate_pair(
    a: &VideoAsset,
    b: &VideoAsset,
    config: &PipelineConfig,
) -> Result<AlignmentResult, AlignmentError> {
    if a.frame_rows() != b.frame_rows() || a.frame_cols() != b.frame_cols() {
        return Err(AlignmentError::FrameShapeMismatch {
            a: a.id.clone(),
            b: b.id.clone(),
            a_rows: a.frame_rows(),
            a_cols: a.frame_cols(),
            b_rows: b.frame_rows(),
            b_cols: b.frame_cols(),
        });
    }

    let signal_a = mean_signal(a);
    let signal_b = mean_signal(b);

    let Some(shift) = estimate_shift(&signal_a, &signal_b, config.min_overlap) else {
        return Err(AlignmentError::OverlapTooShort {
            a: a.id.clone(),
            b: b.id.clone(),
            min_overlap: config.min_overlap,
            max_overlap: a.frame_count().min(b.frame_count()),
        });
    };

    let (score, overlap) = aligned_score(a, b, shift, config.normalize_eps);
    Ok(AlignmentResult {
        shift,
        score,
        overlap,
    })
}

/// Per-frame mean intensity of the raw frames.
fn mean_signal(video: &VideoAsset) -> Vec<f64> {
    video.frames().iter().map(Frame::mean).collect()
}

/// Number of index pairs `(t, t + lag)` valid for both signals.
fn overlap_len(len_a: usize, len_b: usize, lag: i64) -> usize {
    let start = (-lag).max(0);
    let end = (len_a as i64).min(len_b as i64 - lag);
    (end - start).max(0) as usize
}

/// Cross-correlation over all integer lags whose overlap is admissible,
/// scored as the Pearson correlation within each overlap window.
///
/// Normalizing inside the window matters: a shifted copy carries frames
/// outside the shared content (padding, different brightness regime), and
/// any global standardization lets that portion swamp the variance and crush
/// the correlation at the true lag.
///
/// Lags are scanned outward from zero (0, +1, -1, +2, -2, ...) and only a
/// strictly greater correlation replaces the incumbent, so ties resolve to
/// the smallest absolute lag, positive before negative. Returns `None` when
/// no lag has at least `min_overlap` overlapping frames.
fn estimate_shift(a: &[f64], b: &[f64], min_overlap: usize) -> Option<i64> {
    let mut best: Option<(i64, f64)> = None;
    let max_distance = a.len().max(b.len()) as i64;

    let outward = std::iter::once(0).chain((1..max_distance).flat_map(|d| [d, -d]));
    for lag in outward {
        if overlap_len(a.len(), b.len(), lag) < min_overlap.max(1) {
            continue;
        }

        let correlation = windowed_correlation(a, b, lag);
        match best {
            Some((_, best_correlation)) if correlation <= best_correlation => {}
            _ => best = Some((lag, correlation)),
        }
    }

    best.map(|(lag, _)| lag)
}

/// Pearson correlation of the two signals restricted to the frames both
/// cover at `lag`. Constant windows correlate as 0.0 rather than dividing
/// by zero.
fn windowed_correlation(a: &[f64], b: &[f64], lag: i64) -> f64 {
    let start = (-lag).max(0);
    let end = (a.len() as i64).min(b.len() as i64 - lag);
    if end <= start {
        return 0.0;
    }
    let n = (end - start) as f64;

    let (mut sum_a, mut sum_b) = (0.0, 0.0);
    for t in start..end {
        sum_a += a[t as usize];
        sum_b += b[(t + lag) as usize];
    }
    let (mean_a, mean_b) = (sum_a / n, sum_b / n);

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for t in start..end {
        let da = a[t as usize] - mean_a;
        let db = b[(t + lag) as usize] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

/// Mean per-frame pixel correlation across the aligned overlap.
///
/// Both frames go through the frame normalizer first, so the mean of their
/// elementwise product is the Pearson correlation of the two frames and any
/// brightness/contrast offset has already cancelled.
fn aligned_score(a: &VideoAsset, b: &VideoAsset, shift: i64, eps: f64) -> (f64, usize) {
    let start = (-shift).max(0);
    let end = (a.frame_count() as i64).min(b.frame_count() as i64 - shift);
    let overlap = (end - start).max(0) as usize;
    if overlap == 0 {
        return (0.0, 0);
    }

    let total: f64 = (start..end)
        .map(|t| {
            let fa = normalize_frame(&a.frames()[t as usize], eps);
            let fb = normalize_frame(&b.frames()[(t + shift) as usize], eps);
            frame_correlation(&fa, &fb)
        })
        .sum();

    (total / overlap as f64, overlap)
}

/// Pearson correlation of two already-normalized frames.
fn frame_correlation(a: &Frame, b: &Frame) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    a.data()
        .iter()
        .zip(b.data())
        .map(|(&x, &y)| x as f64 * y as f64)
        .sum::<f64>()
        / n as f64
}
