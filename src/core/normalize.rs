use crate::core::video::Frame;

/// Normalizes a frame to zero mean and unit variance, independently of every
/// other frame. Brightness shifts and contrast scaling cancel out here, so
/// they can never contribute to a dissimilarity score downstream.
///
/// `eps` is added to the standard deviation before dividing, which leaves a
/// constant frame as all zeros instead of dividing by zero.
pub fn normalize_frame(frame: &Frame, eps: f64) -> Frame {
    let mean = frame.mean();
    let variance = frame
        .data()
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / frame.len() as f64;
    let denom = variance.sqrt() + eps;

    let data = frame
        .data()
        .iter()
        .map(|&v| ((v as f64 - mean) / denom) as f32)
        .collect();

    // Shape is preserved, so reconstruction cannot fail.
    Frame::new(frame.rows(), frame.cols(), data).unwrap_or_else(|| frame.clone())
}
