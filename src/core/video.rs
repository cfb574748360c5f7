use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("video {id} has no valid frames")]
    EmptyVideo { id: String },

    #[error("video {id} frame {index}: data length {len} does not match {rows}x{cols}")]
    MalformedFrame {
        id: String,
        index: usize,
        rows: usize,
        cols: usize,
        len: usize,
    },

    #[error(
        "video {id} frame {index} is {rows}x{cols}, expected {expected_rows}x{expected_cols}"
    )]
    FrameShapeMismatch {
        id: String,
        index: usize,
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    #[error("duplicate video id {id} in subject {subject_id}")]
    DuplicateId { id: String, subject_id: String },
}

/// A single grayscale frame: row-major intensity grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

// Hand-written so deserialized frames pass through the same shape check as
// constructed ones.
impl<'de> Deserialize<'de> for Frame {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            rows: usize,
            cols: usize,
            data: Vec<f32>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Frame::new(raw.rows, raw.cols, raw.data)
            .ok_or_else(|| serde::de::Error::custom("frame data length does not match rows x cols"))
    }
}

impl Frame {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != rows * cols || rows == 0 || cols == 0 {
            return None;
        }
        Some(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Mean intensity over all pixels.
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&v| v as f64).sum::<f64>() / self.data.len() as f64
    }

    fn well_formed(&self) -> bool {
        self.rows > 0 && self.cols > 0 && self.data.len() == self.rows * self.cols
    }

    /// Padding frames in the source recordings are entirely NaN, so checking
    /// one pixel is enough to reject them.
    fn is_valid(&self) -> bool {
        self.data.first().is_some_and(|v| v.is_finite())
    }
}

/// One stimulus clip as ingested: stable identifier, owning subject, and an
/// ordered, immutable frame sequence.
#[derive(Debug, Clone, Serialize)]
pub struct VideoAsset {
    pub id: String,
    pub subject_id: String,
    frames: Vec<Frame>,
}

// Routed through `new()` so the non-empty and consistent-shape invariants
// hold for deserialized assets too.
impl<'de> Deserialize<'de> for VideoAsset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            id: String,
            subject_id: String,
            frames: Vec<Frame>,
        }

        let raw = Raw::deserialize(deserializer)?;
        VideoAsset::new(raw.id, raw.subject_id, raw.frames).map_err(serde::de::Error::custom)
    }
}

impl VideoAsset {
    /// Builds an asset, dropping NaN padding frames and rejecting empty or
    /// inconsistently shaped sequences.
    pub fn new(
        id: impl Into<String>,
        subject_id: impl Into<String>,
        frames: Vec<Frame>,
    ) -> Result<Self, CorpusError> {
        let id = id.into();
        let subject_id = subject_id.into();

        for (index, frame) in frames.iter().enumerate() {
            if !frame.well_formed() {
                return Err(CorpusError::MalformedFrame {
                    id,
                    index,
                    rows: frame.rows,
                    cols: frame.cols,
                    len: frame.data.len(),
                });
            }
        }

        let frames: Vec<Frame> = frames.into_iter().filter(Frame::is_valid).collect();
        let Some(first) = frames.first() else {
            return Err(CorpusError::EmptyVideo { id });
        };

        let (expected_rows, expected_cols) = (first.rows, first.cols);
        for (index, frame) in frames.iter().enumerate() {
            if frame.rows != expected_rows || frame.cols != expected_cols {
                return Err(CorpusError::FrameShapeMismatch {
                    id,
                    index,
                    rows: frame.rows,
                    cols: frame.cols,
                    expected_rows,
                    expected_cols,
                });
            }
        }

        Ok(Self {
            id,
            subject_id,
            frames,
        })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame_rows(&self) -> usize {
        self.frames[0].rows
    }

    pub fn frame_cols(&self) -> usize {
        self.frames[0].cols
    }
}
