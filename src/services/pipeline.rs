use crate::config::PipelineConfig;
use crate::core::alignment::{validate_pair, AlignmentError};
use crate::core::cluster::build_clusters;
use crate::core::digest::frame_digest;
use crate::core::embedding::{validate_embedding, Embedding, EmbeddingProvider};
use crate::core::metadata::CombinedMetadata;
use crate::core::overrides::{ManualOverrideTable, OverrideError};
use crate::core::similarity::find_candidates;
use crate::core::video::{CorpusError, VideoAsset};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("override error: {0}")]
    Override(#[from] OverrideError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineProgress {
    pub processed: usize,
    pub total: usize,
    pub current: String,
    pub phase: PipelinePhase,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PipelinePhase {
    Embedding,
    Matching,
    Validation,
    Clustering,
    Complete,
}

/// Non-fatal conditions surfaced alongside the metadata. The run keeps going;
/// these exist so a skipped video is visible instead of silently absent from
/// every cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PipelineWarning {
    Unembedded { id: String, reason: String },
    PairSkipped { a: String, b: String, reason: String },
    OverrideSkipped { id: String, target: String },
}

/// Everything one subject run produced.
#[derive(Debug)]
pub struct SubjectReport {
    pub subject_id: String,
    pub metadata: CombinedMetadata,
    pub warnings: Vec<PipelineWarning>,
    pub candidate_count: usize,
    pub validated_count: usize,
}

/// Runs the full dedup sequence for one subject: embed, match, validate,
/// cluster, emit. Videos are compared only within their subject; the same
/// stimulus shown to different subjects is not deduplicated across them.
pub struct SubjectPipeline {
    config: PipelineConfig,
    provider: Arc<dyn EmbeddingProvider>,
    overrides: ManualOverrideTable,
    progress_sender: Option<mpsc::UnboundedSender<PipelineProgress>>,
}

impl SubjectPipeline {
    pub fn new(config: PipelineConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            config,
            provider,
            overrides: ManualOverrideTable::default(),
            progress_sender: None,
        }
    }

    pub fn with_overrides(mut self, overrides: ManualOverrideTable) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_progress_sender(mut self, sender: mpsc::UnboundedSender<PipelineProgress>) -> Self {
        self.progress_sender = Some(sender);
        self
    }

    pub fn run(&self, subject_id: &str, videos: &[VideoAsset]) -> Result<SubjectReport, PipelineError> {
        let mut seen = BTreeSet::new();
        for video in videos {
            if !seen.insert(video.id.as_str()) {
                return Err(CorpusError::DuplicateId {
                    id: video.id.clone(),
                    subject_id: subject_id.to_string(),
                }
                .into());
            }
        }

        let by_id: BTreeMap<&str, &VideoAsset> =
            videos.iter().map(|v| (v.id.as_str(), v)).collect();
        let known_ids: BTreeSet<String> = by_id.keys().map(|id| id.to_string()).collect();
        let frame_counts: BTreeMap<String, usize> = videos
            .iter()
            .map(|v| (v.id.clone(), v.frame_count()))
            .collect();

        let mut warnings = Vec::new();

        // Phase 1: embed every video, setting aside the ones the provider or
        // validation rejects.
        self.send_progress(PipelineProgress {
            processed: 0,
            total: videos.len(),
            current: "Embedding videos...".to_string(),
            phase: PipelinePhase::Embedding,
        });

        let embedded_count = AtomicUsize::new(0);
        let embed_results: Vec<(String, Result<Embedding, String>)> = videos
            .par_iter()
            .map(|video| {
                let result = self
                    .provider
                    .embed(video)
                    .map_err(|e| e.to_string())
                    .and_then(|embedding| {
                        validate_embedding(&video.id, &embedding, self.provider.dimension())
                            .map_err(|e| e.to_string())?;
                        Ok(embedding)
                    });

                let processed = embedded_count.fetch_add(1, Ordering::Relaxed) + 1;
                self.send_progress(PipelineProgress {
                    processed,
                    total: videos.len(),
                    current: video.id.clone(),
                    phase: PipelinePhase::Embedding,
                });

                (video.id.clone(), result)
            })
            .collect();

        let mut embeddings: BTreeMap<String, Embedding> = BTreeMap::new();
        let mut unembedded: BTreeSet<String> = BTreeSet::new();
        for (id, result) in embed_results {
            match result {
                Ok(embedding) => {
                    embeddings.insert(id, embedding);
                }
                Err(reason) => {
                    log::warn!("subject {subject_id}: excluding video {id} from matching: {reason}");
                    unembedded.insert(id.clone());
                    warnings.push(PipelineWarning::Unembedded { id, reason });
                }
            }
        }

        // Phase 2: pairwise candidate generation, with a digest fast path for
        // bit-identical content.
        self.send_progress(PipelineProgress {
            processed: 0,
            total: 0,
            current: "Matching embeddings...".to_string(),
            phase: PipelinePhase::Matching,
        });

        let digests: BTreeMap<String, String> = embeddings
            .keys()
            .collect::<Vec<_>>()
            .par_iter()
            .map(|id| (id.to_string(), frame_digest(by_id[id.as_str()])))
            .collect();

        let edges = find_candidates(&embeddings, &digests, &self.config);
        let candidate_count = edges.len();

        // Phase 3: alignment confirms or refutes each remaining candidate.
        let pending = edges.iter().filter(|e| !e.validated).count();
        self.send_progress(PipelineProgress {
            processed: 0,
            total: pending,
            current: "Validating candidate pairs...".to_string(),
            phase: PipelinePhase::Validation,
        });

        let validated_count = AtomicUsize::new(0);
        let validation: Vec<_> = edges
            .into_par_iter()
            .map(|mut edge| {
                if edge.validated {
                    return (edge, None);
                }

                let warning = match validate_pair(by_id[edge.a.as_str()], by_id[edge.b.as_str()], &self.config) {
                    Ok(result) => {
                        edge.validated = result.score >= self.config.confirmation_threshold;
                        log::debug!(
                            "subject {subject_id}: pair ({}, {}) shift {} score {:.4} overlap {}",
                            edge.a,
                            edge.b,
                            result.shift,
                            result.score,
                            result.overlap
                        );
                        None
                    }
                    Err(e @ AlignmentError::OverlapTooShort { .. }) => {
                        log::info!("subject {subject_id}: {e}");
                        None
                    }
                    Err(e @ AlignmentError::FrameShapeMismatch { .. }) => {
                        log::warn!("subject {subject_id}: {e}");
                        Some(PipelineWarning::PairSkipped {
                            a: edge.a.clone(),
                            b: edge.b.clone(),
                            reason: e.to_string(),
                        })
                    }
                };

                let processed = validated_count.fetch_add(1, Ordering::Relaxed) + 1;
                self.send_progress(PipelineProgress {
                    processed,
                    total: pending,
                    current: format!("{} vs {}", edge.a, edge.b),
                    phase: PipelinePhase::Validation,
                });

                (edge, warning)
            })
            .collect();

        let mut edges = Vec::with_capacity(validation.len());
        for (edge, warning) in validation {
            edges.push(edge);
            warnings.extend(warning);
        }
        let validated_total = edges.iter().filter(|e| e.validated).count();

        // Phase 4: clustering and manual placement.
        self.send_progress(PipelineProgress {
            processed: 0,
            total: 0,
            current: "Clustering validated pairs...".to_string(),
            phase: PipelinePhase::Clustering,
        });

        let clusters = build_clusters(&edges);
        let outcome = self.overrides.apply(clusters, &known_ids);
        for (id, target) in outcome.skipped {
            log::warn!(
                "subject {subject_id}: override for {id} skipped, target {target} not in subject"
            );
            warnings.push(PipelineWarning::OverrideSkipped { id, target });
        }

        let metadata = CombinedMetadata::emit(
            subject_id,
            &outcome.clusters,
            &outcome.manual_ids,
            &unembedded,
            &frame_counts,
        );

        self.send_progress(PipelineProgress {
            processed: pending,
            total: pending,
            current: "Complete".to_string(),
            phase: PipelinePhase::Complete,
        });

        Ok(SubjectReport {
            subject_id: subject_id.to_string(),
            metadata,
            warnings,
            candidate_count,
            validated_count: validated_total,
        })
    }

    /// Runs every subject in the corpus, one independent run per subject.
    /// Reports come back sorted by subject id.
    pub fn run_all(
        &self,
        corpus: &BTreeMap<String, Vec<VideoAsset>>,
    ) -> Result<Vec<SubjectReport>, PipelineError> {
        let mut reports = corpus
            .par_iter()
            .map(|(subject_id, videos)| self.run(subject_id, videos))
            .collect::<Result<Vec<_>, _>>()?;
        reports.sort_by(|x, y| x.subject_id.cmp(&y.subject_id));
        Ok(reports)
    }

    fn send_progress(&self, progress: PipelineProgress) {
        if let Some(sender) = &self.progress_sender {
            let _ = sender.send(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::embedding::{EmbeddingError, MeanPoolProvider};
    use crate::core::metadata::Provenance;
    use crate::core::overrides::{ForcedDecision, ManualOverrideEntry};
    use crate::core::video::Frame;

    fn patterned_frame(t: usize, rows: usize, cols: usize) -> Frame {
        let data = (0..rows * cols)
            .map(|i| {
                let r = i / cols;
                let c = i % cols;
                ((t * 31 + r * 7 + c * 13) % 17) as f32 + ((t * 11 + i) % 5) as f32 * 0.25
            })
            .collect();
        Frame::new(rows, cols, data).unwrap()
    }

    fn patterned_video(id: &str, subject: &str, frame_count: usize) -> VideoAsset {
        let frames = (0..frame_count).map(|t| patterned_frame(t, 6, 8)).collect();
        VideoAsset::new(id, subject, frames).unwrap()
    }

    fn scaled_copy(id: &str, original: &VideoAsset, a: f32, b: f32) -> VideoAsset {
        let frames = original
            .frames()
            .iter()
            .map(|f| Frame::new(f.rows(), f.cols(), f.data().iter().map(|&v| a * v + b).collect()).unwrap())
            .collect();
        VideoAsset::new(id, original.subject_id.as_str(), frames).unwrap()
    }

    fn noise_video(id: &str, subject: &str, frame_count: usize, mut state: u64) -> VideoAsset {
        let frames = (0..frame_count)
            .map(|_| {
                let data = (0..48)
                    .map(|_| {
                        state = state
                            .wrapping_mul(6364136223846793005)
                            .wrapping_add(1442695040888963407);
                        ((state >> 33) % 1000) as f32 / 1000.0
                    })
                    .collect();
                Frame::new(6, 8, data).unwrap()
            })
            .collect();
        VideoAsset::new(id, subject, frames).unwrap()
    }

    fn pipeline() -> SubjectPipeline {
        SubjectPipeline::new(
            PipelineConfig::default(),
            Arc::new(MeanPoolProvider::new(16)),
        )
    }

    struct FailingProvider;

    impl EmbeddingProvider for FailingProvider {
        fn dimension(&self) -> usize {
            16
        }

        fn embed(&self, video: &VideoAsset) -> Result<Embedding, EmbeddingError> {
            Err(EmbeddingError::Provider {
                id: video.id.clone(),
                message: "model unavailable".to_string(),
            })
        }
    }

    #[test]
    fn clusters_intensity_scaled_copy_and_leaves_noise_alone() {
        let original = patterned_video("1", "m1", 30);
        let copy = scaled_copy("2", &original, 2.0, 5.0);
        let noise = noise_video("3", "m1", 30, 42);

        let report = pipeline().run("m1", &[original, copy, noise]).unwrap();

        let r1 = &report.metadata.videos["1"];
        assert_eq!(r1.equivalents, vec!["1", "2"]);
        assert_eq!(r1.provenance, Provenance::AutoValidated);
        assert_eq!(report.metadata.videos["2"].representative, "1");
        assert_eq!(report.metadata.videos["3"].provenance, Provenance::Singleton);
        assert!(report.validated_count >= 1);
    }

    #[test]
    fn bit_identical_videos_validate_via_digest() {
        let a = patterned_video("1", "m1", 20);
        let b = patterned_video("2", "m1", 20);

        let report = pipeline().run("m1", &[a, b]).unwrap();
        assert_eq!(report.metadata.videos["2"].representative, "1");
        assert_eq!(report.validated_count, 1);
    }

    #[test]
    fn manual_override_places_a_video_the_matcher_missed() {
        let original = patterned_video("1", "m1", 30);
        let copy = scaled_copy("2", &original, 2.0, 5.0);
        let noise = noise_video("3", "m1", 30, 42);

        let overrides = ManualOverrideTable::from_entries(vec![ManualOverrideEntry {
            id: "3".to_string(),
            decision: ForcedDecision::MergeWith("1".to_string()),
        }])
        .unwrap();

        let report = pipeline()
            .with_overrides(overrides)
            .run("m1", &[original, copy, noise])
            .unwrap();

        let r3 = &report.metadata.videos["3"];
        assert_eq!(r3.representative, "1");
        assert_eq!(r3.equivalents, vec!["1", "2", "3"]);
        assert_eq!(r3.provenance, Provenance::ManualOverride);
        assert_eq!(
            report.metadata.videos["1"].provenance,
            Provenance::AutoValidated
        );
    }

    #[test]
    fn override_with_missing_target_is_a_warning_not_an_error() {
        let overrides = ManualOverrideTable::from_entries(vec![ManualOverrideEntry {
            id: "1".to_string(),
            decision: ForcedDecision::MergeWith("99".to_string()),
        }])
        .unwrap();

        let report = pipeline()
            .with_overrides(overrides)
            .run("m1", &[patterned_video("1", "m1", 20)])
            .unwrap();

        assert_eq!(report.metadata.videos["1"].provenance, Provenance::Singleton);
        assert!(matches!(
            report.warnings.as_slice(),
            [PipelineWarning::OverrideSkipped { id, target }] if id == "1" && target == "99"
        ));
    }

    #[test]
    fn provider_failure_marks_videos_unembedded() {
        let pipeline =
            SubjectPipeline::new(PipelineConfig::default(), Arc::new(FailingProvider));
        let report = pipeline
            .run("m1", &[patterned_video("1", "m1", 20)])
            .unwrap();

        assert_eq!(report.metadata.videos["1"].provenance, Provenance::Unembedded);
        assert!(matches!(
            report.warnings.as_slice(),
            [PipelineWarning::Unembedded { id, .. }] if id == "1"
        ));
        assert_eq!(report.candidate_count, 0);
    }

    #[test]
    fn duplicate_ids_are_fatal() {
        let err = pipeline()
            .run(
                "m1",
                &[patterned_video("1", "m1", 20), patterned_video("1", "m1", 20)],
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::Corpus(CorpusError::DuplicateId { .. })));
    }

    #[test]
    fn progress_covers_all_phases() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let original = patterned_video("1", "m1", 30);
        let copy = scaled_copy("2", &original, 1.5, 2.0);

        pipeline()
            .with_progress_sender(tx)
            .run("m1", &[original, copy])
            .unwrap();

        let mut phases = BTreeSet::new();
        while let Ok(progress) = rx.try_recv() {
            phases.insert(format!("{:?}", progress.phase));
        }
        for phase in ["Embedding", "Matching", "Validation", "Clustering", "Complete"] {
            assert!(phases.contains(phase), "missing phase {phase}");
        }
    }

    #[test]
    fn run_all_processes_subjects_independently() {
        let mut corpus = BTreeMap::new();
        let original = patterned_video("1", "m1", 25);
        corpus.insert(
            "m1".to_string(),
            vec![original.clone(), scaled_copy("2", &original, 2.0, 1.0)],
        );
        corpus.insert(
            "m2".to_string(),
            vec![noise_video("1", "m2", 25, 7), noise_video("2", "m2", 25, 99)],
        );

        let reports = pipeline().run_all(&corpus).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].subject_id, "m1");
        assert_eq!(reports[0].metadata.summary().repeated, 1);
        assert_eq!(reports[1].subject_id, "m2");
        assert_eq!(reports[1].metadata.summary().repeated, 0);
    }
}
