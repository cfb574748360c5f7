use crate::core::cluster::EquivalenceCluster;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// How a video ended up with its placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Matched automatically and confirmed by alignment.
    AutoValidated,
    /// Placed by a human override entry.
    ManualOverride,
    /// No confirmed equivalent.
    Singleton,
    /// Excluded from matching because its embedding was missing or invalid.
    Unembedded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub representative: String,
    /// All members of the video's cluster in ascending order, the video
    /// itself included. Singletons list only themselves.
    pub equivalents: Vec<String>,
    pub provenance: Provenance,
    pub frame_count: usize,
}

/// The per-subject metadata artifact. This is the whole downstream contract:
/// consumers read placements from here and never see embeddings, thresholds,
/// or alignment internals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedMetadata {
    pub run_id: String,
    pub subject_id: String,
    pub generated_at: String,
    pub videos: BTreeMap<String, VideoRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataSummary {
    pub total: usize,
    /// Distinct stimuli: one per cluster plus every singleton.
    pub unique: usize,
    /// Videos recorded as a repeat of some earlier representative.
    pub repeated: usize,
}

impl CombinedMetadata {
    /// Assembles the artifact from final clusters and per-video bookkeeping.
    ///
    /// `frame_counts` must cover every id in the subject; `manual_ids` marks
    /// videos a human placed, and `unembedded` the ones excluded from
    /// matching. A manual placement outranks the unembedded flag so a human
    /// can resolve exactly the videos the matcher had to skip.
    pub fn emit(
        subject_id: &str,
        clusters: &[EquivalenceCluster],
        manual_ids: &BTreeSet<String>,
        unembedded: &BTreeSet<String>,
        frame_counts: &BTreeMap<String, usize>,
    ) -> Self {
        let mut membership: BTreeMap<&str, &EquivalenceCluster> = BTreeMap::new();
        for cluster in clusters {
            for member in &cluster.members {
                membership.insert(member.as_str(), cluster);
            }
        }

        let videos = frame_counts
            .iter()
            .map(|(id, &frame_count)| {
                let record = match membership.get(id.as_str()) {
                    Some(cluster) => VideoRecord {
                        representative: cluster.representative.clone(),
                        equivalents: cluster.members.clone(),
                        provenance: if manual_ids.contains(id) {
                            Provenance::ManualOverride
                        } else {
                            Provenance::AutoValidated
                        },
                        frame_count,
                    },
                    None => VideoRecord {
                        representative: id.clone(),
                        equivalents: vec![id.clone()],
                        provenance: if manual_ids.contains(id) {
                            Provenance::ManualOverride
                        } else if unembedded.contains(id) {
                            Provenance::Unembedded
                        } else {
                            Provenance::Singleton
                        },
                        frame_count,
                    },
                };
                (id.clone(), record)
            })
            .collect();

        Self {
            run_id: format!("run_{}", Uuid::new_v4().simple()),
            subject_id: subject_id.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            videos,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn summary(&self) -> MetadataSummary {
        let total = self.videos.len();
        let unique = self
            .videos
            .values()
            .map(|r| r.representative.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        MetadataSummary {
            total,
            unique,
            repeated: total - unique,
        }
    }
}
