use crate::core::cluster::EquivalenceCluster;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OverrideError {
    #[error("duplicate override entry for video {id}")]
    DuplicateEntry { id: String },

    #[error("override for video {id} merges it with itself")]
    SelfReference { id: String },

    #[error("override for video {id} targets {target}, which is itself overridden")]
    TargetOverridden { id: String, target: String },

    #[error("failed to parse override table: {0}")]
    Json(#[from] serde_json::Error),
}

/// A human-assigned placement for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedDecision {
    /// The video stands alone, even if automatic clustering merged it.
    Singleton,
    /// The video joins the cluster containing the named target.
    MergeWith(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualOverrideEntry {
    pub id: String,
    pub decision: ForcedDecision,
}

/// Everything `ManualOverrideTable::apply` produced: the adjusted clusters,
/// the ids that were manually placed, and entries skipped because their
/// merge target is not part of this subject.
#[derive(Debug)]
pub struct OverrideOutcome {
    pub clusters: Vec<EquivalenceCluster>,
    pub manual_ids: BTreeSet<String>,
    pub skipped: Vec<(String, String)>,
}

/// Human-authored placements, loaded once per run and read-only afterwards.
///
/// Exists because the automatic pipeline is known to leave some matches
/// genuinely ambiguous until visual inspection. Conflicts are rejected at
/// construction, before any clustering runs: silently picking an order
/// between incompatible entries would make the metadata non-reproducible.
#[derive(Debug, Clone, Default)]
pub struct ManualOverrideTable {
    entries: BTreeMap<String, ForcedDecision>,
}

impl ManualOverrideTable {
    pub fn from_entries(entries: Vec<ManualOverrideEntry>) -> Result<Self, OverrideError> {
        let mut table = BTreeMap::new();
        for entry in entries {
            if let ForcedDecision::MergeWith(target) = &entry.decision {
                if *target == entry.id {
                    return Err(OverrideError::SelfReference { id: entry.id });
                }
            }
            if table.insert(entry.id.clone(), entry.decision).is_some() {
                return Err(OverrideError::DuplicateEntry { id: entry.id });
            }
        }

        for (id, decision) in &table {
            if let ForcedDecision::MergeWith(target) = decision {
                if table.contains_key(target) {
                    return Err(OverrideError::TargetOverridden {
                        id: id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        Ok(Self { entries: table })
    }

    /// Parses a JSON array of entries, e.g.
    /// `[{"id": "17", "decision": {"merge_with": "3"}},
    ///   {"id": "21", "decision": "singleton"}]`.
    pub fn from_json_str(json: &str) -> Result<Self, OverrideError> {
        let entries: Vec<ManualOverrideEntry> = serde_json::from_str(json)?;
        Self::from_entries(entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Applies the table on top of automatic clusters. Always wins: listed
    /// ids are pulled out of whatever cluster the pipeline formed, then
    /// placed per the human decision. Representatives are recomputed from
    /// final membership, and groups reduced below two members dissolve back
    /// into singletons.
    ///
    /// The table may span subjects; entries whose id does not occur in
    /// `known_ids` are ignored, and merge entries whose target is missing
    /// are reported in `skipped` and leave the automatic placement of their
    /// id untouched.
    pub fn apply(
        &self,
        clusters: Vec<EquivalenceCluster>,
        known_ids: &BTreeSet<String>,
    ) -> OverrideOutcome {
        let mut skipped = Vec::new();
        let mut manual_ids = BTreeSet::new();

        // An entry may only evict its id from the automatic clusters once it
        // is confirmed applicable; a skipped entry must not disturb them.
        let mut applicable: Vec<(&String, &ForcedDecision)> = Vec::new();
        for (id, decision) in self.entries.iter().filter(|(id, _)| known_ids.contains(*id)) {
            if let ForcedDecision::MergeWith(target) = decision {
                if !known_ids.contains(target) {
                    skipped.push((id.clone(), target.clone()));
                    continue;
                }
            }
            applicable.push((id, decision));
        }

        let overridden: BTreeSet<&str> = applicable.iter().map(|(id, _)| id.as_str()).collect();
        let mut groups: Vec<Vec<String>> = clusters
            .into_iter()
            .map(|c| {
                c.members
                    .into_iter()
                    .filter(|m| !overridden.contains(m.as_str()))
                    .collect()
            })
            .collect();

        for (id, decision) in applicable {
            manual_ids.insert(id.clone());
            if let ForcedDecision::MergeWith(target) = decision {
                match groups.iter_mut().find(|g| g.iter().any(|m| m == target)) {
                    Some(group) => group.push(id.clone()),
                    None => groups.push(vec![target.clone(), id.clone()]),
                }
            }
        }

        let mut clusters: Vec<EquivalenceCluster> = groups
            .into_iter()
            .filter_map(EquivalenceCluster::from_members)
            .collect();
        clusters.sort_by(|x, y| x.representative.cmp(&y.representative));

        OverrideOutcome {
            clusters,
            manual_ids,
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(members: &[&str]) -> EquivalenceCluster {
        EquivalenceCluster::from_members(members.iter().map(|m| m.to_string()).collect()).unwrap()
    }

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn merge(id: &str, target: &str) -> ManualOverrideEntry {
        ManualOverrideEntry {
            id: id.to_string(),
            decision: ForcedDecision::MergeWith(target.to_string()),
        }
    }

    fn singleton(id: &str) -> ManualOverrideEntry {
        ManualOverrideEntry {
            id: id.to_string(),
            decision: ForcedDecision::Singleton,
        }
    }

    #[test]
    fn duplicate_entries_are_a_fatal_conflict() {
        let err =
            ManualOverrideTable::from_entries(vec![singleton("7"), merge("7", "3")]).unwrap_err();
        assert!(matches!(err, OverrideError::DuplicateEntry { .. }));
    }

    #[test]
    fn self_referential_merge_is_rejected() {
        let err = ManualOverrideTable::from_entries(vec![merge("7", "7")]).unwrap_err();
        assert!(matches!(err, OverrideError::SelfReference { .. }));
    }

    #[test]
    fn overridden_merge_target_is_a_fatal_conflict() {
        // "join 3's cluster" is ambiguous when 3 itself is being moved.
        let err = ManualOverrideTable::from_entries(vec![merge("7", "3"), singleton("3")])
            .unwrap_err();
        assert!(matches!(err, OverrideError::TargetOverridden { .. }));
    }

    #[test]
    fn forced_singleton_splits_a_cluster() {
        let table = ManualOverrideTable::from_entries(vec![singleton("2")]).unwrap();
        let outcome = table.apply(
            vec![cluster(&["1", "2", "3"])],
            &ids(&["1", "2", "3"]),
        );

        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.clusters[0].members, vec!["1", "3"]);
        assert!(outcome.manual_ids.contains("2"));
    }

    #[test]
    fn splitting_a_pair_dissolves_the_cluster() {
        let table = ManualOverrideTable::from_entries(vec![singleton("2")]).unwrap();
        let outcome = table.apply(vec![cluster(&["1", "2"])], &ids(&["1", "2"]));
        assert!(outcome.clusters.is_empty());
    }

    #[test]
    fn merge_joins_an_existing_cluster() {
        let table = ManualOverrideTable::from_entries(vec![merge("9", "1")]).unwrap();
        let outcome = table.apply(vec![cluster(&["1", "2"])], &ids(&["1", "2", "9"]));

        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.clusters[0].members, vec!["1", "2", "9"]);
        assert_eq!(outcome.clusters[0].representative, "1");
    }

    #[test]
    fn merge_with_a_singleton_forms_a_new_cluster() {
        let table = ManualOverrideTable::from_entries(vec![merge("9", "4")]).unwrap();
        let outcome = table.apply(vec![], &ids(&["4", "9"]));

        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.clusters[0].members, vec!["4", "9"]);
    }

    #[test]
    fn representative_is_recomputed_after_override() {
        let table = ManualOverrideTable::from_entries(vec![merge("0", "5")]).unwrap();
        let outcome = table.apply(vec![cluster(&["5", "7"])], &ids(&["0", "5", "7"]));
        assert_eq!(outcome.clusters[0].representative, "0");
    }

    #[test]
    fn entries_for_other_subjects_are_ignored() {
        let table = ManualOverrideTable::from_entries(vec![singleton("99")]).unwrap();
        let outcome = table.apply(vec![cluster(&["1", "2"])], &ids(&["1", "2"]));
        assert_eq!(outcome.clusters[0].members, vec!["1", "2"]);
        assert!(outcome.manual_ids.is_empty());
    }

    #[test]
    fn missing_merge_target_is_reported_not_applied() {
        let table = ManualOverrideTable::from_entries(vec![merge("1", "99")]).unwrap();
        let outcome = table.apply(vec![], &ids(&["1", "2"]));
        assert!(outcome.clusters.is_empty());
        assert_eq!(outcome.skipped, vec![("1".to_string(), "99".to_string())]);
    }

    #[test]
    fn skipped_entry_leaves_automatic_cluster_intact() {
        // "1" is clustered automatically; its merge target is not part of
        // this subject, so the entry must neither apply nor evict "1".
        let table = ManualOverrideTable::from_entries(vec![merge("1", "99")]).unwrap();
        let outcome = table.apply(vec![cluster(&["1", "2"])], &ids(&["1", "2"]));

        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.clusters[0].members, vec!["1", "2"]);
        assert!(outcome.manual_ids.is_empty());
        assert_eq!(outcome.skipped, vec![("1".to_string(), "99".to_string())]);
    }

    #[test]
    fn json_round_trip() {
        let json = r#"[
            {"id": "17", "decision": {"merge_with": "3"}},
            {"id": "21", "decision": "singleton"}
        ]"#;
        let table = ManualOverrideTable::from_json_str(json).unwrap();
        assert_eq!(table.len(), 2);
    }
}
