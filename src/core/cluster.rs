use crate::core::similarity::CandidateEdge;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One group of videos confirmed equivalent to each other.
///
/// Invariants: `members` is sorted ascending, has at least two entries, and
/// `representative` is its minimum. Given the same validated edge set the
/// same clusters come out regardless of edge discovery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceCluster {
    pub representative: String,
    pub members: Vec<String>,
}

impl EquivalenceCluster {
    /// Rebuilds the invariants from a raw member list. Returns `None` for
    /// fewer than two members; singletons are never emitted as clusters.
    pub fn from_members(mut members: Vec<String>) -> Option<Self> {
        members.sort();
        members.dedup();
        if members.len() < 2 {
            return None;
        }
        let representative = members[0].clone();
        Some(Self {
            representative,
            members,
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.binary_search_by(|m| m.as_str().cmp(id)).is_ok()
    }
}

/// Disjoint-set forest with path compression and union by rank. Near-linear
/// merge cost over the validated edge set.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u32>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    fn union(&mut self, x: usize, y: usize) {
        let (rx, ry) = (self.find(x), self.find(y));
        if rx == ry {
            return;
        }
        if self.rank[rx] < self.rank[ry] {
            self.parent[rx] = ry;
        } else if self.rank[rx] > self.rank[ry] {
            self.parent[ry] = rx;
        } else {
            self.parent[ry] = rx;
            self.rank[rx] += 1;
        }
    }
}

/// Resolves validated edges into disjoint equivalence clusters.
///
/// Unvalidated edges are ignored; videos touched only by unvalidated edges
/// remain singletons and do not appear in the output. The representative is
/// the lexicographic minimum identifier, a total order independent of
/// insertion order, and clusters are returned sorted by representative.
pub fn build_clusters(edges: &[CandidateEdge]) -> Vec<EquivalenceCluster> {
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    for edge in edges.iter().filter(|e| e.validated) {
        for id in [edge.a.as_str(), edge.b.as_str()] {
            let next = index.len();
            index.entry(id).or_insert(next);
        }
    }

    let mut sets = UnionFind::new(index.len());
    for edge in edges.iter().filter(|e| e.validated) {
        sets.union(index[edge.a.as_str()], index[edge.b.as_str()]);
    }

    let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (id, &i) in &index {
        groups.entry(sets.find(i)).or_default().push(id.to_string());
    }

    let mut clusters: Vec<EquivalenceCluster> = groups
        .into_values()
        .filter_map(EquivalenceCluster::from_members)
        .collect();
    clusters.sort_by(|x, y| x.representative.cmp(&y.representative));
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validated(a: &str, b: &str) -> CandidateEdge {
        let mut edge = CandidateEdge::between(a, b, 1.0);
        edge.validated = true;
        edge
    }

    #[test]
    fn merges_transitively() {
        let edges = vec![validated("3", "1"), validated("3", "5"), validated("8", "9")];
        let clusters = build_clusters(&edges);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].representative, "1");
        assert_eq!(clusters[0].members, vec!["1", "3", "5"]);
        assert_eq!(clusters[1].representative, "8");
    }

    #[test]
    fn unvalidated_edges_are_ignored() {
        let edges = vec![CandidateEdge::between("1", "2", 0.999)];
        assert!(build_clusters(&edges).is_empty());
    }

    #[test]
    fn representative_is_minimum_identifier() {
        let edges = vec![validated("z", "m"), validated("m", "a")];
        let clusters = build_clusters(&edges);
        assert_eq!(clusters[0].representative, "a");
        assert_eq!(clusters[0].members.first(), Some(&"a".to_string()));
    }

    #[test]
    fn deterministic_under_edge_order() {
        let forward = vec![validated("1", "2"), validated("2", "4"), validated("6", "7")];
        let mut reversed = forward.clone();
        reversed.reverse();

        assert_eq!(build_clusters(&forward), build_clusters(&reversed));
    }

    #[test]
    fn rerunning_is_idempotent() {
        let edges = vec![validated("1", "2"), validated("4", "2")];
        let first = build_clusters(&edges);
        let second = build_clusters(&edges);
        assert_eq!(first, second);
    }

    #[test]
    fn duplicate_edges_do_not_duplicate_members() {
        let edges = vec![validated("1", "2"), validated("2", "1"), validated("1", "2")];
        let clusters = build_clusters(&edges);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec!["1", "2"]);
    }

    #[test]
    fn cluster_contains() {
        let cluster = EquivalenceCluster::from_members(vec!["2".into(), "1".into()]).unwrap();
        assert!(cluster.contains("1"));
        assert!(!cluster.contains("3"));
    }
}
