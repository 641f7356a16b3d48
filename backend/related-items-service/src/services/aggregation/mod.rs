// ============================================
// Candidate Relation Accumulator
// ============================================
//
// Running union-with-counts of cluster co-membership. Every ordered pair of
// distinct members of a valid cluster adds one unit of support in both
// directions, so the raw tallies are always symmetric. Merging is
// commutative and associative: iteration order never changes the counts.

use crate::models::{CandidateRelation, Cluster, ItemId};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateRelations {
    relations: HashMap<ItemId, HashMap<ItemId, u32>>,
}

impl CandidateRelations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one unit of support for every ordered pair in the cluster
    pub fn absorb_cluster(&mut self, cluster: &Cluster) {
        for &source in &cluster.members {
            let entry = self.relations.entry(source).or_default();
            for &candidate in &cluster.members {
                if candidate != source {
                    *entry.entry(candidate).or_insert(0) += 1;
                }
            }
        }
    }

    pub fn absorb<'a, I>(&mut self, clusters: I)
    where
        I: IntoIterator<Item = &'a Cluster>,
    {
        for cluster in clusters {
            self.absorb_cluster(cluster);
        }
    }

    /// Fold another tally into this one
    pub fn merge(&mut self, other: CandidateRelations) {
        for (source, candidates) in other.relations {
            let entry = self.relations.entry(source).or_default();
            for (candidate, support) in candidates {
                *entry.entry(candidate).or_insert(0) += support;
            }
        }
    }

    pub fn support(&self, source: ItemId, candidate: ItemId) -> u32 {
        self.relations
            .get(&source)
            .and_then(|c| c.get(&candidate))
            .copied()
            .unwrap_or(0)
    }

    pub fn candidates(&self, source: ItemId) -> Option<&HashMap<ItemId, u32>> {
        self.relations.get(&source)
    }

    /// Items with at least one candidate
    pub fn sources(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.relations.keys().copied()
    }

    /// Number of directed relations
    pub fn len(&self) -> usize {
        self.relations.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CandidateRelation> + '_ {
        self.relations.iter().flat_map(|(&source, candidates)| {
            candidates
                .iter()
                .map(move |(&candidate, &support)| CandidateRelation {
                    source,
                    candidate,
                    support,
                })
        })
    }
}
