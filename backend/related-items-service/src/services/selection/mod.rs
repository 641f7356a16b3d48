use crate::models::{ItemId, RecommendationSet};
use crate::services::aggregation::CandidateRelations;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// Bounded top-K selection over accumulated candidate relations.
///
/// Ranking: support count descending, then candidate id ascending.
#[derive(Debug, Clone, Copy)]
pub struct RecommendationSelector {
    max_recommend: usize,
}

fn rank(a: &(ItemId, u32), b: &(ItemId, u32)) -> Ordering {
    b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

impl RecommendationSelector {
    pub fn new(max_recommend: u64) -> Self {
        Self {
            max_recommend: usize::try_from(max_recommend).unwrap_or(usize::MAX),
        }
    }

    /// Top candidates for one source item
    pub fn top_candidates(&self, candidates: &HashMap<ItemId, u32>) -> Vec<ItemId> {
        if self.max_recommend == 0 {
            return Vec::new();
        }

        let mut ranked: Vec<(ItemId, u32)> = candidates.iter().map(|(&c, &s)| (c, s)).collect();
        if ranked.len() > self.max_recommend {
            ranked.select_nth_unstable_by(self.max_recommend - 1, rank);
            ranked.truncate(self.max_recommend);
        }
        ranked.sort_unstable_by(rank);

        ranked.into_iter().map(|(candidate, _)| candidate).collect()
    }

    /// Recommendations for every item that has at least one candidate
    pub fn select(&self, relations: &CandidateRelations) -> BTreeMap<ItemId, Vec<ItemId>> {
        relations
            .sources()
            .filter_map(|source| {
                relations
                    .candidates(source)
                    .map(|candidates| (source, self.top_candidates(candidates)))
            })
            .collect()
    }

    /// Recommendations for every processed item, empty lists included
    pub fn select_all<I>(&self, relations: &CandidateRelations, processed: I) -> RecommendationSet
    where
        I: IntoIterator<Item = ItemId>,
    {
        let mut set = RecommendationSet::new();
        for source in processed {
            let candidates = relations
                .candidates(source)
                .map(|candidates| self.top_candidates(candidates))
                .unwrap_or_default();
            set.insert(source, candidates);
        }

        info!(
            items = set.len(),
            with_recommendations = set.non_empty_count(),
            max_recommend = self.max_recommend,
            "Recommendation selection completed"
        );

        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cluster;

    fn relations_from(clusters: &[Vec<ItemId>]) -> CandidateRelations {
        let mut relations = CandidateRelations::new();
        for members in clusters {
            relations.absorb_cluster(&Cluster::new(members.clone()));
        }
        relations
    }

    #[test]
    fn test_ranks_by_support_then_id() {
        let candidates = HashMap::from([(5, 1), (3, 4), (9, 4), (1, 2)]);
        let selector = RecommendationSelector::new(10);
        assert_eq!(selector.top_candidates(&candidates), vec![3, 9, 1, 5]);
    }

    #[test]
    fn test_truncates_to_max_recommend() {
        let candidates: HashMap<ItemId, u32> = (0..100).map(|id| (id, (id % 10) as u32)).collect();
        let selector = RecommendationSelector::new(3);
        // support 9 belongs to ids 9, 19, 29, ...
        assert_eq!(selector.top_candidates(&candidates), vec![9, 19, 29]);
    }

    #[test]
    fn test_select_bounds_every_list() {
        let relations = relations_from(&[vec![1, 2, 3, 4, 5], vec![1, 2], vec![3, 6]]);
        let selector = RecommendationSelector::new(2);
        let selected = selector.select(&relations);

        assert_eq!(selected.len(), 6);
        for candidates in selected.values() {
            assert!(candidates.len() <= 2);
        }
        assert_eq!(selected[&1], vec![2, 3]);
    }

    #[test]
    fn test_select_all_records_empty_lists() {
        let relations = relations_from(&[vec![1, 2]]);
        let selector = RecommendationSelector::new(5);
        let set = selector.select_all(&relations, [1, 2, 7]);

        assert_eq!(set.get(1), Some(&[2][..]));
        assert_eq!(set.get(7), Some(&[][..]));
        assert_eq!(set.get(8), None);
    }
}
