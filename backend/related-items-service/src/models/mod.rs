use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Item identifier as read from the record source
pub type ItemId = u64;

/// Presence-only attribute of an item
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Feature {
    Id(u64),
    Token(String),
}

impl Feature {
    /// Byte encoding fed to the hash functions.
    ///
    /// The leading tag keeps `Id(5)` and `Token("5")` apart.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.clear();
        match self {
            Feature::Id(id) => {
                buf.push(0);
                buf.extend_from_slice(&id.to_le_bytes());
            }
            Feature::Token(token) => {
                buf.push(1);
                buf.extend_from_slice(token.as_bytes());
            }
        }
    }
}

impl From<u64> for Feature {
    fn from(id: u64) -> Self {
        Feature::Id(id)
    }
}

impl From<&str> for Feature {
    fn from(token: &str) -> Self {
        Feature::Token(token.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub features: BTreeSet<Feature>,
}

impl Item {
    pub fn new<I, F>(id: ItemId, features: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Feature>,
    {
        Self {
            id,
            features: features.into_iter().map(Into::into).collect(),
        }
    }
}

/// Per-iteration hash seed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashSeed(pub u64);

impl fmt::Display for HashSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered per-level minhash values of one item under one seed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(pub Vec<u64>);

impl Signature {
    /// Signature assigned to items without features
    pub fn sentinel(depth: usize) -> Self {
        Signature(vec![u64::MAX; depth])
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

/// Items sharing one signature within one iteration, members sorted ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub members: Vec<ItemId>,
}

impl Cluster {
    pub fn new(mut members: Vec<ItemId>) -> Self {
        members.sort_unstable();
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Directed co-occurrence tally between two items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRelation {
    pub source: ItemId,
    pub candidate: ItemId,
    pub support: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub source: ItemId,
    pub candidates: Vec<ItemId>,
}

/// Final output of a run.
///
/// Every processed item has an entry; an empty list means "processed, nothing
/// to recommend" while a missing entry means the item was never part of the input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationSet {
    by_item: BTreeMap<ItemId, Vec<ItemId>>,
}

impl RecommendationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: ItemId, candidates: Vec<ItemId>) {
        self.by_item.insert(source, candidates);
    }

    pub fn get(&self, source: ItemId) -> Option<&[ItemId]> {
        self.by_item.get(&source).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.by_item.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_item.is_empty()
    }

    /// Number of items with at least one recommendation
    pub fn non_empty_count(&self) -> usize {
        self.by_item.values().filter(|c| !c.is_empty()).count()
    }

    /// Entries in ascending source order
    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &[ItemId])> {
        self.by_item.iter().map(|(id, c)| (*id, c.as_slice()))
    }

    pub fn into_recommendations(self) -> Vec<Recommendation> {
        self.by_item
            .into_iter()
            .map(|(source, candidates)| Recommendation { source, candidates })
            .collect()
    }
}

/// Everything a run publishes, written to the sink in one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArtifact {
    /// Identity of the run input, used to key the seed log
    pub run_key: String,
    pub recommendations: RecommendationSet,
    pub seeds: Vec<HashSeed>,
}
