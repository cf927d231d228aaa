//! Cache keys, cached values and store-level result types

use crate::tags::{CacheTag, TagKind};
use flora_api::{
    Conversation, Family, Identification, IdentificationSummary, Message, Page, Plant,
    PlantStatus, Taxonomy, UsageSnapshot,
};
use serde::Serialize;
use std::time::Duration;

/// Full parameter tuple of a cached read.
///
/// The client-side plant search text is deliberately absent: it filters a
/// page that is already cached under its `(page, status)` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Identifications { page: u32, limit: u32 },
    Identification(u64),
    Plants { page: u32, status: Option<PlantStatus> },
    Plant(u64),
    Families { query: String, page: u32 },
    Taxonomies { family_id: Option<u64> },
    Conversation(u64),
    History { conversation_id: u64, page: u32, limit: u32 },
    Usage,
}

#[derive(Debug, Clone)]
pub enum CachedValue {
    Identifications(Page<IdentificationSummary>),
    Identification(Box<Identification>),
    Plants(Page<Plant>),
    Plant(Box<Plant>),
    Families(Page<Family>),
    Taxonomies(Vec<Taxonomy>),
    Conversation(Box<Conversation>),
    History(Page<Message>),
    Usage(Box<UsageSnapshot>),
}

impl CachedValue {
    /// Tags this value provides once stored under `key`
    pub(crate) fn provided_tags(&self, key: &QueryKey) -> Vec<CacheTag> {
        match self {
            Self::Identifications(_) => vec![CacheTag::list(TagKind::Identification)],
            Self::Identification(ident) => vec![CacheTag::id(TagKind::Identification, ident.id)],
            Self::Plants(page) => list_with_ids(TagKind::Plant, page.items.iter().map(|p| p.id)),
            Self::Plant(plant) => vec![CacheTag::id(TagKind::Plant, plant.id)],
            Self::Families(page) => {
                list_with_ids(TagKind::Family, page.items.iter().map(|f| f.id))
            }
            Self::Taxonomies(items) => list_with_ids(TagKind::Taxonomy, items.iter().map(|t| t.id)),
            Self::Conversation(conversation) => {
                let mut tags = vec![CacheTag::id(TagKind::Conversation, conversation.id)];
                tags.extend(
                    conversation
                        .messages
                        .iter()
                        .map(|m| CacheTag::id(TagKind::Message, m.id)),
                );
                tags
            }
            Self::History(page) => {
                let mut tags = list_with_ids(TagKind::Message, page.items.iter().map(|m| m.id));
                if let QueryKey::History {
                    conversation_id, ..
                } = key
                {
                    tags.push(CacheTag::id(TagKind::Conversation, *conversation_id));
                }
                tags
            }
            Self::Usage(_) => vec![CacheTag::all(TagKind::Usage)],
        }
    }
}

fn list_with_ids(kind: TagKind, ids: impl Iterator<Item = u64>) -> Vec<CacheTag> {
    std::iter::once(CacheTag::list(kind))
        .chain(ids.map(|id| CacheTag::id(kind, id)))
        .collect()
}

/// Conversion between a typed query result and its cache representation
pub trait Cacheable: Clone + Send + Sync + 'static {
    fn into_cached(self) -> CachedValue;
    fn from_cached(value: &CachedValue) -> Option<Self>;
}

macro_rules! cacheable {
    ($ty:ty, $variant:ident) => {
        impl Cacheable for $ty {
            fn into_cached(self) -> CachedValue {
                CachedValue::$variant(self)
            }

            fn from_cached(value: &CachedValue) -> Option<Self> {
                match value {
                    CachedValue::$variant(inner) => Some(inner.clone()),
                    _ => None,
                }
            }
        }
    };
    ($ty:ty, $variant:ident, boxed) => {
        impl Cacheable for $ty {
            fn into_cached(self) -> CachedValue {
                CachedValue::$variant(Box::new(self))
            }

            fn from_cached(value: &CachedValue) -> Option<Self> {
                match value {
                    CachedValue::$variant(inner) => Some((**inner).clone()),
                    _ => None,
                }
            }
        }
    };
}

cacheable!(Page<IdentificationSummary>, Identifications);
cacheable!(Identification, Identification, boxed);
cacheable!(Page<Plant>, Plants);
cacheable!(Plant, Plant, boxed);
cacheable!(Page<Family>, Families);
cacheable!(Vec<Taxonomy>, Taxonomies);
cacheable!(Conversation, Conversation, boxed);
cacheable!(Page<Message>, History);
cacheable!(UsageSnapshot, Usage, boxed);

/// Freshness of a cache slot as seen by the view layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    Missing,
    Fresh,
    /// Invalidated, the next read refetches
    Stale,
    /// The last refetch failed; the previous value is still available
    StaleWithError(String),
}

/// A query that may not be runnable yet because a parameter is missing
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    Skipped,
    Ready(T),
}

impl<T> Fetch<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Skipped => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetch<U> {
        match self {
            Self::Ready(value) => Fetch::Ready(f(value)),
            Self::Skipped => Fetch::Skipped,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Outcome of one `refetch_stale` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefetchReport {
    pub refreshed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Lifetime of the usage snapshot; catalog entries never expire on their own
    pub usage_ttl: Duration,
    pub max_capacity: u64,
}

impl StoreOptions {
    pub const DEFAULT_USAGE_TTL: Duration = Duration::from_secs(60);
    pub const DEFAULT_CAPACITY: u64 = 1000;
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            usage_ttl: Self::DEFAULT_USAGE_TTL,
            max_capacity: Self::DEFAULT_CAPACITY,
        }
    }
}
