//! Cache categories and invalidation matching

use std::fmt;

/// Resource category a cached query depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Identification,
    Plant,
    Family,
    Taxonomy,
    Conversation,
    Message,
    Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagScope {
    /// Every query of the kind
    All,
    /// List views of the kind
    List,
    /// One resource by id
    Id(u64),
}

/// A `(kind, scope)` pair, provided by cached queries and invalidated by
/// mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheTag {
    pub kind: TagKind,
    pub scope: TagScope,
}

impl CacheTag {
    pub const fn all(kind: TagKind) -> Self {
        Self {
            kind,
            scope: TagScope::All,
        }
    }

    pub const fn list(kind: TagKind) -> Self {
        Self {
            kind,
            scope: TagScope::List,
        }
    }

    pub const fn id(kind: TagKind, id: u64) -> Self {
        Self {
            kind,
            scope: TagScope::Id(id),
        }
    }

    /// Whether invalidating `self` makes a query that provides `provided` stale
    pub fn invalidates(&self, provided: &CacheTag) -> bool {
        if self.kind != provided.kind {
            return false;
        }
        match (self.scope, provided.scope) {
            (TagScope::All, _) | (_, TagScope::All) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            TagScope::All => write!(f, "{:?}", self.kind),
            TagScope::List => write!(f, "{:?}:LIST", self.kind),
            TagScope::Id(id) => write!(f, "{:?}:{}", self.kind, id),
        }
    }
}
