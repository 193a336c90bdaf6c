//! Mutation policies.
//!
//! Every mutation verb takes a policy struct with explicit defaults. The
//! defaults favor offline-first behavior: optimistic local writes, queued
//! retry on transport failure, tombstoned deletes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::contract::Precondition;

/// Default coalescing window for repeated updates to one key.
pub const DEFAULT_DEDUPE_WINDOW: Duration = Duration::from_millis(150);

/// Default lifetime of a deletion tombstone.
pub const DEFAULT_TOMBSTONE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Whether a mutation applies locally before or after the remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Apply the optimistic local write first, then push.
    #[default]
    OfflineFirst,
    /// Push first; apply locally only once the origin confirms.
    OnlineFirst,
}

/// How to resolve a remote conflict on update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictStrategy {
    /// Refetch the server's version and report the conflict.
    #[default]
    ServerWins,
    /// Retry once against the server's current validator.
    ClientWins,
    /// Reserved; currently reports the conflict unchanged.
    Merge,
}

/// How the client identifies a created entity before the server does.
#[derive(Clone)]
pub enum IdStrategy<Draft> {
    /// Mint a random provisional id.
    ProvisionalUuid,
    /// Derive the provisional id from the draft's content.
    ContentHash(Arc<dyn Fn(&Draft) -> String + Send + Sync>),
    /// No provisional identity; the server allocates the key.
    ServerAllocated,
}

impl<Draft> fmt::Debug for IdStrategy<Draft> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProvisionalUuid => f.write_str("ProvisionalUuid"),
            Self::ContentHash(_) => f.write_str("ContentHash(..)"),
            Self::ServerAllocated => f.write_str("ServerAllocated"),
        }
    }
}

impl<Draft> Default for IdStrategy<Draft> {
    fn default() -> Self {
        Self::ProvisionalUuid
    }
}

/// How the idempotency key is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdempotencyStrategy {
    /// Derive from the provisional id (creates) or the key (upserts).
    #[default]
    Auto,
    /// Use exactly this value.
    Explicit(String),
    /// Send no idempotency key.
    None,
}

/// Whether deletes leave a tombstone behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TombstonePolicy {
    /// Mask the key for `ttl` after deletion.
    Enabled {
        /// Tombstone lifetime.
        ttl: Duration,
    },
    /// Deleted keys may reappear from stale reads immediately.
    Disabled,
}

impl Default for TombstonePolicy {
    fn default() -> Self {
        Self::Enabled {
            ttl: DEFAULT_TOMBSTONE_TTL,
        }
    }
}

/// How an upsert decides whether the entity already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistenceStrategy {
    /// Push unconditionally; the origin reports created-vs-updated.
    #[default]
    ServerDecides,
    /// Consult the local source of truth.
    CheckSot,
    /// Revalidate against the origin first.
    CheckRemote,
}

/// Policy for [`update`](crate::mutation::MutationStore::update).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePolicy {
    /// Optimistic-concurrency precondition.
    pub precondition: Precondition,
    /// Conflict resolution strategy.
    pub conflict_strategy: ConflictStrategy,
    /// Fail instead of queueing when the origin is unreachable.
    pub require_online: bool,
    /// Repeat calls for one key inside this window reuse the previous
    /// outcome instead of a second round-trip. Zero disables dedupe.
    pub dedupe_window: Duration,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self {
            precondition: Precondition::None,
            conflict_strategy: ConflictStrategy::default(),
            require_online: false,
            dedupe_window: DEFAULT_DEDUPE_WINDOW,
        }
    }
}

/// Policy for [`create`](crate::mutation::MutationStore::create).
#[derive(Debug, Clone)]
pub struct CreatePolicy<Draft> {
    /// Local-write ordering.
    pub mode: WriteMode,
    /// Provisional identity strategy.
    pub id_strategy: IdStrategy<Draft>,
    /// Idempotency key strategy.
    pub idempotency: IdempotencyStrategy,
    /// Conflict resolution strategy. Creates currently always surface
    /// conflicts as failures; the field reserves the richer behaviors.
    pub conflict_strategy: ConflictStrategy,
    /// Fail instead of keeping the local row when the origin is
    /// unreachable.
    pub require_online: bool,
}

impl<Draft> Default for CreatePolicy<Draft> {
    fn default() -> Self {
        Self {
            mode: WriteMode::default(),
            id_strategy: IdStrategy::default(),
            idempotency: IdempotencyStrategy::default(),
            conflict_strategy: ConflictStrategy::default(),
            require_online: false,
        }
    }
}

/// Policy for [`delete`](crate::mutation::MutationStore::delete).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePolicy {
    /// Local-delete ordering.
    pub mode: WriteMode,
    /// Optimistic-concurrency precondition.
    pub precondition: Precondition,
    /// Tombstone behavior.
    pub tombstone: TombstonePolicy,
    /// Also drop query keys in the entity's namespace from the memory
    /// cache.
    pub cascade_queries: bool,
    /// Fail (and restore the row) instead of queueing when the origin is
    /// unreachable.
    pub require_online: bool,
}

impl Default for DeletePolicy {
    fn default() -> Self {
        Self {
            mode: WriteMode::default(),
            precondition: Precondition::None,
            tombstone: TombstonePolicy::default(),
            cascade_queries: false,
            require_online: false,
        }
    }
}

/// Policy for [`upsert`](crate::mutation::MutationStore::upsert).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpsertPolicy {
    /// Local-write ordering.
    pub mode: WriteMode,
    /// How existence is determined.
    pub existence: ExistenceStrategy,
    /// Optimistic-concurrency precondition.
    pub precondition: Precondition,
    /// Idempotency key strategy.
    pub idempotency: IdempotencyStrategy,
    /// Fail instead of keeping the local row when the origin is
    /// unreachable.
    pub require_online: bool,
}

/// Policy for [`replace`](crate::mutation::MutationStore::replace).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplacePolicy {
    /// Local-write ordering.
    pub mode: WriteMode,
    /// Optimistic-concurrency precondition.
    pub precondition: Precondition,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_offline_first() {
        let update = UpdatePolicy::default();
        assert_eq!(update.precondition, Precondition::None);
        assert_eq!(update.conflict_strategy, ConflictStrategy::ServerWins);
        assert!(!update.require_online);
        assert_eq!(update.dedupe_window, Duration::from_millis(150));

        let create: CreatePolicy<String> = CreatePolicy::default();
        assert_eq!(create.mode, WriteMode::OfflineFirst);
        assert!(matches!(create.id_strategy, IdStrategy::ProvisionalUuid));
        assert_eq!(create.idempotency, IdempotencyStrategy::Auto);

        let delete = DeletePolicy::default();
        assert_eq!(
            delete.tombstone,
            TombstonePolicy::Enabled {
                ttl: Duration::from_secs(604_800)
            }
        );
        assert!(!delete.cascade_queries);

        let upsert = UpsertPolicy::default();
        assert_eq!(upsert.existence, ExistenceStrategy::ServerDecides);

        let replace = ReplacePolicy::default();
        assert_eq!(replace.mode, WriteMode::OfflineFirst);
    }

    #[test]
    fn content_hash_strategy_invokes_the_hasher() {
        let strategy: IdStrategy<String> =
            IdStrategy::ContentHash(Arc::new(|draft: &String| format!("h-{draft}")));
        match strategy {
            IdStrategy::ContentHash(hash) => assert_eq!(hash(&"abc".to_string()), "h-abc"),
            _ => unreachable!(),
        }
    }
}
