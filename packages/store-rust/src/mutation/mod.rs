//! The mutation pipeline.
//!
//! [`MutationStore`] layers create/update/delete/upsert/replace on top of a
//! [`ReadStore`](crate::read::ReadStore): optimistic local writes through
//! the per-key mutex, remote pushes with preconditions and idempotency
//! keys, provisional-to-canonical rekeying with aliasing, and tombstones
//! against stale resurrection.

pub mod alias;
pub mod outcome;
pub mod pipeline;
pub mod policy;
pub mod tombstone;

pub use alias::KeyAliasMap;
pub use outcome::{CreateResult, DeleteResult, ReplaceResult, UpdateResult, UpsertResult};
pub use pipeline::{MutationStore, RemoteClients};
pub use policy::{
    ConflictStrategy, CreatePolicy, DeletePolicy, ExistenceStrategy, IdStrategy,
    IdempotencyStrategy, ReplacePolicy, TombstonePolicy, UpdatePolicy, UpsertPolicy, WriteMode,
    DEFAULT_DEDUPE_WINDOW, DEFAULT_TOMBSTONE_TTL,
};
pub use tombstone::TombstoneMap;
