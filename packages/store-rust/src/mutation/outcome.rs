//! Typed results of the mutation verbs.
//!
//! Mutations never raise for ordinary failures; every verb resolves to one
//! of these variants and the caller decides what a failure means.

use stratum_core::{StoreError, StoreKey};

/// Result of a create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateResult {
    /// The row exists locally under its provisional key; the push is
    /// queued for later.
    Local {
        /// Client-assigned key of the local row.
        provisional: StoreKey,
    },
    /// The origin accepted the create.
    Synced {
        /// The entity's canonical key.
        canonical: StoreKey,
        /// The provisional key the row was moved from, when the server
        /// assigned a different identity.
        rekeyed_from: Option<StoreKey>,
    },
    /// The create failed.
    Failed {
        /// The provisional key, when one was minted.
        provisional: Option<StoreKey>,
        /// Classified cause.
        cause: StoreError,
    },
}

/// Result of an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResult {
    /// Applied locally; the push is queued for later.
    Enqueued,
    /// The origin confirmed the update.
    Synced,
    /// The update failed.
    Failed {
        /// Classified cause.
        cause: StoreError,
    },
}

/// Result of a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteResult {
    /// Deleted locally; the push is queued for later.
    Enqueued,
    /// The origin confirmed the delete.
    Synced {
        /// Whether the origin reported the entity as already gone.
        already_deleted: bool,
    },
    /// The delete failed.
    Failed {
        /// Classified cause.
        cause: StoreError,
        /// Whether the optimistically deleted row was written back.
        restored: bool,
    },
}

/// Result of an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertResult {
    /// The value exists locally; the push is queued for later.
    Local {
        /// The upserted key.
        key: StoreKey,
    },
    /// The origin confirmed the upsert.
    Synced {
        /// The upserted key.
        key: StoreKey,
        /// Whether the origin created the entity (vs updating it).
        created: bool,
    },
    /// The upsert failed.
    Failed {
        /// The upserted key.
        key: StoreKey,
        /// Classified cause.
        cause: StoreError,
    },
}

/// Result of a replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceResult {
    /// Replaced locally; the push is queued for later.
    Enqueued,
    /// The origin confirmed the replace.
    Synced,
    /// The replace failed.
    Failed {
        /// Classified cause.
        cause: StoreError,
    },
}
