//! Remote mutation clients, one per verb.
//!
//! The store classifies each verb's outcome into [`PushOutcome`] and never
//! interprets preconditions or idempotency keys itself; both are carried
//! opaquely to the transport.

use std::time::Duration;

use async_trait::async_trait;
use stratum_core::{StoreError, StoreKey};

use super::fetcher::FetchUrgency;

/// Optimistic-concurrency precondition attached to a mutation.
///
/// Preserved with exact semantics (if-match, if-none-match, numeric
/// version); the transport decides how to express them on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Precondition {
    /// No precondition.
    #[default]
    None,
    /// Apply only if the current validator matches.
    IfMatch(String),
    /// Apply only if the current validator does not match.
    IfNoneMatch(String),
    /// Apply only at this numeric version.
    Version(u64),
}

/// Opaque per-mutation context handed to remote clients.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MutationContext {
    /// Precondition to enforce remotely.
    pub precondition: Precondition,
    /// Idempotency key (header or payload metadata; transport's choice).
    pub idempotency_key: Option<String>,
    /// Transport priority hint.
    pub urgency: FetchUrgency,
}

/// Classified outcome of one remote mutation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome<Net> {
    /// The mutation was applied.
    Success {
        /// Canonical value echoed by the origin, if any.
        echo: Option<Net>,
        /// Server-assigned key, when it differs from the request key.
        canonical_key: Option<StoreKey>,
        /// Validator of the new server state.
        etag: Option<String>,
        /// Whether the origin reports having created the entity.
        created: bool,
    },
    /// The origin reports the state already matches (no-op).
    NotModified,
    /// A precondition failed or a concurrent writer won.
    Conflict {
        /// Validator of the current server state, if disclosed.
        server_tag: Option<String>,
    },
    /// The call failed.
    Failure {
        /// Classified cause.
        cause: StoreError,
        /// Origin-provided wait hint, if any.
        retry_after: Option<Duration>,
    },
}

impl<Net> PushOutcome<Net> {
    /// Builds a plain success with no echo, no rekey, no validator.
    #[must_use]
    pub fn applied() -> Self {
        Self::Success {
            echo: None,
            canonical_key: None,
            etag: None,
            created: false,
        }
    }
}

/// Remote client for partial updates (PATCH in spirit).
#[async_trait]
pub trait Updater<Net>: Send + Sync {
    /// Pushes a partial update for `key`.
    async fn update(
        &self,
        key: &StoreKey,
        body: Option<Net>,
        ctx: &MutationContext,
    ) -> PushOutcome<Net>;
}

/// Remote client for creations (POST in spirit).
#[async_trait]
pub trait Creator<Net>: Send + Sync {
    /// Pushes a creation. `provisional` is the client-assigned key, absent
    /// when the server allocates identity.
    async fn create(
        &self,
        provisional: Option<&StoreKey>,
        body: Option<Net>,
        ctx: &MutationContext,
    ) -> PushOutcome<Net>;
}

/// Remote client for deletions (DELETE in spirit).
#[async_trait]
pub trait Deleter<Net>: Send + Sync {
    /// Pushes a deletion of `key`.
    async fn delete(&self, key: &StoreKey, ctx: &MutationContext) -> PushOutcome<Net>;
}

/// Remote client for full-value writes (PUT in spirit).
#[async_trait]
pub trait Putser<Net>: Send + Sync {
    /// Pushes a full value under `key`.
    async fn put(
        &self,
        key: &StoreKey,
        body: Option<Net>,
        ctx: &MutationContext,
    ) -> PushOutcome<Net>;
}
