//! Conversions between network, persistence, and domain representations.
//!
//! The store moves values through three representations: `Net` (what the
//! transport produces), `Rd`/`Wr` (what the source of truth reads and
//! writes), and `Domain` (what callers consume). The caller supplies the
//! transforms; the store only sequences them.

use stratum_core::{EntityMeta, StoreError, StoreKey};

/// Transforms between the read pipeline's representations.
///
/// Used as `Arc<dyn Converter<Domain, Rd, Net, Wr>>`.
pub trait Converter<Domain, Rd, Net, Wr>: Send + Sync {
    /// Converts a fetched network value into a persistable write.
    fn net_to_write(&self, key: &StoreKey, net: Net) -> Wr;

    /// Converts a persisted projection into a domain value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] when the projection cannot be
    /// decoded; the pipeline surfaces this without terminating healthy
    /// streams.
    fn read_to_domain(&self, key: &StoreKey, read: Rd) -> Result<Domain, StoreError>;

    /// Extracts freshness metadata from a persisted projection.
    ///
    /// `None` means the projection carries no usable metadata; the planner
    /// then treats the row as having unknown age.
    fn meta_from_read(&self, read: &Rd) -> Option<EntityMeta>;

    /// Converts a domain value into a persistable write (optimistic writes,
    /// restores).
    fn domain_to_write(&self, key: &StoreKey, value: Domain) -> Wr;

    /// Extracts freshness metadata from a network value, when the transport
    /// surfaces any.
    fn net_meta(&self, net: &Net) -> Option<EntityMeta>;
}

/// Encodes mutation payloads into their outbound network bodies.
///
/// Every encoder method may return `None`, which means "no body" -- the
/// remote client then sends a bodiless request for its verb.
///
/// Used as `Arc<dyn MutationEncoder<Domain, Patch, Draft, Net>>`.
pub trait MutationEncoder<Domain, Patch, Draft, Net>: Send + Sync {
    /// Encodes a partial update.
    fn patch_to_net(&self, key: &StoreKey, patch: &Patch) -> Option<Net>;

    /// Encodes a creation draft.
    fn draft_to_net(&self, draft: &Draft) -> Option<Net>;

    /// Encodes a full value for upsert/replace.
    fn value_to_net(&self, key: &StoreKey, value: &Domain) -> Option<Net>;

    /// Applies a patch to the current domain value for the optimistic local
    /// write. `None` disables the optimistic write for this patch.
    fn apply_patch(&self, current: Domain, patch: &Patch) -> Option<Domain>;

    /// Materializes a draft as a domain value for the optimistic local row.
    /// `None` disables the optimistic row for this draft.
    fn draft_to_domain(&self, key: &StoreKey, draft: &Draft) -> Option<Domain>;
}
