//! Stratum Core -- keys, stable hashing, freshness planning, and the error taxonomy.
//!
//! This crate provides the pure foundation layer for the stratum store:
//!
//! - **Keys** ([`key`]): `StoreKey`, `Namespace`, deterministic `stable_hash`
//! - **Hash** ([`hash`]): 64-bit FNV-1a utilities backing the stable hash
//! - **Clock** ([`clock`]): injected time source, real and virtual
//! - **Freshness** ([`freshness`]): policies, fetch plans, the pure planner
//! - **Meta** ([`meta`]): persisted-row metadata and per-key fetch status
//! - **Errors** ([`error`]): the `StoreError` taxonomy with static retryability
//!
//! Nothing here suspends or performs I/O; the async pipelines live in
//! `stratum-store`.

pub mod clock;
pub mod error;
pub mod freshness;
pub mod hash;
pub mod key;
pub mod meta;

// Clock
pub use clock::{ClockSource, SystemClock, VirtualClock};

// Errors
pub use error::{NetworkError, PersistenceError, StoreError};

// Freshness
pub use freshness::{plan, FetchPlan, Freshness, PlanContext};

// Hash
pub use hash::{combine_hashes, fnv1a_hash_64};

// Keys
pub use key::{Namespace, StoreKey};

// Meta
pub use meta::{EntityMeta, KeyStatus};
