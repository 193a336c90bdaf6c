//! Stratum Store -- reactive read-and-mutate store core.
//!
//! Composes a remote fetcher, a durable reactive source of truth, and an
//! in-process memory cache into per-key streams of typed domain values,
//! with freshness planning, single-flight fetch coalescing, per-key write
//! serialization, stale-while-error serving, and offline-first CRUD
//! mutations with provisional-to-canonical rekeying.
//!
//! - **Contracts** ([`contract`]): the interfaces the store consumes --
//!   `SourceOfTruth`, `Fetcher`, `Converter`, `MutationEncoder`, and the
//!   four remote mutation clients
//! - **Read** ([`read`]): `ReadStore` with `stream`/`get`/`invalidate`
//! - **Mutation** ([`mutation`]): `MutationStore` with
//!   `update`/`create`/`delete`/`upsert`/`replace`
//! - **Cache** ([`cache`]): bounded TTL-aware LRU over domain values
//! - **Concurrency** ([`concurrency`]): `SingleFlight` and `KeyMutex`
//! - **Bookkeeping** ([`bookkeeping`]): per-key fetch status
//! - **Sources of truth** ([`sot`]): in-memory and closure-backed
//!   reference implementations

pub mod bookkeeping;
pub mod cache;
pub mod concurrency;
pub mod config;
pub mod contract;
pub mod mutation;
pub mod read;
pub mod sot;

// Bookkeeping
pub use bookkeeping::Bookkeeper;

// Cache
pub use cache::MemoryCache;

// Concurrency
pub use concurrency::{KeyMutex, SharedFlight, SingleFlight};

// Config
pub use config::{MutationConfig, StoreConfig};

// Contracts
pub use contract::{
    ConditionalHints, Converter, Creator, Deleter, FetchRequest, FetchUrgency, Fetcher,
    FetcherResult, FnFetcher, MutationContext, MutationEncoder, Precondition, PushOutcome,
    Putser, ReconcileFn, SourceOfTruth, TransactionBlock, Updater,
};

// Mutation pipeline
pub use mutation::{
    ConflictStrategy, CreatePolicy, CreateResult, DeletePolicy, DeleteResult, ExistenceStrategy,
    IdStrategy, IdempotencyStrategy, KeyAliasMap, MutationStore, RemoteClients, ReplacePolicy,
    ReplaceResult, TombstoneMap, TombstonePolicy, UpdatePolicy, UpdateResult, UpsertPolicy,
    UpsertResult, WriteMode,
};

// Read pipeline
pub use read::{Origin, ReadStore, StoreResult};

// Sources of truth
pub use sot::{InMemorySourceOfTruth, SimpleSourceOfTruth};
