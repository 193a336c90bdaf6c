//! Typed contracts the store consumes from its caller.
//!
//! The pipelines in this crate are generic over these interfaces: a durable
//! reactive [`SourceOfTruth`], a remote [`Fetcher`], a [`Converter`] between
//! representations, a [`MutationEncoder`] for outbound bodies, and one
//! remote client per mutation verb.

pub mod converter;
pub mod fetcher;
pub mod remote;
pub mod source_of_truth;

pub use converter::{Converter, MutationEncoder};
pub use fetcher::{
    ConditionalHints, FetchRequest, FetchUrgency, Fetcher, FetcherResult, FnFetcher,
};
pub use remote::{Creator, Deleter, MutationContext, Precondition, PushOutcome, Putser, Updater};
pub use source_of_truth::{ReconcileFn, SourceOfTruth, TransactionBlock};
