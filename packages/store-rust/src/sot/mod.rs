//! Reference implementations of the [`SourceOfTruth`](crate::contract::SourceOfTruth) contract.
//!
//! [`InMemorySourceOfTruth`] keeps rows in per-key watch channels; it backs
//! tests and cache-only stores. [`SimpleSourceOfTruth`] wraps caller
//! `read`/`write`/`delete` closures and layers change notification on top
//! so readers stay reactive.

pub mod memory;
pub mod simple;

pub use memory::InMemorySourceOfTruth;
pub use simple::SimpleSourceOfTruth;
