//! Per-key concurrency primitives.
//!
//! [`SingleFlight`] coalesces concurrent fetches for one key onto a single
//! shared task; [`KeyMutex`] serializes writes to the source of truth for
//! one key. Both keep bounded registries so long-lived stores do not grow
//! without limit.

pub mod key_mutex;
pub mod single_flight;

pub use key_mutex::KeyMutex;
pub use single_flight::{SharedFlight, SingleFlight};
