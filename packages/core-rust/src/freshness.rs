//! Freshness policies and the pure fetch planner.
//!
//! [`plan`] maps a freshness policy, the persisted metadata, and the key's
//! bookkeeping status to a [`FetchPlan`]: skip the network, revalidate
//! conditionally, or fetch unconditionally. The planner is a total pure
//! function; it never performs I/O and never suspends, so identical inputs
//! always produce identical plans.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::meta::{EntityMeta, KeyStatus};

/// How fresh a read must be before it is served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Freshness {
    /// Serve cached data when present; fetch (or revalidate) when stale
    /// or absent.
    CachedOrFetch,
    /// Serve cached data only if it is younger than the given age.
    MinAge {
        /// Maximum acceptable age of the served value.
        not_older_than: Duration,
    },
    /// Always contact the origin; never serve cached data on failure.
    MustBeFresh,
    /// Revalidate, but keep serving cached data when the origin fails.
    StaleIfError,
}

/// The planner's decision of whether and how to contact the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPlan {
    /// Cached data satisfies the policy; do not fetch.
    Skip,
    /// Fetch with revalidation hints so the origin can answer "not modified".
    Conditional {
        /// Validator from the persisted value or the last response.
        etag: Option<String>,
        /// Last modification instant of the persisted value.
        last_modified_ms: Option<u64>,
        /// How much staleness the caller tolerates on error, if bounded.
        max_stale: Option<Duration>,
    },
    /// Fetch without hints.
    Unconditional,
}

/// Inputs to [`plan`].
#[derive(Debug, Clone)]
pub struct PlanContext<'a> {
    /// Current time, epoch milliseconds.
    pub now_ms: u64,
    /// Requested freshness policy.
    pub policy: &'a Freshness,
    /// Store-level time-to-live for cached rows. `None` means cached rows
    /// never age out under [`Freshness::CachedOrFetch`].
    pub ttl: Option<Duration>,
    /// Store-level stale-if-error window, forwarded as `max_stale`.
    pub stale_if_error_window: Option<Duration>,
    /// Metadata of the persisted row, when one exists.
    pub sot_meta: Option<&'a EntityMeta>,
    /// Bookkeeping status for the key.
    pub status: &'a KeyStatus,
}

/// Decides the fetch plan for one read.
///
/// Evaluation order: an active backoff window always wins, then the policy
/// is matched against the persisted metadata. A row revalidated by the
/// origin ("not modified") counts as refreshed: effective age is measured
/// from the later of the row's `updated_at_ms` and the last fetch success.
#[must_use]
pub fn plan(ctx: &PlanContext<'_>) -> FetchPlan {
    if ctx.status.is_backing_off(ctx.now_ms) {
        return FetchPlan::Skip;
    }

    match ctx.policy {
        Freshness::CachedOrFetch => match ctx.sot_meta {
            None => FetchPlan::Unconditional,
            Some(meta) => match ctx.ttl {
                None => FetchPlan::Skip,
                Some(ttl) if effective_age_ms(ctx, meta) <= duration_ms(ttl) => {
                    FetchPlan::Skip
                }
                Some(_) => conditional(ctx, meta),
            },
        },
        Freshness::MinAge { not_older_than } => match ctx.sot_meta {
            None => FetchPlan::Unconditional,
            Some(meta) if effective_age_ms(ctx, meta) <= duration_ms(*not_older_than) => {
                FetchPlan::Skip
            }
            Some(meta) => conditional(ctx, meta),
        },
        Freshness::MustBeFresh => FetchPlan::Unconditional,
        Freshness::StaleIfError => match ctx.sot_meta {
            None => FetchPlan::Unconditional,
            Some(meta) => conditional(ctx, meta),
        },
    }
}

/// Age of the row at `now`, counting an origin revalidation as a refresh.
fn effective_age_ms(ctx: &PlanContext<'_>, meta: &EntityMeta) -> u64 {
    let refreshed_at = meta
        .updated_at_ms
        .max(ctx.status.last_success_at_ms.unwrap_or(0));
    ctx.now_ms.saturating_sub(refreshed_at)
}

/// Builds a conditional plan from whichever validators exist.
fn conditional(ctx: &PlanContext<'_>, meta: &EntityMeta) -> FetchPlan {
    let etag = meta.etag.clone().or_else(|| ctx.status.last_etag.clone());
    FetchPlan::Conditional {
        etag,
        last_modified_ms: Some(meta.updated_at_ms),
        max_stale: ctx.stale_if_error_window,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
