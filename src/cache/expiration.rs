//! Expiration Evaluator
//!
//! Decides whether an entry is expired at a given instant. Evaluation never
//! removes anything; the store acts on the result.

use std::time::Instant;

use crate::cache::entry::CacheEntry;
use crate::cache::EvictionReason;

// == Expiration Status ==
/// Outcome of evaluating an entry's policy.
///
/// When several conditions hold at once the first matching variant wins, in
/// the order absolute, sliding, signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExpirationStatus {
    NotExpired,
    ExpiredAbsolute,
    ExpiredSliding,
    ExpiredBySignal,
}

impl ExpirationStatus {
    pub(crate) fn is_expired(self) -> bool {
        self != ExpirationStatus::NotExpired
    }

    /// Reason to record when evicting an entry in this state.
    pub(crate) fn eviction_reason(self) -> Option<EvictionReason> {
        match self {
            ExpirationStatus::NotExpired => None,
            ExpirationStatus::ExpiredAbsolute | ExpirationStatus::ExpiredSliding => {
                Some(EvictionReason::Expired)
            }
            ExpirationStatus::ExpiredBySignal => Some(EvictionReason::SignalTriggered),
        }
    }
}

// == Evaluate ==
/// Evaluates `entry` at `now`.
///
/// Boundary condition: a deadline that equals `now` counts as passed. A
/// deadline past the range of `Instant` never passes.
pub(crate) fn evaluate<K, V>(entry: &CacheEntry<K, V>, now: Instant) -> ExpirationStatus {
    let passed = |deadline: Option<Instant>| deadline.is_some_and(|deadline| now >= deadline);

    if let Some(ttl) = entry.absolute_ttl {
        if passed(entry.created_at.checked_add(ttl)) {
            return ExpirationStatus::ExpiredAbsolute;
        }
    }

    if let Some(window) = entry.sliding_window {
        if passed(entry.last_access().checked_add(window)) {
            return ExpirationStatus::ExpiredSliding;
        }
    }

    if entry.depends_on.iter().any(|signal| signal.is_fired()) {
        return ExpirationStatus::ExpiredBySignal;
    }

    ExpirationStatus::NotExpired
}
