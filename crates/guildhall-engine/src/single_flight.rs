//! Single-flight fetch control.
//!
//! Only one fetch per logical resource may be in flight; a request made
//! while one is outstanding coalesces onto it instead of issuing a
//! duplicate. The guard is an explicit state machine rather than a bare
//! flag so the deadlock safety valve is a first-class transition: a guard
//! held past the force-clear threshold is reclaimed, covering error and
//! cancellation paths that never reached `finish`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardState {
    Idle,
    Fetching { since: Instant },
}

/// Outcome of asking the guard for permission to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The caller owns the fetch and must call [`FetchGuard::finish`]
    /// once it settles.
    Started,
    /// A fetch is already in flight; rely on its result.
    Coalesced,
}

/// Single-flight guard for one logical resource.
#[derive(Debug)]
pub struct FetchGuard {
    state: Mutex<GuardState>,
    force_clear_after: Duration,
}

impl FetchGuard {
    pub const DEFAULT_FORCE_CLEAR: Duration = Duration::from_secs(10);

    pub fn new(force_clear_after: Duration) -> Self {
        Self {
            state: Mutex::new(GuardState::Idle),
            force_clear_after,
        }
    }

    /// Ask to begin a fetch at `now`.
    pub fn admit(&self, now: Instant) -> Admission {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            GuardState::Idle => {
                *state = GuardState::Fetching { since: now };
                Admission::Started
            }
            GuardState::Fetching { since }
                if now.saturating_duration_since(since) >= self.force_clear_after =>
            {
                warn!(
                    held_for = ?now.saturating_duration_since(since),
                    "fetch guard held past threshold, force-clearing"
                );
                *state = GuardState::Fetching { since: now };
                Admission::Started
            }
            GuardState::Fetching { .. } => Admission::Coalesced,
        }
    }

    /// Release after the owned fetch settles, on success or failure.
    pub fn finish(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = GuardState::Idle;
    }

    pub fn is_fetching(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            GuardState::Fetching { .. }
        )
    }
}

impl Default for FetchGuard {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FORCE_CLEAR)
    }
}

/// Monotonic generation stamps for discarding superseded fetch results.
///
/// A fetch captures the generation it started under; if the scope was
/// invalidated (or a newer fetch bumped the generation) before it
/// settled, its result must be discarded rather than overwrite newer
/// state.
#[derive(Debug, Default)]
pub struct Generation(AtomicU64);

impl Generation {
    /// Advance to a new generation and return it.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}
