//! Single-use start barrier for N workers + 1 controller.
//!
//! # Semantics
//!
//! - Every party calls [`StartBarrier::arrive_and_wait`] and blocks until the
//!   last party arrives.
//! - The last arrival flips the barrier to `Released` and wakes every waiter
//!   with one `notify_all` while holding the lock. A waiter can only observe
//!   `Waiting` (keep sleeping) or `Released`; there is no partial release.
//! - The barrier releases exactly once. Arriving after the release, or
//!   arriving more times than there are parties, is a precondition violation
//!   and returns [`BarrierError::AlreadyReleased`]. A new run needs a new
//!   barrier.
//! - [`StartBarrier::abort`] wakes every waiter with [`BarrierError::Aborted`].
//!   The controller uses it to tear down workers when setup fails before the
//!   release.
//!
//! # Arrival count
//!
//! The count lives inside the mutex, so "incremented" and "released" are
//! published together. `arrived()` is a snapshot for diagnostics only.

use std::sync::{Condvar, Mutex, MutexGuard};

use thiserror::Error;

/// Failure of a barrier operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum BarrierError {
    /// The barrier was aborted before every party arrived.
    #[error("aborted before all parties arrived")]
    Aborted,
    /// The barrier already released; it cannot be reused.
    #[error("already released; a barrier is single-use")]
    AlreadyReleased,
}

/// How a successful wait ended for this party.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Arrival {
    /// True for the party whose arrival completed the quorum.
    pub is_leader: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Waiting,
    Released,
    Aborted,
}

#[derive(Debug)]
struct BarrierInner {
    arrived: usize,
    phase: Phase,
}

/// Rendezvous point shared by the controller and every worker.
#[derive(Debug)]
pub struct StartBarrier {
    parties: usize,
    inner: Mutex<BarrierInner>,
    cv: Condvar,
}

impl StartBarrier {
    /// Creates a barrier for `parties` participants.
    ///
    /// # Panics
    ///
    /// Panics if `parties == 0`; a barrier nobody can release is a bug.
    pub fn new(parties: usize) -> Self {
        assert!(parties > 0, "barrier needs at least one party");
        Self {
            parties,
            inner: Mutex::new(BarrierInner {
                arrived: 0,
                phase: Phase::Waiting,
            }),
            cv: Condvar::new(),
        }
    }

    /// Total parties required for release.
    #[inline]
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Parties that have arrived so far.
    pub fn arrived(&self) -> usize {
        self.lock().arrived
    }

    /// True once the single release has happened.
    pub fn is_released(&self) -> bool {
        self.lock().phase == Phase::Released
    }

    /// Arrives and blocks until every party is present.
    pub fn arrive_and_wait(&self) -> Result<Arrival, BarrierError> {
        self.arrive_and_wait_then(|| {})
    }

    /// Like [`arrive_and_wait`](Self::arrive_and_wait), but the releasing
    /// party runs `on_release` under the barrier lock before anyone wakes.
    ///
    /// Whatever `on_release` records therefore happens-before every party's
    /// return from the wait. Non-leaders drop the closure unused.
    pub fn arrive_and_wait_then<F: FnOnce()>(&self, on_release: F) -> Result<Arrival, BarrierError> {
        let mut inner = self.lock();
        match inner.phase {
            Phase::Released => return Err(BarrierError::AlreadyReleased),
            Phase::Aborted => return Err(BarrierError::Aborted),
            Phase::Waiting => {}
        }

        inner.arrived += 1;
        debug_assert!(inner.arrived <= self.parties);

        if inner.arrived == self.parties {
            inner.phase = Phase::Released;
            on_release();
            self.cv.notify_all();
            return Ok(Arrival { is_leader: true });
        }

        while inner.phase == Phase::Waiting {
            inner = self
                .cv
                .wait(inner)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }

        match inner.phase {
            Phase::Released => Ok(Arrival { is_leader: false }),
            _ => Err(BarrierError::Aborted),
        }
    }

    /// Wakes all waiters with `Aborted`. No effect after release.
    ///
    /// Returns `true` if this call aborted the barrier.
    pub fn abort(&self) -> bool {
        let mut inner = self.lock();
        if inner.phase != Phase::Waiting {
            return false;
        }
        inner.phase = Phase::Aborted;
        self.cv.notify_all();
        true
    }

    // Poisoning only happens if `on_release` panics; the state it guards is
    // still consistent (phase is set before the callback runs).
    fn lock(&self) -> MutexGuard<'_, BarrierInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}
