//! Rate limiting of progress updates.
//!
//! [`Throttle`] is a pure `Idle -> Pending(deadline) -> Idle` state machine:
//! it decides whether a mutation is emitted now, deferred, or folded into an
//! already scheduled emission. [`ProgressEmitter`] pairs it with the caller's
//! callback. The coordinator owns the actual timer and calls
//! [`ProgressEmitter::fire`] when the deadline passes.

use std::time::Duration;

use tokio::time::Instant;

use super::RunState;

/// Default minimum spacing between progress emissions.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(150);

/// Caller-supplied progress callback. Receives an owned snapshot.
pub type ProgressFn = Box<dyn FnMut(RunState) + Send>;

/// What the throttle decided for a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    /// The interval has elapsed: emit immediately.
    EmitNow,
    /// A deferred emission was scheduled for the given instant.
    Scheduled(Instant),
    /// A deferred emission is already pending and will cover this mutation.
    Coalesced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Pending { deadline: Instant },
}

/// Throttle state machine.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_emit: Option<Instant>,
    phase: Phase,
}

impl Throttle {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            phase: Phase::Idle,
        }
    }

    /// The pending deferred emission, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Idle => None,
            Phase::Pending { deadline } => Some(deadline),
        }
    }

    /// Register a mutation at `now`.
    pub fn notify(&mut self, now: Instant) -> Notify {
        if let Phase::Pending { .. } = self.phase {
            return Notify::Coalesced;
        }

        match self.last_emit {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                let deadline = last + self.interval;
                self.phase = Phase::Pending { deadline };
                Notify::Scheduled(deadline)
            }
            _ => {
                self.last_emit = Some(now);
                Notify::EmitNow
            }
        }
    }

    /// Fire the deferred emission if its deadline has passed.
    ///
    /// Returns true if the caller should emit.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.phase {
            Phase::Pending { deadline } if now >= deadline => {
                self.phase = Phase::Idle;
                self.last_emit = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Record an unconditional emission, cancelling any pending one.
    pub fn force(&mut self, now: Instant) {
        self.phase = Phase::Idle;
        self.last_emit = Some(now);
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_INTERVAL)
    }
}

/// Delivers throttled [`RunState`] snapshots to a callback.
pub struct ProgressEmitter {
    throttle: Throttle,
    sink: Option<ProgressFn>,
    emissions: usize,
}

impl std::fmt::Debug for ProgressEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressEmitter")
            .field("throttle", &self.throttle)
            .field("has_sink", &self.sink.is_some())
            .field("emissions", &self.emissions)
            .finish()
    }
}

impl ProgressEmitter {
    #[must_use]
    pub fn new(interval: Duration, sink: Option<ProgressFn>) -> Self {
        Self {
            throttle: Throttle::new(interval),
            sink,
            emissions: 0,
        }
    }

    /// Deadline of the pending deferred emission.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.throttle.deadline()
    }

    /// Number of snapshots delivered so far.
    #[must_use]
    pub fn emissions(&self) -> usize {
        self.emissions
    }

    /// The state changed: emit now or schedule a deferred emission.
    pub fn notify(&mut self, state: &RunState) {
        match self.throttle.notify(Instant::now()) {
            Notify::EmitNow => self.emit(state),
            Notify::Scheduled(deadline) => {
                tracing::trace!(
                    run_id = %state.run_id,
                    in_ms = deadline.saturating_duration_since(Instant::now()).as_millis(),
                    "Progress emission deferred"
                );
            }
            Notify::Coalesced => {}
        }
    }

    /// The deferred deadline passed: emit the current state.
    pub fn fire(&mut self, state: &RunState) {
        if self.throttle.fire(Instant::now()) {
            self.emit(state);
        }
    }

    /// Emit immediately, bypassing the interval.
    pub fn force(&mut self, state: &RunState) {
        self.throttle.force(Instant::now());
        self.emit(state);
    }

    fn emit(&mut self, state: &RunState) {
        self.emissions += 1;
        if let Some(sink) = self.sink.as_mut() {
            sink(state.clone());
        }
    }
}
