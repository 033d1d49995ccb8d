//! Countdown timer for timed sessions.
//!
//! The countdown runs on a tokio task. Remaining time is derived from the
//! elapsed monotonic time, so a late tick never reports a stale value.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ScheduleError;

/// Default period between two ticks.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Event emitted by a running countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Whole seconds left, rounded up.
    Tick(u32),
    Expired,
}

/// Starts countdowns with a fixed tick period.
#[derive(Debug, Clone, Copy)]
pub struct TimerService {
    tick: Duration,
}

impl Default for TimerService {
    fn default() -> Self {
        Self { tick: DEFAULT_TICK }
    }
}

impl TimerService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom tick period. A zero period falls back to [`DEFAULT_TICK`].
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = if tick.is_zero() { DEFAULT_TICK } else { tick };
        self
    }

    #[must_use]
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Start a countdown of `limit_secs` seconds on the current tokio runtime.
    ///
    /// `on_tick` receives strictly decreasing remaining seconds; `on_expire` runs
    /// once when the countdown reaches zero. Callbacks must not block or call back
    /// into the returned handle.
    ///
    /// # Errors
    ///
    /// Returns `ScheduleError::ZeroDuration` for a zero limit and
    /// `ScheduleError::NoRuntime` outside a tokio runtime.
    pub fn start<T, E>(
        &self,
        limit_secs: u32,
        on_tick: T,
        on_expire: E,
    ) -> Result<TimerHandle, ScheduleError>
    where
        T: FnMut(u32) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        if limit_secs == 0 {
            return Err(ScheduleError::ZeroDuration);
        }
        let runtime = Handle::try_current().map_err(|_| ScheduleError::NoRuntime)?;

        let gate = Arc::new(Mutex::new(true));
        let token = CancellationToken::new();
        let task = runtime.spawn(countdown(
            limit_secs,
            self.tick,
            Arc::clone(&gate),
            token.clone(),
            on_tick,
            on_expire,
        ));
        debug!(limit_secs, tick_ms = self.tick.as_millis(), "timer started");

        Ok(TimerHandle { gate, token, task })
    }
}

/// Seconds left until `deadline`, rounded up.
fn remaining_secs(deadline: Instant, now: Instant) -> u32 {
    let left = deadline.saturating_duration_since(now);
    let whole = left.as_secs() + u64::from(left.subsec_nanos() > 0);
    u32::try_from(whole).unwrap_or(u32::MAX)
}

/// Runs `callback` while the gate is open. Returns `false` once the gate is closed.
fn fire(gate: &Mutex<bool>, callback: impl FnOnce()) -> bool {
    let Ok(open) = gate.lock() else {
        return false;
    };
    if !*open {
        return false;
    }
    callback();
    true
}

async fn countdown<T, E>(
    limit_secs: u32,
    tick: Duration,
    gate: Arc<Mutex<bool>>,
    token: CancellationToken,
    mut on_tick: T,
    on_expire: E,
) where
    T: FnMut(u32) + Send + 'static,
    E: FnOnce() + Send + 'static,
{
    let started = Instant::now();
    let deadline = started + Duration::from_secs(u64::from(limit_secs));
    let mut ticks = time::interval_at(started + tick, tick);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let expiry = time::sleep_until(deadline);
    tokio::pin!(expiry);

    let mut last = limit_secs;
    loop {
        tokio::select! {
            () = token.cancelled() => return,
            () = &mut expiry => break,
            _ = ticks.tick() => {}
        }

        let remaining = remaining_secs(deadline, Instant::now());
        if remaining == 0 {
            break;
        }
        if remaining < last {
            last = remaining;
            if !fire(&gate, || on_tick(remaining)) {
                return;
            }
        }
    }

    if fire(&gate, on_expire) {
        debug!(limit_secs, "timer expired");
    }
}

/// Handle to a running countdown. Dropping it cancels the countdown.
pub struct TimerHandle {
    gate: Arc<Mutex<bool>>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Stop the countdown. Idempotent; no callback starts after this returns.
    pub fn cancel(&self) {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the countdown task has stopped, by expiry or cancellation.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
