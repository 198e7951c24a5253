//! Per-session wall-clock timer
//!
//! One background loop per active session. Each tick computes elapsed,
//! remaining and progress (pause time excluded), calls the tick observers,
//! and pushes signals into the run queue: a `Tick` every interval, a single
//! `Warning` once progress crosses the threshold, and a single `Expired`
//! after which the loop ends.

use crate::state_machine::{ConferenceContext, ObserverError};
use futures::FutureExt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.80;

/// Snapshot computed on every tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerTick {
    pub session_index: usize,
    pub elapsed_seconds: f64,
    pub remaining_seconds: f64,
    pub total_seconds: f64,
    pub progress_ratio: f64,
}

impl TimerTick {
    fn compute(binding: TimerBinding, elapsed: Duration) -> Self {
        let elapsed_seconds = elapsed.as_secs_f64();
        let total = binding.total_seconds;
        let progress_ratio = if total > 0.0 {
            (elapsed_seconds / total).min(1.0)
        } else {
            1.0
        };
        Self {
            session_index: binding.session_index,
            elapsed_seconds,
            remaining_seconds: (total - elapsed_seconds).max(0.0),
            total_seconds: total,
            progress_ratio,
        }
    }
}

/// Timer edges delivered to the run
#[derive(Debug, Clone, PartialEq)]
pub enum TimerSignal {
    Tick(TimerTick),
    Warning { session_index: usize },
    Expired { session_index: usize },
}

/// Called from the timer task on every accounted tick
pub trait TickObserver: Send + Sync {
    fn on_tick(&self, tick: &TimerTick) -> Result<(), ObserverError>;
}

/// What the loop is counting down
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerBinding {
    pub session_index: usize,
    pub total_seconds: f64,
    pub warning_issued: bool,
}

impl TimerBinding {
    /// Bind to the context's current session, if there is one
    pub fn for_current(ctx: &ConferenceContext) -> Option<Self> {
        ctx.current_session().map(|session| Self {
            session_index: ctx.current_session_index,
            total_seconds: session.duration_seconds(),
            warning_issued: ctx.time_warning_issued,
        })
    }
}

#[derive(Debug)]
struct PauseClock {
    started_at: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl PauseClock {
    fn new(now: Instant) -> Self {
        Self {
            started_at: now,
            paused_at: None,
            paused_total: Duration::ZERO,
        }
    }

    fn pause(&mut self, now: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += now.saturating_duration_since(paused_at);
        }
    }

    /// Active elapsed time, or `None` while paused
    fn elapsed(&self, now: Instant) -> Option<Duration> {
        if self.paused_at.is_some() {
            return None;
        }
        Some(
            now.saturating_duration_since(self.started_at)
                .saturating_sub(self.paused_total),
        )
    }
}

type SharedClock = Arc<Mutex<PauseClock>>;
type TickObservers = Vec<(String, Arc<dyn TickObserver>)>;

struct ActiveLoop {
    binding: TimerBinding,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveLoop {
    /// Cancel the loop. A loop that already ended yields its join result.
    fn retire(self) -> Option<Result<(), JoinError>> {
        self.cancel.cancel();
        if self.handle.is_finished() {
            self.handle.now_or_never()
        } else {
            None
        }
    }
}

pub struct SessionTimer {
    interval: Duration,
    warning_threshold: f64,
    signals: mpsc::Sender<TimerSignal>,
    observers: TickObservers,
    clock: SharedClock,
    active: Option<ActiveLoop>,
}

impl SessionTimer {
    pub fn new(signals: mpsc::Sender<TimerSignal>) -> Self {
        Self {
            interval: TICK_INTERVAL,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            signals,
            observers: Vec::new(),
            clock: Arc::new(Mutex::new(PauseClock::new(Instant::now()))),
            active: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_warning_threshold(mut self, threshold: f64) -> Self {
        self.warning_threshold = threshold;
        self
    }

    /// Register a tick observer; takes effect on the next `start`
    pub fn subscribe(&mut self, name: impl Into<String>, observer: Arc<dyn TickObserver>) {
        self.observers.push((name.into(), observer));
    }

    /// Cancel any running loop and count down `binding` from zero
    pub fn start(&mut self, binding: TimerBinding) {
        self.stop();
        *self.lock_clock() = PauseClock::new(Instant::now());

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            binding,
            self.interval,
            self.warning_threshold,
            Arc::clone(&self.clock),
            self.observers.clone(),
            self.signals.clone(),
            cancel.clone(),
        ));
        tracing::info!(
            session_index = binding.session_index,
            total_seconds = binding.total_seconds,
            "Session timer started"
        );
        self.active = Some(ActiveLoop {
            binding,
            cancel,
            handle,
        });
    }

    /// Start unless a live loop already counts this session. Returns whether
    /// a new loop was started.
    pub fn ensure_running(&mut self, binding: TimerBinding) -> bool {
        let keep = self.active.as_ref().is_some_and(|a| {
            a.binding.session_index == binding.session_index && !a.handle.is_finished()
        });
        if keep {
            return false;
        }
        self.start(binding);
        true
    }

    pub fn pause(&self) {
        self.lock_clock().pause(Instant::now());
        tracing::debug!("Session timer paused");
    }

    pub fn resume(&self) {
        self.lock_clock().resume(Instant::now());
        tracing::debug!("Session timer resumed");
    }

    #[cfg(test)]
    pub fn is_paused(&self) -> bool {
        self.lock_clock().paused_at.is_some()
    }

    /// Cancel the running loop, if any
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            let session_index = active.binding.session_index;
            if let Some(Err(e)) = active.retire() {
                tracing::error!(session_index, error = %e, "Session timer loop died");
            }
            tracing::debug!(session_index, "Session timer stopped");
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| !a.handle.is_finished())
    }

    pub fn active_session(&self) -> Option<usize> {
        self.active.as_ref().map(|a| a.binding.session_index)
    }

    fn lock_clock(&self) -> std::sync::MutexGuard<'_, PauseClock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    binding: TimerBinding,
    interval: Duration,
    warning_threshold: f64,
    clock: SharedClock,
    observers: TickObservers,
    signals: mpsc::Sender<TimerSignal>,
    cancel: CancellationToken,
) {
    let session_index = binding.session_index;
    let mut warning_issued = binding.warning_issued;
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let elapsed = clock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed(Instant::now());
        let Some(elapsed) = elapsed else {
            continue;
        };

        let tick = TimerTick::compute(binding, elapsed);
        for (name, observer) in &observers {
            if let Err(e) = observer.on_tick(&tick) {
                tracing::warn!(observer = %name, session_index, error = %e, "Tick observer failed");
            }
        }

        let mut outgoing = vec![TimerSignal::Tick(tick)];
        if !warning_issued && tick.progress_ratio >= warning_threshold && tick.remaining_seconds > 0.0
        {
            warning_issued = true;
            tracing::info!(session_index, progress = tick.progress_ratio, "Time warning threshold reached");
            outgoing.push(TimerSignal::Warning { session_index });
        }
        let expired = tick.remaining_seconds <= 0.0;
        if expired {
            tracing::info!(session_index, "Session time expired");
            outgoing.push(TimerSignal::Expired { session_index });
        }

        for signal in outgoing {
            if signals.send(signal).await.is_err() {
                tracing::error!(session_index, "Run queue closed, session timer halted");
                return;
            }
        }

        if expired {
            return;
        }
    }
}
