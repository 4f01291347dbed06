//! # Timeout Service
//!
//! One-shot timers that raise a shared flag when they expire.
//!
//! The timer substrate (hardware timers on a microcontroller, tokio tasks on a
//! host) only ever sets the flag. The main context reads and clears it. That
//! flag is the only state shared between the two, so it is a single atomic
//! bit rather than anything lock-based.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::serial::port_trait::ChildPort;

/// Identity of a dedicated timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Quiet period before this node transmits a response
    Settle,
    /// Window for a known child to answer a relayed command
    Child(ChildPort),
    /// Window for an unknown child to say hello
    Hello,
    /// Window for the local actuator to answer an instruction
    ActuatorReply,
}

/// Edge-set, level-read expiry signal
#[derive(Debug, Clone, Default)]
pub struct TimeoutFlag(Arc<AtomicBool>);

impl TimeoutFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the flag as fired (timer side)
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Read and clear the flag in one step (main side)
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Timer peripheral capability
pub trait TimerHardware {
    /// Allow the timer to raise the flag when it expires
    fn enable_interrupt(&mut self, timer: TimerId);

    /// Start counting down `period`
    fn start(&mut self, timer: TimerId, period: Duration);

    /// Stop counting (the flag is left as it is)
    fn stop(&mut self, timer: TimerId);
}

/// Period of every dedicated timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerPeriods {
    pub settle: Duration,
    pub child_response: Duration,
    pub hello_window: Duration,
    pub actuator_reply: Duration,
}

impl TimerPeriods {
    pub fn period(&self, timer: TimerId) -> Duration {
        match timer {
            TimerId::Settle => self.settle,
            TimerId::Child(_) => self.child_response,
            TimerId::Hello => self.hello_window,
            TimerId::ActuatorReply => self.actuator_reply,
        }
    }
}

impl Default for TimerPeriods {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(1),
            child_response: Duration::from_millis(20),
            hello_window: Duration::from_millis(50),
            actuator_reply: Duration::from_millis(10),
        }
    }
}

/// Arms, disarms and observes the node's timers
///
/// At most one timer is armed at any time; arming a second one is a
/// programming error and panics.
pub struct TimeoutService<H> {
    hardware: H,
    flag: TimeoutFlag,
    periods: TimerPeriods,
    armed: Option<TimerId>,
}

impl<H: TimerHardware> TimeoutService<H> {
    /// Create a service driving `hardware`, which must raise `flag` on expiry
    pub fn new(hardware: H, flag: TimeoutFlag, periods: TimerPeriods) -> Self {
        Self {
            hardware,
            flag,
            periods,
            armed: None,
        }
    }

    /// Reset the flag and start `timer`
    ///
    /// # Panics
    ///
    /// Panics if another timer is still armed.
    pub fn arm(&mut self, timer: TimerId) {
        assert!(
            self.armed.is_none(),
            "timer {:?} armed while {:?} is still running",
            timer,
            self.armed
        );

        let period = self.periods.period(timer);
        self.flag.clear();
        self.hardware.enable_interrupt(timer);
        self.hardware.start(timer, period);
        self.armed = Some(timer);
    }

    /// Stop `timer` early
    pub fn disarm(&mut self, timer: TimerId) {
        self.hardware.stop(timer);
        if self.armed == Some(timer) {
            self.armed = None;
        }
    }

    /// Whether the flag fired since the last call; clears it
    pub fn poll_and_clear(&self) -> bool {
        self.flag.take()
    }

    pub fn armed(&self) -> Option<TimerId> {
        self.armed
    }
}

/// Host timer backed by tokio tasks
///
/// Each started timer is a task that sleeps for the period and then raises
/// the flag, which is the whole of its effect.
pub struct TokioTimer {
    handle: Handle,
    flag: TimeoutFlag,
    enabled: Vec<TimerId>,
    running: Option<(TimerId, JoinHandle<()>)>,
}

impl std::fmt::Debug for TokioTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioTimer")
            .field("enabled", &self.enabled)
            .field("running", &self.running.as_ref().map(|(timer, _)| *timer))
            .finish_non_exhaustive()
    }
}

impl TokioTimer {
    pub fn new(handle: Handle, flag: TimeoutFlag) -> Self {
        Self {
            handle,
            flag,
            enabled: Vec::new(),
            running: None,
        }
    }

    fn cancel(&mut self) {
        if let Some((_, task)) = self.running.take() {
            task.abort();
        }
    }
}

impl TimerHardware for TokioTimer {
    fn enable_interrupt(&mut self, timer: TimerId) {
        if !self.enabled.contains(&timer) {
            self.enabled.push(timer);
        }
    }

    fn start(&mut self, timer: TimerId, period: Duration) {
        self.cancel();

        if !self.enabled.contains(&timer) {
            warn!("Timer {:?} started without its interrupt enabled", timer);
            return;
        }

        let flag = self.flag.clone();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(period).await;
            flag.raise();
        });
        debug!("Timer {:?} started ({:?})", timer, period);
        self.running = Some((timer, task));
    }

    fn stop(&mut self, timer: TimerId) {
        if matches!(self.running, Some((running, _)) if running == timer) {
            self.cancel();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
