//! # Training Monitors
//!
//! Monitors observe a training run and own its retry policy. The trainer
//! reports every committed step and every failure; on failure the monitor
//! answers whether the run may retry.
//!
//! ## Events
//!
//! - `log`: free-form progress messages
//! - `on_step_complete`: a step strictly improved the loss
//! - `on_step_fail`: a measurement was non-finite or a step made things
//!   worse; return `true` to permit a retry
//! - `clear`: forget any per-run state
//!
//! ## Example
//!
//! ```rust
//! use converge_optim::{CompositeMonitor, HistoryMonitor, LoggingMonitor, RetryingMonitor};
//!
//! let history = HistoryMonitor::new();
//! let records = history.records();
//! let monitor = CompositeMonitor::new()
//!     .with(LoggingMonitor::new())
//!     .with(RetryingMonitor::new(3))
//!     .with(history);
//! assert!(records.borrow().is_empty());
//! # let _ = monitor;
//! ```

use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::sample::Step;

// ============================================================================
// Monitor Trait
// ============================================================================

/// Observer and retry policy for a training run.
pub trait TrainingMonitor {
    fn log(&mut self, message: &str);

    fn on_step_complete(&mut self, step: &Step);

    /// Returns `true` to permit a retry.
    fn on_step_fail(&mut self, step: &Step) -> bool;

    fn clear(&mut self);
}

// ============================================================================
// Null Monitor
// ============================================================================

/// Ignores everything and never permits a retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMonitor;

impl TrainingMonitor for NullMonitor {
    fn log(&mut self, _message: &str) {}

    fn on_step_complete(&mut self, _step: &Step) {}

    fn on_step_fail(&mut self, _step: &Step) -> bool {
        false
    }

    fn clear(&mut self) {}
}

// ============================================================================
// Logging Monitor
// ============================================================================

/// Reports progress through `tracing`. Never permits a retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMonitor {
    /// Log every committed step at info level instead of debug
    pub verbose: bool,
}

impl LoggingMonitor {
    pub fn new() -> Self {
        Self { verbose: false }
    }

    pub fn verbose() -> Self {
        Self { verbose: true }
    }
}

impl TrainingMonitor for LoggingMonitor {
    fn log(&mut self, message: &str) {
        info!("{message}");
    }

    fn on_step_complete(&mut self, step: &Step) {
        if self.verbose {
            info!(
                iteration = step.iteration,
                mean = step.mean(),
                rate = step.point.rate,
                elapsed = ?step.time,
                "Step complete"
            );
        } else {
            debug!(iteration = step.iteration, mean = step.mean(), "Step complete");
        }
    }

    fn on_step_fail(&mut self, step: &Step) -> bool {
        warn!(iteration = step.iteration, mean = step.mean(), "Step failed");
        false
    }

    fn clear(&mut self) {}
}

// ============================================================================
// Retrying Monitor
// ============================================================================

/// Permits up to `max_retries` consecutive failures. A completed step
/// resets the count.
#[derive(Debug, Clone, Copy)]
pub struct RetryingMonitor {
    max_retries: usize,
    consecutive: usize,
}

impl RetryingMonitor {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            consecutive: 0,
        }
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive
    }
}

impl TrainingMonitor for RetryingMonitor {
    fn log(&mut self, message: &str) {
        debug!("{message}");
    }

    fn on_step_complete(&mut self, _step: &Step) {
        self.consecutive = 0;
    }

    fn on_step_fail(&mut self, step: &Step) -> bool {
        self.consecutive += 1;
        let retry = self.consecutive <= self.max_retries;
        debug!(
            iteration = step.iteration,
            attempt = self.consecutive,
            retry,
            "Retry decision"
        );
        retry
    }

    fn clear(&mut self) {
        self.consecutive = 0;
    }
}

// ============================================================================
// History Monitor
// ============================================================================

/// One committed step, as recorded for plotting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub fitness: f64,
    pub time_secs: f64,
    pub iteration: usize,
}

/// Appends a [`HistoryRecord`] per committed step to a shared sink. The
/// trainer only ever appends; callers read the sink after the run.
#[derive(Debug, Clone, Default)]
pub struct HistoryMonitor {
    records: Rc<RefCell<Vec<HistoryRecord>>>,
}

impl HistoryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record into an existing sink.
    pub fn with_sink(records: Rc<RefCell<Vec<HistoryRecord>>>) -> Self {
        Self { records }
    }

    /// Handle to the sink.
    pub fn records(&self) -> Rc<RefCell<Vec<HistoryRecord>>> {
        Rc::clone(&self.records)
    }

    /// The recorded history as JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&*self.records.borrow())
    }
}

impl TrainingMonitor for HistoryMonitor {
    fn log(&mut self, _message: &str) {}

    fn on_step_complete(&mut self, step: &Step) {
        self.records.borrow_mut().push(HistoryRecord {
            fitness: step.mean(),
            time_secs: step.time.as_secs_f64(),
            iteration: step.iteration,
        });
    }

    fn on_step_fail(&mut self, _step: &Step) -> bool {
        false
    }

    fn clear(&mut self) {
        self.records.borrow_mut().clear();
    }
}

// ============================================================================
// Sub Monitor
// ============================================================================

/// Prefixes every log message and delegates everything else.
pub struct SubMonitor<M: TrainingMonitor> {
    prefix: String,
    inner: M,
}

impl<M: TrainingMonitor> SubMonitor<M> {
    pub fn new(prefix: impl Into<String>, inner: M) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }

    pub fn into_inner(self) -> M {
        self.inner
    }
}

impl<M: TrainingMonitor> TrainingMonitor for SubMonitor<M> {
    fn log(&mut self, message: &str) {
        self.inner.log(&format!("{}{}", self.prefix, message));
    }

    fn on_step_complete(&mut self, step: &Step) {
        self.inner.on_step_complete(step);
    }

    fn on_step_fail(&mut self, step: &Step) -> bool {
        self.inner.on_step_fail(step)
    }

    fn clear(&mut self) {
        self.inner.clear();
    }
}

// ============================================================================
// Composite Monitor
// ============================================================================

/// Fans every event out to each inner monitor, in order.
///
/// `on_step_fail` reaches every monitor (so each can count the failure) and
/// permits a retry if any of them does.
#[derive(Default)]
pub struct CompositeMonitor {
    monitors: Vec<Box<dyn TrainingMonitor>>,
}

impl CompositeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, monitor: impl TrainingMonitor + 'static) -> Self {
        self.monitors.push(Box::new(monitor));
        self
    }

    pub fn push(&mut self, monitor: Box<dyn TrainingMonitor>) {
        self.monitors.push(monitor);
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}

impl TrainingMonitor for CompositeMonitor {
    fn log(&mut self, message: &str) {
        for m in &mut self.monitors {
            m.log(message);
        }
    }

    fn on_step_complete(&mut self, step: &Step) {
        for m in &mut self.monitors {
            m.on_step_complete(step);
        }
    }

    fn on_step_fail(&mut self, step: &Step) -> bool {
        let mut retry = false;
        for m in &mut self.monitors {
            retry |= m.on_step_fail(step);
        }
        retry
    }

    fn clear(&mut self) {
        for m in &mut self.monitors {
            m.clear();
        }
    }
}
