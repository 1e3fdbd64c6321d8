//! # Iterative Trainer
//!
//! The optimization loop. Each outer iteration samples the loss surface
//! (reseeding stochastic state); each inner iteration orients, line
//! searches along the chosen direction and decides what to do with the
//! result.
//!
//! ## Decisions
//!
//! | Outcome of the line search | Action |
//! |----------------------------|--------|
//! | mean strictly lower | commit, `on_step_complete` |
//! | mean exactly equal | reset to the zero-step point, continue |
//! | mean higher or non-finite | `on_step_fail`; retry re-samples, veto ends the run as `Failed` |
//!
//! ## Example
//!
//! ```rust
//! use converge_core::Tensor;
//! use converge_layers::{DagNetwork, Dense, MeanSqLoss};
//! use converge_optim::{BasicTrainable, IterativeTrainer, NullMonitor, TrainerConfig};
//!
//! let mut net = DagNetwork::new("fit", 2);
//! let x = net.input(0).unwrap();
//! let t = net.input(1).unwrap();
//! let y = net.add(Dense::new(1, 1), &[x]).unwrap();
//! let loss = net.add(MeanSqLoss::new(), &[y, t]).unwrap();
//! net.set_output(loss).unwrap();
//!
//! let data = (1..=4)
//!     .map(|i| vec![Tensor::vector(vec![i as f64]), Tensor::vector(vec![3.0 * i as f64])])
//!     .collect();
//! let result = IterativeTrainer::new(BasicTrainable::new(net, data))
//!     .with_monitor(NullMonitor)
//!     .with_config(TrainerConfig::new().with_max_iterations(50).with_terminate_threshold(1e-12))
//!     .run()
//!     .unwrap();
//! assert!(result.final_mean <= 1e-12);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TrainerConfig;
use crate::cursor::{FailsafeCursor, SimpleCursor};
use crate::error::OptimError;
use crate::line_search::LineSearch;
use crate::monitor::{LoggingMonitor, TrainingMonitor};
use crate::orientation::Orientation;
use crate::sample::{PointSample, Step};
use crate::trainable::Trainable;

/// Builds the line search for a direction tag the first time it is seen.
pub type LineSearchFactory = Box<dyn Fn(&str) -> LineSearch>;

/// Why a run stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminationCause {
    /// Threshold reached or iteration budget spent
    Completed,
    Timeout,
    /// A step failed and the monitor refused to retry
    Failed,
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationCause::Completed => "completed",
            TerminationCause::Timeout => "timeout",
            TerminationCause::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of [`IterativeTrainer::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingResult {
    pub final_mean: f64,
    pub termination_cause: TerminationCause,
    /// Line-search iterations attempted
    pub iterations: usize,
    /// Steps committed
    pub history_len: usize,
    pub elapsed: Duration,
}

/// Counters for one run.
struct RunState {
    started: Instant,
    iteration: usize,
    history_len: usize,
    retries: usize,
}

/// Drives a [`Trainable`] downhill.
pub struct IterativeTrainer {
    trainable: Box<dyn Trainable>,
    monitor: Box<dyn TrainingMonitor>,
    orientation: Orientation,
    factory: LineSearchFactory,
    line_searches: HashMap<String, LineSearch>,
    config: TrainerConfig,
}

impl IterativeTrainer {
    /// L-BFGS with an Armijo-Wolfe search per tag, reporting to a
    /// [`LoggingMonitor`].
    pub fn new(trainable: impl Trainable + 'static) -> Self {
        Self {
            trainable: Box::new(trainable),
            monitor: Box::new(LoggingMonitor::new()),
            orientation: Orientation::lbfgs(),
            factory: Box::new(|_| LineSearch::default()),
            line_searches: HashMap::new(),
            config: TrainerConfig::default(),
        }
    }

    pub fn with_monitor(mut self, monitor: impl TrainingMonitor + 'static) -> Self {
        self.monitor = Box::new(monitor);
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Replaces the factory and drops any cached line searches.
    pub fn with_line_search_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str) -> LineSearch + 'static,
    {
        self.factory = Box::new(factory);
        self.line_searches.clear();
        self
    }

    pub fn with_config(mut self, config: TrainerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn trainable(&self) -> &dyn Trainable {
        self.trainable.as_ref()
    }

    pub fn into_trainable(self) -> Box<dyn Trainable> {
        self.trainable
    }

    /// Run until a bound is hit or the monitor gives up.
    ///
    /// Stochastic state is cleared on every exit, including errors.
    pub fn run(&mut self) -> Result<TrainingResult, OptimError> {
        let outcome = self.train();
        self.trainable.clear_noise();
        outcome
    }

    fn train(&mut self) -> Result<TrainingResult, OptimError> {
        let mut run = RunState {
            started: Instant::now(),
            iteration: 0,
            history_len: 0,
            retries: 0,
        };
        let deadline = run.started + self.config.timeout;
        let max_iterations = self.config.max_iterations.unwrap_or(usize::MAX);
        let threshold = self.config.terminate_threshold;
        let per_sample = self.config.iterations_per_sample.max(1);
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        self.monitor.clear();
        self.orientation.reset();
        let mut current = self.sample(&mut rng, &mut run)?;
        info!(
            orientation = self.orientation.tag(),
            mean = current.mean(),
            "Training started"
        );

        let cause = 'outer: loop {
            if Instant::now() >= deadline {
                break TerminationCause::Timeout;
            }
            if current.mean() <= threshold || run.iteration >= max_iterations {
                break TerminationCause::Completed;
            }

            for _ in 0..per_sample {
                if Instant::now() >= deadline {
                    break 'outer TerminationCause::Timeout;
                }
                if current.mean() <= threshold || run.iteration >= max_iterations {
                    break 'outer TerminationCause::Completed;
                }
                run.iteration += 1;
                let iteration_start = Instant::now();

                let direction = self.orientation.orient(&current, self.monitor.as_mut())?;
                let tag = direction.direction_type.clone();
                let origin = direction.origin.clone();
                let factory = &self.factory;
                let search = self
                    .line_searches
                    .entry(tag.clone())
                    .or_insert_with(|| factory(&tag));

                let mut cursor =
                    FailsafeCursor::new(SimpleCursor::new(self.trainable.as_mut(), direction));
                search.step(&mut cursor, self.monitor.as_mut())?;
                let next = cursor.finish(self.monitor.as_mut())?.point;

                let previous = current.mean();
                let mean = next.mean();
                let elapsed = iteration_start.elapsed();

                if mean < previous {
                    debug!(
                        iteration = run.iteration,
                        tag = %tag,
                        rate = next.rate,
                        previous,
                        mean,
                        elapsed = ?elapsed,
                        "Iteration committed"
                    );
                    let step = Step::new(next.clone(), run.iteration, run.started.elapsed());
                    self.monitor.on_step_complete(&step);
                    current = next;
                    run.history_len += 1;
                    run.retries = 0;
                } else if mean == previous {
                    self.monitor.log(&format!(
                        "Iteration {}: {tag} step left the loss at {mean:e}; resetting to the zero-step point",
                        run.iteration
                    ));
                    origin.weights.restore(self.trainable.layer_mut())?;
                } else {
                    warn!(
                        iteration = run.iteration,
                        tag = %tag,
                        previous,
                        mean,
                        elapsed = ?elapsed,
                        "Iteration failed to improve"
                    );
                    current.weights.restore(self.trainable.layer_mut())?;
                    let step = Step::new(next, run.iteration, run.started.elapsed());
                    if !self.monitor.on_step_fail(&step) {
                        break 'outer TerminationCause::Failed;
                    }
                    self.count_retry(&mut run)?;
                    self.monitor.log(&format!(
                        "Iteration {}: retrying from a fresh sample",
                        run.iteration
                    ));
                    current = self.sample(&mut rng, &mut run)?;
                    continue 'outer;
                }
            }

            current = self.sample(&mut rng, &mut run)?;
        };

        let result = TrainingResult {
            final_mean: current.mean(),
            termination_cause: cause,
            iterations: run.iteration,
            history_len: run.history_len,
            elapsed: run.started.elapsed(),
        };
        info!(
            cause = %result.termination_cause,
            final_mean = result.final_mean,
            iterations = result.iterations,
            committed = result.history_len,
            elapsed = ?result.elapsed,
            "Training finished"
        );
        Ok(result)
    }

    /// Reseed and measure until the sample is finite, consulting the
    /// monitor on every non-finite measurement.
    fn sample(&mut self, rng: &mut StdRng, run: &mut RunState) -> Result<PointSample, OptimError> {
        loop {
            if self.trainable.reseed(rng.gen()) {
                debug!("Loss surface changed; resetting orientation");
                self.orientation.reset();
            }
            let point = self.trainable.measure(self.monitor.as_mut())?;
            if point.is_finite() {
                return Ok(point);
            }

            let mean = point.mean();
            let step = Step::new(point, run.iteration, run.started.elapsed());
            if !self.monitor.on_step_fail(&step) {
                warn!(mean, "Non-finite measurement; monitor refused to retry");
                return Err(OptimError::Stopped { mean });
            }
            self.count_retry(run)?;
            warn!(mean, attempt = run.retries, "Non-finite measurement; retrying");
        }
    }

    fn count_retry(&self, run: &mut RunState) -> Result<(), OptimError> {
        run.retries += 1;
        if run.retries > self.config.max_retries {
            return Err(OptimError::RetryBudgetExhausted {
                attempts: run.retries,
            });
        }
        Ok(())
    }
}
