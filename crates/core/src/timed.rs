//! Wall-clock timing of a single computation.

use std::time::{Duration, Instant};

/// A value together with the time it took to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedResult<T> {
    pub result: T,
    pub time: Duration,
}

impl<T> TimedResult<T> {
    /// Run `f` and record how long it took.
    pub fn time(f: impl FnOnce() -> T) -> Self {
        let start = Instant::now();
        let result = f();
        Self {
            result,
            time: start.elapsed(),
        }
    }

    pub fn seconds(&self) -> f64 {
        self.time.as_secs_f64()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TimedResult<U> {
        TimedResult {
            result: f(self.result),
            time: self.time,
        }
    }
}

impl<T, E> TimedResult<Result<T, E>> {
    /// Pull a fallible result out, keeping the timing on success.
    pub fn transpose(self) -> Result<TimedResult<T>, E> {
        let time = self.time;
        self.result.map(|result| TimedResult { result, time })
    }
}
