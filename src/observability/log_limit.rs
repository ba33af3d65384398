//! Error-log limiter
//!
//! Repeated service failures can produce one error line per cycle. The
//! limiter allows a fixed number of lines per period and reports how many
//! were suppressed. [`ErrorLogLimiter::unlimited`] returns a scope guard
//! that lifts the limit until it is dropped, including during unwinding.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Window {
    started: Instant,
    logged: u32,
    suppressed: u64,
}

/// Allows at most `max_per_period` error lines per `period`
#[derive(Debug)]
pub struct ErrorLogLimiter {
    max_per_period: u32,
    period: Duration,
    window: Mutex<Window>,
    unlimited_scopes: AtomicUsize,
}

impl Default for ErrorLogLimiter {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(60))
    }
}

impl ErrorLogLimiter {
    pub fn new(max_per_period: u32, period: Duration) -> Self {
        Self {
            max_per_period,
            period,
            window: Mutex::new(Window {
                started: Instant::now(),
                logged: 0,
                suppressed: 0,
            }),
            unlimited_scopes: AtomicUsize::new(0),
        }
    }

    /// Whether an error line may be written now; counts the line if so
    pub fn should_log(&self) -> bool {
        if self.is_unlimited() {
            return true;
        }

        let mut window = match self.window.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if window.started.elapsed() >= self.period {
            window.started = Instant::now();
            window.logged = 0;
        }

        if window.logged < self.max_per_period {
            window.logged += 1;
            true
        } else {
            window.suppressed += 1;
            false
        }
    }

    /// Lines dropped since the limiter was created
    pub fn suppressed(&self) -> u64 {
        match self.window.lock() {
            Ok(window) => window.suppressed,
            Err(poisoned) => poisoned.into_inner().suppressed,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.unlimited_scopes.load(Ordering::Acquire) > 0
    }

    /// Lift the limit for the lifetime of the returned scope
    pub fn unlimited(&self) -> LogLimitScope<'_> {
        self.unlimited_scopes.fetch_add(1, Ordering::AcqRel);
        LogLimitScope { limiter: self }
    }
}

/// Restores the error-log limit when dropped
#[must_use = "the limit is restored as soon as the scope is dropped"]
#[derive(Debug)]
pub struct LogLimitScope<'a> {
    limiter: &'a ErrorLogLimiter,
}

impl Drop for LogLimitScope<'_> {
    fn drop(&mut self) {
        self.limiter.unlimited_scopes.fetch_sub(1, Ordering::AcqRel);
    }
}
