//! Counts consecutive rounds without some tracked behaviour.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::ContextInjectionMiddleware;

#[derive(Debug)]
struct Counter {
    count: usize,
    threshold: usize,
    warning: String,
}

/// Once `threshold` rounds pass without the behaviour, the warning is queued
/// on the injector every round until [`track`](Self::track)`(true)` or
/// [`reset`](Self::reset).
#[derive(Debug)]
pub struct RoundCounter {
    inner: Mutex<Counter>,
    injector: Option<Arc<ContextInjectionMiddleware>>,
}

impl RoundCounter {
    pub fn new(
        threshold: usize,
        injector: Option<Arc<ContextInjectionMiddleware>>,
        warning: impl Into<String>,
    ) -> Self {
        Self {
            inner: Mutex::new(Counter {
                count: 0,
                threshold,
                warning: warning.into(),
            }),
            injector,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counter> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one round.
    pub fn track(&self, used: bool) {
        let mut counter = self.lock();
        if used {
            counter.count = 0;
            return;
        }
        counter.count += 1;
        if counter.count >= counter.threshold && !counter.warning.is_empty() {
            if let Some(injector) = &self.injector {
                tracing::debug!(rounds = counter.count, "Round threshold reached");
                injector.ensure_block(counter.warning.clone());
            }
        }
    }

    pub fn count(&self) -> usize {
        self.lock().count
    }

    pub fn reset(&self) {
        self.lock().count = 0;
    }

    pub fn set_threshold(&self, threshold: usize) {
        self.lock().threshold = threshold;
    }

    pub fn set_warning_message(&self, warning: impl Into<String>) {
        self.lock().warning = warning.into();
    }
}
