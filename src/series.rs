use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub at: Instant,
    pub value: f64,
}

impl Sample {
    pub fn now(value: f64) -> Self {
        Self {
            at: Instant::now(),
            value,
        }
    }
}

/// The samples shared between the telemetry reader (the only writer) and whoever consumes
/// them. Cloning hands out another handle to the same series.
///
/// The lock is only ever held for a single push or a single copy, never across I/O, so a
/// plain `std` mutex is enough even inside async tasks.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    samples: Arc<Mutex<VecDeque<Sample>>>,
    max_samples: Option<usize>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::with_retention(None)
    }

    /// Keeps at most `max_samples` samples, evicting the oldest first. `None` never evicts.
    pub fn with_retention(max_samples: Option<usize>) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::new())),
            max_samples,
        }
    }

    pub fn append(&self, sample: Sample) {
        let mut samples = self.lock();
        if let Some(max) = self.max_samples {
            while samples.len() >= max.max(1) {
                samples.pop_front();
            }
        }
        samples.push_back(sample);
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.lock().iter().copied().collect()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.lock().back().copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic elsewhere can't leave a half-written `Sample` behind, so a poisoned lock still
    // guards consistent data.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Sample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TimeSeries {
    fn default() -> Self {
        Self::new()
    }
}
