//! Frame-rate smoothing.
//!
//! Instantaneous rates are derived from the time between consecutive
//! frames and averaged over a short history, which is what the status
//! line and the video writer see.

use std::collections::VecDeque;
use std::time::Instant;

/// Moving average of frame rates over the last `window` frames.
pub struct FpsSmoother {
    history: VecDeque<f64>,
    window: usize,
    /// Arrival time of the previous frame.
    previous: Option<Instant>,
}

impl FpsSmoother {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            history: VecDeque::with_capacity(window + 1),
            window,
            previous: None,
        }
    }

    /// Adds an instantaneous rate and returns the smoothed rate.
    pub fn push(&mut self, fps: f64) -> f64 {
        self.history.push_back(fps);
        if self.history.len() > self.window {
            self.history.pop_front();
        }
        self.smoothed()
    }

    /// Records a frame arrival and returns the smoothed rate.
    ///
    /// The first arrival only primes the smoother. Arrivals with no
    /// measurable gap are not counted.
    pub fn tick(&mut self, at: Instant) -> f64 {
        let previous = self.previous.replace(at);
        match previous {
            Some(prev) => {
                let dt = at.saturating_duration_since(prev).as_secs_f64();
                if dt > 0.0 {
                    self.push(1.0 / dt)
                } else {
                    self.smoothed()
                }
            }
            None => self.smoothed(),
        }
    }

    /// Arithmetic mean of the history, 0 when empty.
    pub fn smoothed(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().sum::<f64>() / self.history.len() as f64
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.previous = None;
    }

    /// Returns true once a frame has been seen.
    pub fn is_primed(&self) -> bool {
        self.previous.is_some()
    }
}

impl Default for FpsSmoother {
    fn default() -> Self {
        Self::new(5)
    }
}
