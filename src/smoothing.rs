//! Moving average over recent altitudes, used for elevation gain and loss.

use std::collections::VecDeque;

/// Samples needed before elevation gain/loss is computed
pub const MIN_WAYPOINTS_FOR_ELEVATION: usize = 5;
/// Largest allowed smoothing window
pub const MAX_WAYPOINTS_FOR_ELEVATION: usize = 20;
/// Default smoothing window
pub const DEFAULT_ALTITUDE_SMOOTHING_VALUE: usize = 13;

/// Moving-average window over recent altitude readings
///
/// Keeps a running sum so `average()` is O(1). Evicts the oldest sample
/// once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct AltitudeSmoother {
    window: VecDeque<f64>,
    capacity: usize,
    sum: f64,
    prepared: bool,
}

impl AltitudeSmoother {
    /// Create a smoother; capacity is clamped to the supported range
    pub fn new(capacity: usize) -> Self {
        let capacity = clamp_capacity(capacity);
        AltitudeSmoother {
            window: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
            prepared: false,
        }
    }

    /// Add an altitude sample
    pub fn push(&mut self, altitude: f64) {
        if self.window.len() + 1 >= MIN_WAYPOINTS_FOR_ELEVATION {
            self.prepared = true;
        }
        while self.window.len() >= self.capacity {
            if let Some(oldest) = self.window.pop_front() {
                self.sum -= oldest;
            }
        }
        self.window.push_back(altitude);
        self.sum += altitude;
    }

    /// Mean of the samples in the window (0.0 when empty)
    pub fn average(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.sum / self.window.len() as f64
    }

    /// True once enough samples have been pushed for elevation math
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the window size, evicting the oldest samples if it shrinks
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = clamp_capacity(capacity);
        while self.window.len() > self.capacity {
            if let Some(oldest) = self.window.pop_front() {
                self.sum -= oldest;
            }
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.sum = 0.0;
        self.prepared = false;
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

impl Default for AltitudeSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_ALTITUDE_SMOOTHING_VALUE)
    }
}

fn clamp_capacity(capacity: usize) -> usize {
    capacity.clamp(MIN_WAYPOINTS_FOR_ELEVATION, MAX_WAYPOINTS_FOR_ELEVATION)
}
