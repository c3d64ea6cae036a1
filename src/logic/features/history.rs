//! Time-Series Context - Rolling/lag statistics per sensor stream
//!
//! Two modes:
//! - **Tracked**: caller keeps a `SensorHistory` per (device, sensor) and
//!   supplies true rolling statistics (batch/offline, or a stateful feed).
//! - **Approximated**: single-sample real-time mode. The current value is
//!   repeated for every mean/lag, variances are zero. This is a known
//!   degradation and is flagged on the detection result.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::layout::{LAG_OFFSETS, ROLLING_WINDOWS};

/// Largest window we ever need to look back over
pub const HISTORY_CAPACITY: usize = 30;

/// Streams tracked at once by a serving engine
pub const MAX_TRACKED_STREAMS: usize = 10_000;

/// Denominator guard for the z-score
const Z_SCORE_EPSILON: f64 = 1e-6;

// ============================================================================
// CONTEXT
// ============================================================================

/// Engineered time-series features for one reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesContext {
    /// Means over windows 5, 10, 30
    pub rolling_mean: [f64; 3],
    /// Sample std (ddof = 1) over windows 5, 10, 30
    pub rolling_std: [f64; 3],
    /// Values 1, 5, 10 samples back
    pub lags: [f64; 3],
    pub rate_of_change: f64,
    pub z_score: f64,
    /// True when built without real history
    #[serde(default)]
    pub approximated: bool,
}

impl TimeSeriesContext {
    /// Real-time approximation: no history available
    pub fn approximate(value: f64) -> Self {
        Self {
            rolling_mean: [value; 3],
            rolling_std: [0.0; 3],
            lags: [value; 3],
            rate_of_change: 0.0,
            z_score: 0.0,
            approximated: true,
        }
    }
}

// ============================================================================
// SENSOR HISTORY
// ============================================================================

/// Bounded history of one (device, sensor) stream
#[derive(Debug, Clone, Default)]
pub struct SensorHistory {
    values: VecDeque<f64>,
    /// First value ever seen; lags before enough history back-fill with it
    first: Option<f64>,
}

impl SensorHistory {
    pub fn new() -> Self {
        Self {
            values: VecDeque::with_capacity(HISTORY_CAPACITY),
            first: None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append a value and return the context describing it
    pub fn observe(&mut self, value: f64) -> TimeSeriesContext {
        let previous = self.values.back().copied();

        self.values.push_back(value);
        while self.values.len() > HISTORY_CAPACITY {
            self.values.pop_front();
        }
        let first = *self.first.get_or_insert(value);

        let mut rolling_mean = [0.0; 3];
        let mut rolling_std = [0.0; 3];
        for (i, window) in ROLLING_WINDOWS.iter().enumerate() {
            let (mean, std) = self.window_stats(*window);
            rolling_mean[i] = mean;
            rolling_std[i] = std;
        }

        let mut lags = [first; 3];
        let last = self.values.len() - 1;
        for (i, offset) in LAG_OFFSETS.iter().enumerate() {
            if last >= *offset {
                lags[i] = self.values[last - offset];
            }
        }

        let rate_of_change = match previous {
            Some(prev) if prev != 0.0 => {
                let rate = (value - prev) / prev;
                if rate.is_finite() { rate } else { 0.0 }
            }
            _ => 0.0,
        };

        let z_score = (value - rolling_mean[2]) / (rolling_std[2] + Z_SCORE_EPSILON);

        TimeSeriesContext {
            rolling_mean,
            rolling_std,
            lags,
            rate_of_change,
            z_score: if z_score.is_finite() { z_score } else { 0.0 },
            approximated: false,
        }
    }

    /// Context for `value` as if it were observed, leaving the buffer untouched
    pub fn preview(&self, value: f64) -> TimeSeriesContext {
        self.clone().observe(value)
    }

    /// Mean and sample std of the trailing `window` values (min_periods = 1)
    fn window_stats(&self, window: usize) -> (f64, f64) {
        let n = window.min(self.values.len());
        if n == 0 {
            return (0.0, 0.0);
        }
        let tail = self.values.iter().skip(self.values.len() - n);
        let mean = tail.clone().sum::<f64>() / n as f64;
        if n < 2 {
            return (mean, 0.0);
        }
        let var = tail.map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        (mean, var.sqrt())
    }
}

// ============================================================================
// STREAM HISTORIES
// ============================================================================

/// History buffers for many streams, keyed by (device_id, sensor_name).
///
/// At most `max_streams` streams are kept; observing a new stream when full
/// evicts the one updated least recently.
#[derive(Debug, Clone)]
pub struct StreamHistories {
    streams: HashMap<(String, String), TrackedStream>,
    max_streams: usize,
    tick: u64,
}

#[derive(Debug, Clone, Default)]
struct TrackedStream {
    history: SensorHistory,
    last_used: u64,
}

impl Default for StreamHistories {
    fn default() -> Self {
        Self::with_max_streams(MAX_TRACKED_STREAMS)
    }
}

impl StreamHistories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_streams(max_streams: usize) -> Self {
        Self {
            streams: HashMap::new(),
            max_streams: max_streams.max(1),
            tick: 0,
        }
    }

    /// No stream limit (offline derivation over a finite dataset)
    pub fn unbounded() -> Self {
        Self::with_max_streams(usize::MAX)
    }

    /// Context `observe` would return, without recording the value
    pub fn preview(&self, device_id: &str, sensor_name: &str, value: f64) -> TimeSeriesContext {
        match self.streams.get(&(device_id.to_string(), sensor_name.to_string())) {
            Some(stream) => stream.history.preview(value),
            None => SensorHistory::new().observe(value),
        }
    }

    pub fn observe(&mut self, device_id: &str, sensor_name: &str, value: f64) -> TimeSeriesContext {
        self.tick += 1;
        let key = (device_id.to_string(), sensor_name.to_string());
        if !self.streams.contains_key(&key) && self.streams.len() >= self.max_streams {
            self.evict_oldest();
        }
        let stream = self.streams.entry(key).or_default();
        stream.last_used = self.tick;
        stream.history.observe(value)
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .streams
            .iter()
            .min_by_key(|(_, s)| s.last_used)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            log::debug!("Evicting history for {}/{}", key.0, key.1);
            self.streams.remove(&key);
        }
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn contains(&self, device_id: &str, sensor_name: &str) -> bool {
        self.streams.contains_key(&(device_id.to_string(), sensor_name.to_string()))
    }

    pub fn clear(&mut self) {
        self.streams.clear();
        self.tick = 0;
    }
}
