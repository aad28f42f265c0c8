//! Numeric ranges and lifetime-scaled ranges

use crate::rand::ParticleRng;
use ember_core::{EmberError, Result};
use serde::{Deserialize, Serialize};

/// A value drawn uniformly from `[low_min, low_max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangedNumericValue {
    pub active: bool,
    pub low_min: f32,
    pub low_max: f32,
}

impl Default for RangedNumericValue {
    fn default() -> Self {
        Self {
            active: true,
            low_min: 0.0,
            low_max: 0.0,
        }
    }
}

impl RangedNumericValue {
    pub fn constant(value: f32) -> Self {
        Self {
            low_min: value,
            low_max: value,
            ..Default::default()
        }
    }

    pub fn inactive() -> Self {
        Self {
            active: false,
            ..Default::default()
        }
    }

    pub fn new_low_value(&self, rng: &mut ParticleRng) -> f32 {
        self.low_min + (self.low_max - self.low_min) * rng.next_f32()
    }
}

/// A start range, an end range and a curve that blends between them over time.
///
/// Sampling draws `start` from the low range and `high` from the high range. In
/// absolute mode the end point becomes a delta (`diff = high - start`); in relative
/// mode `high` already is the delta. The instantaneous value at `percent` is then
/// `start + diff * scale(percent)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaledNumericValue {
    pub active: bool,
    pub low_min: f32,
    pub low_max: f32,
    pub high_min: f32,
    pub high_max: f32,
    pub relative: bool,
    /// Curve values, one per timeline point
    pub scaling: Vec<f32>,
    /// Curve times in [0, 1], ascending
    pub timeline: Vec<f32>,
}

impl Default for ScaledNumericValue {
    fn default() -> Self {
        Self {
            active: true,
            low_min: 0.0,
            low_max: 0.0,
            high_min: 0.0,
            high_max: 0.0,
            relative: false,
            scaling: vec![1.0],
            timeline: vec![0.0],
        }
    }
}

impl ScaledNumericValue {
    /// Fixed value over the whole lifetime
    pub fn constant(value: f32) -> Self {
        Self::range(value, value)
    }

    /// `low` at the start, `high` once the curve reaches 1
    pub fn range(low: f32, high: f32) -> Self {
        Self {
            low_min: low,
            low_max: low,
            high_min: high,
            high_max: high,
            ..Default::default()
        }
    }

    /// Identity curve: scale(t) = t
    pub fn linear(low: f32, high: f32) -> Self {
        Self::range(low, high).with_curve(vec![0.0, 1.0], vec![0.0, 1.0])
    }

    pub fn with_curve(mut self, scaling: Vec<f32>, timeline: Vec<f32>) -> Self {
        self.scaling = scaling;
        self.timeline = timeline;
        self
    }

    pub fn with_low_range(mut self, min: f32, max: f32) -> Self {
        self.low_min = min;
        self.low_max = max;
        self
    }

    pub fn with_high_range(mut self, min: f32, max: f32) -> Self {
        self.high_min = min;
        self.high_max = max;
        self
    }

    pub fn with_relative(mut self, relative: bool) -> Self {
        self.relative = relative;
        self
    }

    pub fn new_low_value(&self, rng: &mut ParticleRng) -> f32 {
        self.low_min + (self.low_max - self.low_min) * rng.next_f32()
    }

    pub fn new_high_value(&self, rng: &mut ParticleRng) -> f32 {
        self.high_min + (self.high_max - self.high_min) * rng.next_f32()
    }

    /// Draw a per-particle `(start, diff)` pair.
    pub fn sample_pair(&self, rng: &mut ParticleRng) -> (f32, f32) {
        let start = self.new_low_value(rng);
        let high = self.new_high_value(rng);
        if self.relative {
            (start, high)
        } else {
            (start, high - start)
        }
    }

    /// Evaluate `start + diff * scale(percent)`
    #[inline]
    pub fn interpolate(&self, start: f32, diff: f32, percent: f32) -> f32 {
        start + diff * self.scale(percent)
    }

    /// Piecewise-linear curve value at `percent`. Holds the last value past the
    /// final timeline point.
    pub fn scale(&self, percent: f32) -> f32 {
        let n = self.timeline.len().min(self.scaling.len());
        if n == 0 {
            return 1.0;
        }
        let Some(end) = (1..n).find(|&i| self.timeline[i] > percent) else {
            return self.scaling[n - 1];
        };
        let start = end - 1;
        let start_value = self.scaling[start];
        let start_time = self.timeline[start];
        let span = self.timeline[end] - start_time;
        if span <= 0.0 {
            return self.scaling[end];
        }
        start_value + (self.scaling[end] - start_value) * ((percent - start_time) / span)
    }

    /// Reject curves a designer could not have meant
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.scaling.is_empty() || self.scaling.len() != self.timeline.len() {
            return Err(EmberError::InvalidConfig(format!(
                "{name}: scaling ({}) and timeline ({}) must be non-empty and the same length",
                self.scaling.len(),
                self.timeline.len()
            )));
        }
        if self.timeline.windows(2).any(|w| w[1] < w[0]) {
            return Err(EmberError::InvalidConfig(format!(
                "{name}: timeline must be ascending"
            )));
        }
        Ok(())
    }
}
