//! RGB gradient over a particle's lifetime

use ember_core::{EmberError, Result};
use serde::{Deserialize, Serialize};

/// Piecewise-linear RGB gradient. `colors` holds one RGB triple per timeline point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientColorValue {
    pub colors: Vec<f32>,
    pub timeline: Vec<f32>,
}

impl Default for GradientColorValue {
    fn default() -> Self {
        Self {
            colors: vec![1.0, 1.0, 1.0],
            timeline: vec![0.0],
        }
    }
}

impl GradientColorValue {
    /// Two-stop gradient from `start` at 0 to `end` at 1
    pub fn between(start: [f32; 3], end: [f32; 3]) -> Self {
        Self {
            colors: vec![start[0], start[1], start[2], end[0], end[1], end[2]],
            timeline: vec![0.0, 1.0],
        }
    }

    /// RGB at `percent`
    pub fn color(&self, percent: f32) -> [f32; 3] {
        let n = self.timeline.len().min(self.colors.len() / 3);
        if n == 0 {
            return [1.0; 3];
        }
        let mut start = 0;
        let mut end = None;
        for i in 1..n {
            if self.timeline[i] > percent {
                end = Some(i);
                break;
            }
            start = i;
        }
        let c1 = &self.colors[start * 3..start * 3 + 3];
        let Some(end) = end else {
            return [c1[0], c1[1], c1[2]];
        };
        let start_time = self.timeline[start];
        let span = self.timeline[end] - start_time;
        let factor = if span > 0.0 {
            (percent - start_time) / span
        } else {
            1.0
        };
        let c2 = &self.colors[end * 3..end * 3 + 3];
        [
            c1[0] + (c2[0] - c1[0]) * factor,
            c1[1] + (c2[1] - c1[1]) * factor,
            c1[2] + (c2[2] - c1[2]) * factor,
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeline.is_empty() || self.colors.len() != self.timeline.len() * 3 {
            return Err(EmberError::InvalidConfig(format!(
                "gradient needs 3 color components per timeline point, got {} for {}",
                self.colors.len(),
                self.timeline.len()
            )));
        }
        Ok(())
    }
}
