//! Regular emitter: spawns particles over a duration and ages them out
//!
//! The emitter owns the Life channel. Every frame it advances its delay and
//! duration timers, reports how many particles to activate, then decrements
//! each particle's remaining life, swap-removing the dead ones.

use crate::channels::{CURRENT_LIFE_OFFSET, LIFE, LIFE_PERCENT_OFFSET, TOTAL_LIFE_OFFSET};
use crate::controller::ControllerState;
use crate::store::ChannelHandle;
use crate::values::{RangedNumericValue, ScaledNumericValue};
use ember_core::{EmberError, Result};
use serde::{Deserialize, Serialize};

/// Upper bound on particles per controller
pub const MAX_PARTICLES: usize = 100_000;

/// Shortest remaining life a life offset can leave a new particle with (seconds)
const MIN_REMAINING_LIFE: f32 = 0.001;

/// Whether and how the emitter keeps spawning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionMode {
    /// Emit, and restart the cycle when continuous
    #[default]
    Enabled,
    /// Emit until the current cycle ends, then stop
    EnabledUntilCycleEnd,
    /// Never emit
    Disabled,
}

/// Where the emitter is within its cycle after advancing its timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterPhase {
    /// Still waiting out the start delay
    Delayed,
    /// Inside the duration window, spawning
    Emitting,
    /// Duration elapsed on a continuous emitter: the controller must restart
    /// the cycle, then emit
    Restart,
    /// Duration elapsed (or emission disabled): only ageing continues
    Idle,
}

/// Per-cycle values sampled by `start()`
#[derive(Debug, Clone, Default)]
pub(crate) struct EmitterRuntime {
    delay: f32,
    delay_timer: f32,
    duration: f32,
    duration_timer: f32,
    percent: f32,
    emission: (f32, f32),
    emission_delta: f32,
    life: (f32, f32),
    life_offset: (f32, f32),
    life_channel: Option<ChannelHandle>,
}

/// Emitter configuration (parsed from TOML) and runtime state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegularEmitter {
    pub min_particle_count: usize,
    pub max_particle_count: usize,
    pub continuous: bool,
    pub emission_mode: EmissionMode,
    /// Seconds before the first emission
    pub delay: RangedNumericValue,
    /// Seconds per emission cycle
    pub duration: RangedNumericValue,
    /// Particles per second, scaled over the cycle
    pub emission: ScaledNumericValue,
    /// Particle lifetime in seconds, scaled over the cycle
    pub life: ScaledNumericValue,
    /// Seconds of life already consumed at spawn
    pub life_offset: ScaledNumericValue,
    #[serde(skip)]
    pub(crate) runtime: EmitterRuntime,
}

impl Default for RegularEmitter {
    fn default() -> Self {
        Self {
            min_particle_count: 0,
            max_particle_count: 256,
            continuous: true,
            emission_mode: EmissionMode::Enabled,
            delay: RangedNumericValue::inactive(),
            duration: RangedNumericValue::constant(1.0),
            emission: ScaledNumericValue::constant(10.0),
            life: ScaledNumericValue::constant(1.0),
            life_offset: ScaledNumericValue {
                active: false,
                ..ScaledNumericValue::constant(0.0)
            },
            runtime: EmitterRuntime::default(),
        }
    }
}

impl RegularEmitter {
    /// Configuration-only copy
    pub fn copy(&self) -> Self {
        Self {
            runtime: EmitterRuntime::default(),
            ..self.clone()
        }
    }

    pub fn with_particle_count(mut self, min: usize, max: usize) -> Self {
        self.min_particle_count = min;
        self.max_particle_count = max;
        self
    }

    pub fn with_continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    pub fn with_emission_mode(mut self, mode: EmissionMode) -> Self {
        self.emission_mode = mode;
        self
    }

    pub fn with_delay(mut self, delay: RangedNumericValue) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_duration(mut self, duration: RangedNumericValue) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_emission(mut self, emission: ScaledNumericValue) -> Self {
        self.emission = emission;
        self
    }

    pub fn with_life(mut self, life: ScaledNumericValue) -> Self {
        self.life = life;
        self
    }

    pub fn with_life_offset(mut self, life_offset: ScaledNumericValue) -> Self {
        self.life_offset = life_offset;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_particle_count == 0 || self.max_particle_count > MAX_PARTICLES {
            return Err(EmberError::InvalidConfig(format!(
                "max_particle_count must be between 1 and {MAX_PARTICLES}, got {}",
                self.max_particle_count
            )));
        }
        if self.min_particle_count > self.max_particle_count {
            return Err(EmberError::InvalidConfig(format!(
                "min_particle_count ({}) exceeds max_particle_count ({})",
                self.min_particle_count, self.max_particle_count
            )));
        }
        self.emission.validate("emission")?;
        self.life.validate("life")?;
        self.life_offset.validate("life_offset")
    }

    /// Emission cycle progress in [0, 1]
    pub fn percent(&self) -> f32 {
        self.runtime.percent
    }

    pub fn life_channel(&self) -> Result<ChannelHandle> {
        self.runtime
            .life_channel
            .ok_or_else(|| EmberError::ChannelNotBound("emitter life".into()))
    }

    pub fn allocate_channels(&mut self, state: &mut ControllerState) -> Result<()> {
        self.validate()?;
        self.runtime.life_channel = Some(state.particles.add_channel(&LIFE)?);
        Ok(())
    }

    pub fn init(&mut self) {
        self.runtime.emission_delta = 0.0;
        // Not started yet: behave as if the cycle already ended
        self.runtime.duration_timer = self.runtime.duration;
    }

    /// Begin a new emission cycle, sampling delay, duration, rate and life.
    pub fn start(&mut self, state: &mut ControllerState) {
        let rng = &mut state.rng;
        let rt = &mut self.runtime;
        rt.delay = if self.delay.active {
            self.delay.new_low_value(rng)
        } else {
            0.0
        };
        rt.delay_timer = 0.0;
        rt.duration_timer = 0.0;
        rt.duration = self.duration.new_low_value(rng);
        rt.percent = if rt.duration > 0.0 { 0.0 } else { 1.0 };
        rt.emission = self.emission.sample_pair(rng);
        rt.life = self.life.sample_pair(rng);
        rt.life_offset = if self.life_offset.active {
            self.life_offset.sample_pair(rng)
        } else {
            (0.0, 0.0)
        };
        state.emitter_percent = rt.percent;
    }

    pub fn end(&mut self) {
        self.runtime.emission_delta = 0.0;
    }

    /// Advance the delay/duration timers by `dt` seconds.
    pub fn advance(&mut self, dt: f32) -> EmitterPhase {
        let rt = &mut self.runtime;
        if rt.delay_timer < rt.delay {
            rt.delay_timer += dt;
            return EmitterPhase::Delayed;
        }
        let emit = self.emission_mode != EmissionMode::Disabled;
        if rt.duration_timer < rt.duration {
            rt.duration_timer += dt;
            rt.percent = (rt.duration_timer / rt.duration).min(1.0);
            if emit {
                EmitterPhase::Emitting
            } else {
                EmitterPhase::Idle
            }
        } else if self.continuous && self.emission_mode == EmissionMode::Enabled {
            EmitterPhase::Restart
        } else {
            EmitterPhase::Idle
        }
    }

    /// Number of particles to activate this frame, given `live` particles. Clamped so
    /// the total never exceeds `max_particle_count`, topped up to `min_particle_count`.
    pub fn emission_count(&mut self, dt: f32, live: usize) -> usize {
        let room = self.max_particle_count.saturating_sub(live);
        let rt = &mut self.runtime;
        rt.emission_delta += dt;
        let (start, diff) = rt.emission;
        let rate = self.emission.interpolate(start, diff, rt.percent);
        let mut count = 0;
        if rate > 0.0 {
            let interval = 1.0 / rate;
            if rt.emission_delta >= interval {
                let wanted = (rt.emission_delta / interval) as usize;
                count = wanted.min(room);
                rt.emission_delta -= count as f32 * interval;
                rt.emission_delta %= interval;
            }
        }
        let after = live + count;
        if after < self.min_particle_count {
            count += self.min_particle_count - after;
        }
        count.min(room)
    }

    /// Write life for particles `[start, start + count)`.
    pub fn activate_particles(&mut self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        let rt = &self.runtime;
        let total = self.life.interpolate(rt.life.0, rt.life.1, rt.percent).max(0.0);
        let mut current = total;
        if self.life_offset.active {
            let offset = self
                .life_offset
                .interpolate(rt.life_offset.0, rt.life_offset.1, rt.percent);
            if offset > 0.0 {
                current = (current - offset).max(MIN_REMAINING_LIFE.min(total));
            }
        }
        let percent = if total > 0.0 { 1.0 - current / total } else { 1.0 };

        let life = state.particles.floats_mut(self.life_channel()?)?;
        let stride = LIFE.stride;
        for slot in life[start * stride..(start + count) * stride].chunks_exact_mut(stride) {
            slot[CURRENT_LIFE_OFFSET] = current;
            slot[TOTAL_LIFE_OFFSET] = total;
            slot[LIFE_PERCENT_OFFSET] = percent;
        }
        Ok(())
    }

    /// Decrement every live particle's life by `dt`, swap-removing expired ones and
    /// refreshing life percent. Returns how many died; their slots sit just past
    /// the new store size.
    pub fn age_particles(&mut self, state: &mut ControllerState, dt: f32) -> Result<usize> {
        let handle = self.life_channel()?;
        let store = &mut state.particles;
        let before = store.size();
        let stride = LIFE.stride;
        let mut i = 0;
        while i < store.size() {
            let life = store.floats_mut(handle)?;
            let k = i * stride;
            life[k + CURRENT_LIFE_OFFSET] -= dt;
            if life[k + CURRENT_LIFE_OFFSET] <= 0.0 {
                store.remove_element(i);
                // The particle swapped into slot i still needs ageing
                continue;
            }
            let total = life[k + TOTAL_LIFE_OFFSET];
            life[k + LIFE_PERCENT_OFFSET] = 1.0 - life[k + CURRENT_LIFE_OFFSET] / total;
            i += 1;
        }
        Ok(before - store.size())
    }

    /// Past the delay and the duration, with nothing left alive
    pub fn is_complete(&self, live: usize) -> bool {
        let rt = &self.runtime;
        rt.delay_timer >= rt.delay && rt.duration_timer >= rt.duration && live == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(emitter: &mut RegularEmitter) -> ControllerState {
        let mut state = ControllerState::new(emitter.max_particle_count, 42);
        emitter.allocate_channels(&mut state).unwrap();
        emitter.init();
        emitter.start(&mut state);
        state
    }

    #[test]
    fn default_config_is_sane() {
        let emitter = RegularEmitter::default();
        assert!(emitter.validate().is_ok());
        assert!(emitter.max_particle_count > 0);
    }

    #[test]
    fn rejects_min_above_max() {
        let emitter = RegularEmitter {
            min_particle_count: 10,
            max_particle_count: 5,
            ..Default::default()
        };
        assert!(matches!(emitter.validate(), Err(EmberError::InvalidConfig(_))));
    }

    #[test]
    fn builder_configures_a_one_shot_burst() {
        let mut emitter = RegularEmitter::default()
            .with_particle_count(6, 8)
            .with_continuous(false)
            .with_emission_mode(EmissionMode::EnabledUntilCycleEnd)
            .with_delay(RangedNumericValue::constant(0.25))
            .with_duration(RangedNumericValue::constant(0.5))
            .with_emission(ScaledNumericValue::constant(0.0))
            .with_life(ScaledNumericValue::constant(2.0))
            .with_life_offset(ScaledNumericValue::constant(0.5));
        assert!(emitter.validate().is_ok());
        assert!(!emitter.continuous);

        let mut state = started(&mut emitter);
        assert_eq!(emitter.advance(0.25), EmitterPhase::Delayed);
        assert_eq!(emitter.advance(0.5), EmitterPhase::Emitting);
        assert_eq!(emitter.emission_count(0.5, 0), 6);
        assert_eq!(emitter.advance(0.1), EmitterPhase::Idle);

        let start = state.particles.grow_size(1);
        emitter.activate_particles(&mut state, start, 1).unwrap();
        let life = state.particles.floats(emitter.life_channel().unwrap()).unwrap();
        assert!((life[CURRENT_LIFE_OFFSET] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn emission_rate_accumulates() {
        let mut emitter = RegularEmitter {
            emission: ScaledNumericValue::constant(100.0),
            ..Default::default()
        };
        started(&mut emitter);
        assert_eq!(emitter.advance(0.05), EmitterPhase::Emitting);
        let count = emitter.emission_count(0.05, 0);
        assert!((4..=5).contains(&count), "got {count}");
    }

    #[test]
    fn emission_respects_max_and_min() {
        let mut emitter = RegularEmitter {
            min_particle_count: 3,
            max_particle_count: 4,
            emission: ScaledNumericValue::constant(0.0),
            ..Default::default()
        };
        started(&mut emitter);
        emitter.advance(0.1);
        assert_eq!(emitter.emission_count(0.1, 0), 3);
        assert_eq!(emitter.emission_count(0.1, 4), 0);

        emitter.emission = ScaledNumericValue::constant(1000.0);
        assert_eq!(emitter.emission_count(1.0, 1), 3);
    }

    #[test]
    fn delay_then_emit_then_restart() {
        let mut emitter = RegularEmitter {
            delay: RangedNumericValue::constant(0.5),
            duration: RangedNumericValue::constant(1.0),
            ..Default::default()
        };
        started(&mut emitter);
        assert_eq!(emitter.advance(0.5), EmitterPhase::Delayed);
        assert_eq!(emitter.advance(0.5), EmitterPhase::Emitting);
        assert!((emitter.percent() - 0.5).abs() < 1e-6);
        assert_eq!(emitter.advance(0.5), EmitterPhase::Emitting);
        assert_eq!(emitter.advance(0.1), EmitterPhase::Restart);
    }

    #[test]
    fn until_cycle_end_stops() {
        let mut emitter = RegularEmitter {
            emission_mode: EmissionMode::EnabledUntilCycleEnd,
            ..Default::default()
        };
        started(&mut emitter);
        assert_eq!(emitter.advance(1.0), EmitterPhase::Emitting);
        assert_eq!(emitter.advance(0.1), EmitterPhase::Idle);
        assert!(emitter.is_complete(0));
        assert!(!emitter.is_complete(1));
    }

    #[test]
    fn life_offset_consumes_life() {
        let mut emitter = RegularEmitter {
            life: ScaledNumericValue::constant(2.0),
            life_offset: ScaledNumericValue::constant(0.5),
            ..Default::default()
        };
        let mut state = started(&mut emitter);
        let start = state.particles.grow_size(1);
        emitter.activate_particles(&mut state, start, 1).unwrap();
        let life = state.particles.floats(emitter.life_channel().unwrap()).unwrap();
        assert!((life[CURRENT_LIFE_OFFSET] - 1.5).abs() < 1e-6);
        assert!((life[TOTAL_LIFE_OFFSET] - 2.0).abs() < 1e-6);
        assert!((life[LIFE_PERCENT_OFFSET] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn ageing_removes_expired_particles() {
        let mut emitter = RegularEmitter {
            life: ScaledNumericValue::constant(1.0),
            ..Default::default()
        };
        let mut state = started(&mut emitter);
        let start = state.particles.grow_size(3);
        emitter.activate_particles(&mut state, start, 3).unwrap();
        // Shorten particle 1's life so it dies first
        let handle = emitter.life_channel().unwrap();
        state.particles.floats_mut(handle).unwrap()[3 + CURRENT_LIFE_OFFSET] = 0.2;

        let killed = emitter.age_particles(&mut state, 0.5).unwrap();
        assert_eq!(killed, 1);
        assert_eq!(state.particles.size(), 2);
        let life = state.particles.floats(handle).unwrap();
        for i in 0..2 {
            assert!((life[i * 3 + LIFE_PERCENT_OFFSET] - 0.5).abs() < 1e-6);
        }
    }
}
