//! Runs many effects side by side and packs their particles for the renderer

use crate::effect::ParticleEffect;
use crate::instance::{pack_controller, ParticleInstance};
use crate::rand::ParticleRng;
use ember_core::{EmberError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// System-wide settings, loadable from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Seed of the generator every added effect is forked from
    pub seed: u32,
    /// Upper bound on a single time step, in seconds
    pub max_delta_time: f32,
    /// Drop effects once their cycle is over and nothing is alive
    pub remove_completed: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            seed: 0xDEAD_BEEF,
            max_delta_time: 0.1,
            remove_completed: true,
        }
    }
}

impl SystemConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_delta_time.is_finite() || self.max_delta_time < 0.0 {
            return Err(EmberError::InvalidConfig(format!(
                "max_delta_time must be a finite, non-negative number of seconds, got {}",
                self.max_delta_time
            )));
        }
        Ok(())
    }
}

/// Identifies an effect owned by a [`ParticleSystem`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectHandle(u64);

/// Draw data for one effect, consumed by the renderer
pub struct EffectDrawData<'a> {
    pub handle: EffectHandle,
    pub name: &'a str,
    pub instances: &'a [ParticleInstance],
}

/// Owns running effects, advances them with one time step and packs their
/// particles into a single instance buffer.
#[derive(Debug)]
pub struct ParticleSystem {
    config: SystemConfig,
    rng: ParticleRng,
    next_handle: u64,
    effects: BTreeMap<EffectHandle, ParticleEffect>,
    /// Pre-allocated instance buffer for packing live particles
    instance_buffer: Vec<ParticleInstance>,
    /// Per-effect instance ranges: (handle, start, count)
    instance_ranges: Vec<(EffectHandle, usize, usize)>,
}

impl ParticleSystem {
    pub fn new(config: SystemConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: SystemConfig) -> Self {
        Self {
            rng: ParticleRng::new(config.seed),
            config,
            next_handle: 0,
            effects: BTreeMap::new(),
            instance_buffer: Vec::new(),
            instance_ranges: Vec::new(),
        }
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Take ownership of `effect`, give every controller its own generator, then
    /// init and start it.
    pub fn add(&mut self, mut effect: ParticleEffect) -> Result<EffectHandle> {
        for controller in &mut effect.controllers {
            controller.set_rng(self.rng.fork());
        }
        effect.init()?;
        effect.start()?;
        let handle = EffectHandle(self.next_handle);
        self.next_handle += 1;
        info!(effect = %effect.name, ?handle, "particle effect started");
        self.effects.insert(handle, effect);
        Ok(handle)
    }

    /// Dispose and return the effect
    pub fn remove(&mut self, handle: EffectHandle) -> Result<Option<ParticleEffect>> {
        let Some(mut effect) = self.effects.remove(&handle) else {
            return Ok(None);
        };
        effect.dispose()?;
        Ok(Some(effect))
    }

    pub fn get(&self, handle: EffectHandle) -> Option<&ParticleEffect> {
        self.effects.get(&handle)
    }

    pub fn get_mut(&mut self, handle: EffectHandle) -> Option<&mut ParticleEffect> {
        self.effects.get_mut(&handle)
    }

    /// Dispose every effect and empty the instance buffers
    pub fn clear(&mut self) -> Result<()> {
        for effect in self.effects.values_mut() {
            effect.dispose()?;
        }
        self.effects.clear();
        self.instance_buffer.clear();
        self.instance_ranges.clear();
        Ok(())
    }

    /// Advance every effect by `dt`, clamped to `[0, max_delta_time]`. A non-finite
    /// `dt` counts as a zero step.
    pub fn update(&mut self, dt: f32) -> Result<()> {
        let dt = if dt.is_finite() {
            dt.clamp(0.0, self.config.max_delta_time)
        } else {
            0.0
        };
        for effect in self.effects.values_mut() {
            effect.update(dt)?;
        }
        if self.config.remove_completed {
            let completed: Vec<_> = self
                .effects
                .iter()
                .filter(|(_, effect)| effect.is_complete())
                .map(|(&handle, _)| handle)
                .collect();
            for handle in completed {
                if let Some(effect) = self.remove(handle)? {
                    debug!(effect = %effect.name, ?handle, "particle effect completed");
                }
            }
        }
        Ok(())
    }

    /// Pack live particles into the instance buffer. Call this after `update()`.
    pub fn pack_instances(&mut self) -> Result<()> {
        self.instance_buffer.clear();
        self.instance_ranges.clear();

        for (&handle, effect) in &self.effects {
            let start = self.instance_buffer.len();
            for controller in &effect.controllers {
                pack_controller(controller, &mut self.instance_buffer)?;
            }
            let count = self.instance_buffer.len() - start;
            if count > 0 {
                self.instance_ranges.push((handle, start, count));
            }
        }
        Ok(())
    }

    /// Get the packed instance data
    pub fn instance_data(&self) -> &[ParticleInstance] {
        &self.instance_buffer
    }

    /// Draw data for each effect that had live particles at the last pack
    pub fn draw_data(&self) -> Vec<EffectDrawData<'_>> {
        self.instance_ranges
            .iter()
            .filter_map(|&(handle, start, count)| {
                let effect = self.effects.get(&handle)?;
                Some(EffectDrawData {
                    handle,
                    name: &effect.name,
                    instances: &self.instance_buffer[start..start + count],
                })
            })
            .collect()
    }

    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }

    /// Total live particles across all effects, nested controllers excluded
    pub fn total_alive(&self) -> usize {
        self.effects.values().map(ParticleEffect::alive_count).sum()
    }
}

impl Default for ParticleSystem {
    fn default() -> Self {
        Self::with_config(SystemConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ParticleController;
    use crate::emitter::RegularEmitter;
    use crate::influencers::SpawnInfluencer;
    use crate::values::{RangedNumericValue, ScaledNumericValue};

    fn burst(name: &str, count: usize, continuous: bool) -> ParticleEffect {
        let emitter = RegularEmitter {
            min_particle_count: count,
            max_particle_count: count,
            continuous,
            emission: ScaledNumericValue::constant(0.0),
            life: ScaledNumericValue::constant(0.5),
            duration: RangedNumericValue::constant(0.2),
            ..Default::default()
        };
        let controller = ParticleController::new(name, emitter, vec![SpawnInfluencer::default().into()]);
        ParticleEffect::new(name, vec![controller])
    }

    #[test]
    fn pack_instances_produces_correct_ranges() {
        let mut system = ParticleSystem::default();
        let a = system.add(burst("a", 5, true)).unwrap();
        let b = system.add(burst("b", 3, true)).unwrap();
        system.update(1.0 / 60.0).unwrap();
        system.pack_instances().unwrap();

        assert_eq!(system.instance_data().len(), 8);
        assert_eq!(system.total_alive(), 8);
        let draws = system.draw_data();
        assert_eq!(draws.len(), 2);
        assert_eq!((draws[0].handle, draws[0].instances.len()), (a, 5));
        assert_eq!((draws[1].handle, draws[1].name), (b, "b"));
    }

    #[test]
    fn completed_effects_are_removed() {
        let mut system = ParticleSystem::default();
        let one_shot = system.add(burst("once", 2, false)).unwrap();
        let looping = system.add(burst("loop", 2, true)).unwrap();
        for _ in 0..20 {
            system.update(0.1).unwrap();
        }
        assert!(system.get(one_shot).is_none());
        assert!(system.get(looping).is_some());
        assert_eq!(system.effect_count(), 1);
    }

    #[test]
    fn completed_effects_can_be_kept() {
        let config = SystemConfig {
            remove_completed: false,
            ..Default::default()
        };
        let mut system = ParticleSystem::new(config).unwrap();
        let handle = system.add(burst("once", 2, false)).unwrap();
        for _ in 0..20 {
            system.update(0.1).unwrap();
        }
        assert!(system.get(handle).unwrap().is_complete());
    }

    #[test]
    fn long_frames_are_clamped() {
        let mut effect = burst("steady", 0, true);
        let emitter = &mut effect.controllers[0].emitter;
        emitter.max_particle_count = 256;
        emitter.emission = ScaledNumericValue::constant(10.0);
        emitter.life = ScaledNumericValue::constant(10.0);
        emitter.duration = RangedNumericValue::constant(10.0);

        let mut system = ParticleSystem::default();
        system.add(effect).unwrap();
        system.update(5.0).unwrap();
        assert!(system.total_alive() <= 1, "emitted {}", system.total_alive());
    }

    #[test]
    fn remove_disposes_the_effect() {
        let mut system = ParticleSystem::default();
        let handle = system.add(burst("gone", 4, true)).unwrap();
        system.update(0.05).unwrap();
        let effect = system.remove(handle).unwrap().unwrap();
        assert_eq!(effect.alive_count(), 0);
        assert!(system.remove(handle).unwrap().is_none());

        system.add(burst("other", 1, true)).unwrap();
        system.clear().unwrap();
        assert_eq!(system.effect_count(), 0);
        assert!(system.instance_data().is_empty());
    }

    #[test]
    fn bad_time_step_limit_is_a_config_error() {
        for text in ["max_delta_time = -0.1", "max_delta_time = nan", "max_delta_time = inf"] {
            assert!(matches!(
                SystemConfig::from_toml_str(text),
                Err(EmberError::InvalidConfig(_))
            ));
        }
        let config = SystemConfig {
            max_delta_time: -0.1,
            ..Default::default()
        };
        assert!(matches!(ParticleSystem::new(config), Err(EmberError::InvalidConfig(_))));
    }

    #[test]
    fn non_finite_frames_do_not_advance() {
        let mut effect = burst("steady", 0, true);
        let emitter = &mut effect.controllers[0].emitter;
        emitter.max_particle_count = 16;
        emitter.emission = ScaledNumericValue::constant(100.0);
        emitter.life = ScaledNumericValue::constant(0.05);
        emitter.duration = RangedNumericValue::constant(10.0);

        let mut system = ParticleSystem::default();
        system.add(effect).unwrap();
        system.update(f32::NAN).unwrap();
        system.update(f32::INFINITY).unwrap();
        assert_eq!(system.total_alive(), 0);

        // A NaN reaching the emitter would poison its accumulator for good
        system.update(0.05).unwrap();
        assert!(system.total_alive() > 0);
    }

    #[test]
    fn config_from_toml() {
        let config = SystemConfig::from_toml_str("seed = 7\nmax_delta_time = 0.05").unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.max_delta_time, 0.05);
        assert!(config.remove_completed);
    }

    #[test]
    fn added_effects_get_distinct_generators() {
        let mut system = ParticleSystem::default();
        let a = system.add(burst("a", 1, true)).unwrap();
        let b = system.add(burst("a", 1, true)).unwrap();
        let ra = system.get_mut(a).unwrap().controllers[0].state().rng.clone().next_f32();
        let rb = system.get_mut(b).unwrap().controllers[0].state().rng.clone().next_f32();
        assert_ne!(ra, rb);
    }
}
