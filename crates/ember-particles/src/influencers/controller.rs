//! Nested particle systems: each particle carries its own controller
//!
//! Single mode gives every particle a fresh copy of one template. Random mode
//! draws instances from a pool, pre-warmed with copies of randomly chosen
//! templates. Instances are started on activation and ended on kill; a killed
//! instance goes back to the pool (Random) or is disposed (Single).

use super::interpolation::bound;
use super::Influence;
use crate::channels::PARTICLE_CONTROLLER;
use crate::controller::{ControllerState, ParticleController};
use crate::rand::ParticleRng;
use crate::store::ChannelHandle;
use ember_core::{ControllerId, EmberError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Reference to a template controller: `asset` names an effect, `index` is the
/// controller's position within it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub asset: String,
    pub index: usize,
}

impl TemplateRef {
    pub fn new(asset: impl Into<String>, index: usize) -> Self {
        Self {
            asset: asset.into(),
            index,
        }
    }
}

/// Host-side lookup that turns template references into fresh controllers
pub trait TemplateResolver {
    fn resolve(&self, template: &TemplateRef) -> Result<ParticleController>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerMode {
    #[default]
    Single,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Instances ever built by the pool
    pub created: usize,
    /// Instances disposed by `clear`
    pub disposed: usize,
    /// Instances currently waiting in the pool
    pub free: usize,
}

/// Recycled, already-initialized controller instances
#[derive(Debug, Default)]
pub struct ControllerPool {
    free: Vec<ParticleController>,
    created: usize,
    disposed: usize,
}

impl ControllerPool {
    fn create(&mut self, templates: &[ParticleController], rng: &mut ParticleRng) -> Result<ParticleController> {
        if templates.is_empty() {
            return Err(EmberError::EmptyTemplates);
        }
        let mut controller = templates[rng.index(templates.len())].copy();
        controller.set_rng(rng.fork());
        controller.init()?;
        self.created += 1;
        Ok(controller)
    }

    /// Take a free instance, or build one from a random template when empty.
    pub fn obtain(&mut self, templates: &[ParticleController], rng: &mut ParticleRng) -> Result<ParticleController> {
        match self.free.pop() {
            Some(controller) => Ok(controller),
            None => self.create(templates, rng),
        }
    }

    /// Build `count` instances ahead of time
    pub fn warm(&mut self, templates: &[ParticleController], rng: &mut ParticleRng, count: usize) -> Result<()> {
        self.free.reserve(count);
        for _ in 0..count {
            let controller = self.create(templates, rng)?;
            self.free.push(controller);
        }
        debug!(templates = templates.len(), count, "controller pool warmed");
        Ok(())
    }

    pub fn free(&mut self, controller: ParticleController) {
        self.free.push(controller);
    }

    /// Dispose every free instance
    pub fn clear(&mut self) -> Result<()> {
        let count = self.free.len();
        for mut controller in self.free.drain(..) {
            controller.dispose()?;
            self.disposed += 1;
        }
        if count > 0 {
            debug!(count, "controller pool cleared");
        }
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created,
            disposed: self.disposed,
            free: self.free.len(),
        }
    }

    /// Ids of the free instances, in pool order
    pub fn free_ids(&self) -> Vec<ControllerId> {
        self.free.iter().map(ParticleController::id).collect()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleControllerInfluencer {
    pub mode: ControllerMode,
    /// Saved form of the templates; resolved by [`ParticleControllerInfluencer::load`]
    pub templates: Vec<TemplateRef>,
    #[serde(skip)]
    controllers: Vec<ParticleController>,
    #[serde(skip)]
    pool: ControllerPool,
    #[serde(skip)]
    channel: Option<ChannelHandle>,
}

impl ParticleControllerInfluencer {
    pub fn single(template: ParticleController) -> Self {
        Self::with_controllers(ControllerMode::Single, vec![template])
    }

    pub fn random(templates: Vec<ParticleController>) -> Self {
        Self::with_controllers(ControllerMode::Random, templates)
    }

    pub fn with_controllers(mode: ControllerMode, controllers: Vec<ParticleController>) -> Self {
        Self {
            mode,
            controllers,
            ..Default::default()
        }
    }

    /// Unresolved templates, to be filled in by [`ParticleControllerInfluencer::load`]
    pub fn with_refs(mode: ControllerMode, templates: Vec<TemplateRef>) -> Self {
        Self {
            mode,
            templates,
            ..Default::default()
        }
    }

    pub fn controllers(&self) -> &[ParticleController] {
        &self.controllers
    }

    pub fn pool(&self) -> &ControllerPool {
        &self.pool
    }

    /// Resolve every template reference into a controller. Without references the
    /// controllers given at construction are kept.
    pub fn load(&mut self, resolver: &dyn TemplateResolver) -> Result<()> {
        if self.templates.is_empty() {
            return Ok(());
        }
        self.controllers = self
            .templates
            .iter()
            .map(|template| resolver.resolve(template))
            .collect::<Result<_>>()?;
        Ok(())
    }

    pub fn copy(&self) -> Self {
        Self {
            mode: self.mode,
            templates: self.templates.clone(),
            controllers: self.controllers.iter().map(ParticleController::copy).collect(),
            ..Default::default()
        }
    }

    fn instance(&mut self, rng: &mut ParticleRng) -> Result<ParticleController> {
        match self.mode {
            ControllerMode::Single => {
                let template = self.controllers.first().ok_or(EmberError::EmptyTemplates)?;
                let mut controller = template.copy();
                controller.set_rng(rng.fork());
                controller.init()?;
                Ok(controller)
            }
            ControllerMode::Random => self.pool.obtain(&self.controllers, rng),
        }
    }

    fn release(&mut self, mut controller: ParticleController) -> Result<()> {
        controller.end()?;
        match self.mode {
            ControllerMode::Random => self.pool.free(controller),
            ControllerMode::Single => controller.dispose()?,
        }
        Ok(())
    }
}

impl Influence for ParticleControllerInfluencer {
    fn allocate_channels(&mut self, state: &mut ControllerState) -> Result<()> {
        if self.controllers.is_empty() {
            return Err(EmberError::EmptyTemplates);
        }
        self.channel = Some(state.particles.add_channel(&PARTICLE_CONTROLLER)?);
        Ok(())
    }

    fn init(&mut self, state: &mut ControllerState) -> Result<()> {
        if self.mode == ControllerMode::Random {
            self.pool.clear()?;
            let count = state.particles.capacity();
            self.pool.warm(&self.controllers, &mut state.rng, count)?;
        }
        Ok(())
    }

    fn activate_particles(&mut self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        let channel = bound(self.channel, "particle controller")?;
        for i in start..start + count {
            let mut controller = self.instance(&mut state.rng)?;
            controller.start()?;
            state.particles.objects_mut(channel)?[i] = Some(Box::new(controller));
        }
        Ok(())
    }

    fn kill_particles(&mut self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        let channel = bound(self.channel, "particle controller")?;
        for i in start..start + count {
            let Some(slot) = state.particles.objects_mut(channel)?[i].take() else {
                continue;
            };
            if let Ok(controller) = slot.downcast::<ParticleController>() {
                self.release(*controller)?;
            }
        }
        Ok(())
    }

    fn dispose(&mut self, state: &mut ControllerState) -> Result<()> {
        self.pool.clear()?;
        if let Some(channel) = self.channel {
            for slot in state.particles.objects_mut(channel)? {
                if let Some(controller) = slot.take().and_then(|s| s.downcast::<ParticleController>().ok()) {
                    let mut controller = *controller;
                    controller.dispose()?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::RegularEmitter;
    use std::collections::HashSet;

    fn child(name: &str) -> ParticleController {
        ParticleController::new(
            name,
            RegularEmitter {
                max_particle_count: 4,
                ..Default::default()
            },
            vec![],
        )
    }

    fn nested_at(state: &mut ControllerState, channel: ChannelHandle, i: usize) -> Option<ControllerId> {
        state
            .particles
            .object_mut::<ParticleController>(channel, i)
            .unwrap()
            .map(|c| c.id())
    }

    fn bound_influencer(influencer: &mut ParticleControllerInfluencer, capacity: usize) -> ControllerState {
        let mut state = ControllerState::new(capacity, 17);
        influencer.allocate_channels(&mut state).unwrap();
        influencer.init(&mut state).unwrap();
        state
    }

    #[test]
    fn random_pool_round_trip() {
        let n = 5;
        let mut influencer = ParticleControllerInfluencer::random(vec![child("a"), child("b")]);
        let mut state = bound_influencer(&mut influencer, n);
        assert_eq!(influencer.pool().stats().free, n);

        let start = state.particles.grow_size(n);
        influencer.activate_particles(&mut state, start, n).unwrap();
        assert_eq!(influencer.pool().stats().free, 0);

        state.particles.clear_particles();
        influencer.kill_particles(&mut state, 0, n).unwrap();
        let ids = influencer.pool().free_ids();
        assert_eq!(ids.len(), n);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), n);

        influencer.pool.clear().unwrap();
        let stats = influencer.pool().stats();
        assert_eq!(stats.created, n);
        assert_eq!(stats.disposed, stats.created);
        assert_eq!(stats.free, 0);
    }

    #[test]
    fn random_pool_grows_past_warm_count() {
        let mut influencer = ParticleControllerInfluencer::random(vec![child("a")]);
        let mut state = bound_influencer(&mut influencer, 1);
        let start = state.particles.grow_size(3);
        influencer.activate_particles(&mut state, start, 3).unwrap();
        assert_eq!(influencer.pool().stats().created, 3);
    }

    #[test]
    fn single_mode_gives_each_particle_its_own_copy() {
        let template = child("spark");
        let template_id = template.id();
        let mut influencer = ParticleControllerInfluencer::single(template);
        let mut state = bound_influencer(&mut influencer, 2);
        state.particles.grow_size(2);
        influencer.activate_particles(&mut state, 0, 2).unwrap();

        let channel = state.particles.get_channel(&PARTICLE_CONTROLLER).unwrap();
        let a = nested_at(&mut state, channel, 0).unwrap();
        let b = nested_at(&mut state, channel, 1).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, template_id);

        influencer.kill_particles(&mut state, 0, 2).unwrap();
        assert!(nested_at(&mut state, channel, 0).is_none());
        assert!(nested_at(&mut state, channel, 1).is_none());
        // Single mode never pools
        assert_eq!(influencer.pool().stats(), PoolStats::default());
    }

    #[test]
    fn empty_templates_fail_at_allocation() {
        let mut influencer = ParticleControllerInfluencer::default();
        let mut state = ControllerState::new(1, 1);
        assert!(matches!(
            influencer.allocate_channels(&mut state),
            Err(EmberError::EmptyTemplates)
        ));
    }

    #[test]
    fn dispose_drains_pool_and_slots() {
        let mut influencer = ParticleControllerInfluencer::random(vec![child("a")]);
        let mut state = bound_influencer(&mut influencer, 2);
        state.particles.grow_size(1);
        influencer.activate_particles(&mut state, 0, 1).unwrap();
        influencer.dispose(&mut state).unwrap();
        let channel = state.particles.get_channel(&PARTICLE_CONTROLLER).unwrap();
        assert!(nested_at(&mut state, channel, 0).is_none());
        assert_eq!(influencer.pool().stats().free, 0);
    }

    struct Library(Vec<ParticleController>);

    impl TemplateResolver for Library {
        fn resolve(&self, template: &TemplateRef) -> Result<ParticleController> {
            self.0
                .get(template.index)
                .map(ParticleController::copy)
                .ok_or_else(|| EmberError::TemplateNotFound {
                    asset: template.asset.clone(),
                    index: template.index,
                })
        }
    }

    #[test]
    fn load_resolves_refs() {
        let library = Library(vec![child("zero"), child("one")]);
        let mut influencer =
            ParticleControllerInfluencer::with_refs(ControllerMode::Random, vec![TemplateRef::new("fx", 1)]);
        influencer.load(&library).unwrap();
        assert_eq!(influencer.controllers()[0].name, "one");

        let mut missing =
            ParticleControllerInfluencer::with_refs(ControllerMode::Single, vec![TemplateRef::new("fx", 9)]);
        assert!(matches!(
            missing.load(&library),
            Err(EmberError::TemplateNotFound { index: 9, .. })
        ));
    }
}
