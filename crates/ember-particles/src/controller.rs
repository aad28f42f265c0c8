//! Particle controller: one emitter, an ordered list of influencers, and the store
//! they share
//!
//! Influencers run in list order every frame. Stages that create a channel others
//! read (Spawn for Position, the emitter for Life) must come before their readers,
//! and a controller finalizer must come last. The controller does not reorder or
//! check this.

use crate::channels::{POSITION, X_OFFSET, Y_OFFSET, Z_OFFSET};
use crate::emitter::{EmitterPhase, RegularEmitter};
use crate::influencers::{Influence, Influencer};
use crate::rand::ParticleRng;
use crate::store::ParticleStore;
use ember_core::{BoundingBox, ControllerId, EmberError, Result, Transform};
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Everything a stage may touch while it runs: the particle store plus the
/// controller's transform, time step and random generator.
#[derive(Debug)]
pub struct ControllerState {
    pub particles: ParticleStore,
    pub transform: Mat4,
    pub scale: Vec3,
    pub delta_time: f32,
    pub delta_time_sqr: f32,
    /// Emitter cycle progress, refreshed every frame
    pub emitter_percent: f32,
    pub rng: ParticleRng,
}

impl ControllerState {
    pub fn new(capacity: usize, seed: u32) -> Self {
        Self {
            particles: ParticleStore::new(capacity),
            transform: Mat4::IDENTITY,
            scale: Vec3::ONE,
            delta_time: 0.0,
            delta_time_sqr: 0.0,
            emitter_percent: 0.0,
            rng: ParticleRng::new(seed),
        }
    }

    pub fn set_time_step(&mut self, dt: f32) {
        self.delta_time = dt;
        self.delta_time_sqr = dt * dt;
    }

    /// World-space origin of the controller
    pub fn origin(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::new(0, 0xDEAD_BEEF)
    }
}

/// Seed derived from an instance id so copies don't replay each other's randomness
fn seed_for(id: ControllerId) -> u32 {
    let x = id.raw().wrapping_mul(0x9E37_79B9_7F4A_7C15);
    (x >> 32) as u32 ^ x as u32
}

fn fresh_state() -> (ControllerId, ControllerState) {
    let id = ControllerId::new();
    (id, ControllerState::new(0, seed_for(id)))
}

/// Lifecycle state of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Unallocated,
    Allocated,
    Disposed,
}

/// Saved form of a controller; runtime state is rebuilt from a fresh identity.
#[derive(Deserialize)]
struct ControllerConfig {
    name: String,
    #[serde(default)]
    emitter: RegularEmitter,
    #[serde(default)]
    influencers: Vec<Influencer>,
}

impl From<ControllerConfig> for ParticleController {
    fn from(config: ControllerConfig) -> Self {
        Self::new(config.name, config.emitter, config.influencers)
    }
}

/// One particle system: emitter, influencers and their shared store.
#[derive(Debug, Serialize, Deserialize)]
#[serde(from = "ControllerConfig")]
pub struct ParticleController {
    pub name: String,
    pub emitter: RegularEmitter,
    pub influencers: Vec<Influencer>,
    #[serde(skip)]
    id: ControllerId,
    #[serde(skip)]
    state: ControllerState,
    #[serde(skip)]
    lifecycle: Lifecycle,
}

impl ParticleController {
    pub fn new(name: impl Into<String>, emitter: RegularEmitter, influencers: Vec<Influencer>) -> Self {
        let (id, state) = fresh_state();
        Self {
            name: name.into(),
            emitter,
            influencers,
            id,
            state,
            lifecycle: Lifecycle::Unallocated,
        }
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn particles(&self) -> &ParticleStore {
        &self.state.particles
    }

    /// Direct store access, e.g. for tools scrubbing life percent
    pub fn particles_mut(&mut self) -> &mut ParticleStore {
        &mut self.state.particles
    }

    pub fn transform(&self) -> Mat4 {
        self.state.transform
    }

    /// Replace this controller's random generator
    pub fn set_rng(&mut self, rng: ParticleRng) {
        self.state.rng = rng;
    }

    /// Build a fresh store and bind every stage to it, then run `init` on each.
    ///
    /// Calling `init` again ends the running cycle and rebuilds everything, so
    /// configuration edits take effect.
    pub fn init(&mut self) -> Result<()> {
        if self.lifecycle == Lifecycle::Allocated {
            self.end()?;
        }
        self.state.particles = ParticleStore::new(self.emitter.max_particle_count);
        self.emitter.allocate_channels(&mut self.state)?;
        for influencer in &mut self.influencers {
            influencer.allocate_channels(&mut self.state)?;
        }
        self.emitter.init();
        for influencer in &mut self.influencers {
            influencer.init(&mut self.state)?;
        }
        self.lifecycle = Lifecycle::Allocated;
        debug!(
            controller = %self.name,
            channels = self.state.particles.channel_count(),
            capacity = self.state.particles.capacity(),
            "particle controller allocated"
        );
        Ok(())
    }

    fn ensure_allocated(&self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Allocated => Ok(()),
            _ => Err(EmberError::NotInitialized(self.name.clone())),
        }
    }

    /// Begin an emission cycle
    pub fn start(&mut self) -> Result<()> {
        self.ensure_allocated()?;
        self.emitter.start(&mut self.state);
        for influencer in &mut self.influencers {
            influencer.start(&mut self.state)?;
        }
        Ok(())
    }

    /// Kill every live particle and stop the cycle
    pub fn end(&mut self) -> Result<()> {
        self.ensure_allocated()?;
        let live = self.state.particles.size();
        if live > 0 {
            self.kill_particles(0, live)?;
            self.state.particles.clear_particles();
        }
        for influencer in &mut self.influencers {
            influencer.end(&mut self.state)?;
        }
        self.emitter.end();
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.end()?;
        self.start()
    }

    /// Run the stages' activation hooks on `[start, start + count)`
    pub fn activate_particles(&mut self, start: usize, count: usize) -> Result<()> {
        self.emitter.activate_particles(&mut self.state, start, count)?;
        for influencer in &mut self.influencers {
            influencer.activate_particles(&mut self.state, start, count)?;
        }
        Ok(())
    }

    /// Run the stages' kill hooks on `[start, start + count)`
    pub fn kill_particles(&mut self, start: usize, count: usize) -> Result<()> {
        for influencer in &mut self.influencers {
            influencer.kill_particles(&mut self.state, start, count)?;
        }
        Ok(())
    }

    /// Append `count` new particles and activate them
    pub fn add_particles(&mut self, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let start = self.state.particles.grow_size(count);
        self.activate_particles(start, count)
    }

    /// Advance the simulation by `dt` seconds: emit, age, then run every influencer.
    pub fn update(&mut self, dt: f32) -> Result<()> {
        self.ensure_allocated()?;
        self.state.set_time_step(dt);

        let phase = self.emitter.advance(dt);
        // Particles spawned this frame read the cycle progress from the state
        self.state.emitter_percent = self.emitter.percent();
        match phase {
            EmitterPhase::Delayed | EmitterPhase::Idle => {}
            EmitterPhase::Restart => {
                self.start()?;
                self.emit(dt)?;
            }
            EmitterPhase::Emitting => self.emit(dt)?,
        }

        let killed = self.emitter.age_particles(&mut self.state, dt)?;
        if killed > 0 {
            let live = self.state.particles.size();
            self.kill_particles(live, killed)?;
        }
        trace!(controller = %self.name, live = self.state.particles.size(), "frame");

        self.update_influencers()
    }

    fn emit(&mut self, dt: f32) -> Result<()> {
        let count = self.emitter.emission_count(dt, self.state.particles.size());
        self.add_particles(count)
    }

    /// Run every influencer's per-frame update without emitting or ageing.
    pub fn update_influencers(&mut self) -> Result<()> {
        self.ensure_allocated()?;
        for influencer in &mut self.influencers {
            influencer.update(&mut self.state)?;
        }
        Ok(())
    }

    /// Kill live particles, dispose every stage and release the store.
    pub fn dispose(&mut self) -> Result<()> {
        if self.lifecycle == Lifecycle::Allocated {
            self.end()?;
            for influencer in &mut self.influencers {
                influencer.dispose(&mut self.state)?;
            }
        }
        self.state.particles = ParticleStore::default();
        self.lifecycle = Lifecycle::Disposed;
        Ok(())
    }

    /// Configuration-only copy with a new identity. Call `init` before use.
    pub fn copy(&self) -> Self {
        let (id, mut state) = fresh_state();
        state.transform = self.state.transform;
        state.scale = self.state.scale;
        Self {
            name: self.name.clone(),
            emitter: self.emitter.copy(),
            influencers: self.influencers.iter().map(Influencer::copy).collect(),
            id,
            state,
            lifecycle: Lifecycle::Unallocated,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.emitter.is_complete(self.state.particles.size())
    }

    pub fn set_transform(&mut self, transform: &Transform) {
        self.state.transform = transform.to_matrix();
        self.state.scale = Vec3::splat(transform.scale);
    }

    pub fn translate(&mut self, translation: Vec3) {
        self.state.transform *= Mat4::from_translation(translation);
    }

    pub fn rotate(&mut self, rotation: Quat) {
        self.state.transform *= Mat4::from_quat(rotation);
    }

    pub fn scale_by(&mut self, scale: Vec3) {
        self.state.transform *= Mat4::from_scale(scale);
        self.state.scale *= scale;
    }

    /// Axis-aligned bounds of the live particles' positions
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bounds = BoundingBox::default();
        let store = &self.state.particles;
        let Some(handle) = store.get_channel(&POSITION) else {
            return bounds;
        };
        if let Ok(positions) = store.floats(handle) {
            for p in positions[..store.size() * POSITION.stride].chunks_exact(POSITION.stride) {
                bounds.extend(Vec3::new(p[X_OFFSET], p[Y_OFFSET], p[Z_OFFSET]));
            }
        }
        bounds
    }

    pub fn find_influencer(&self, kind: &str) -> Option<&Influencer> {
        self.influencers.iter().find(|i| i.kind() == kind)
    }

    pub fn find_influencer_mut(&mut self, kind: &str) -> Option<&mut Influencer> {
        self.influencers.iter_mut().find(|i| i.kind() == kind)
    }

    /// Remove the first influencer of `kind`. Takes effect at the next `init`.
    pub fn remove_influencer(&mut self, kind: &str) -> Option<Influencer> {
        let index = self.influencers.iter().position(|i| i.kind() == kind)?;
        Some(self.influencers.remove(index))
    }

    /// Replace the first influencer of `kind` in place, keeping its position in the
    /// run order. Takes effect at the next `init`.
    pub fn replace_influencer(&mut self, kind: &str, replacement: Influencer) -> Option<Influencer> {
        let slot = self.influencers.iter_mut().find(|i| i.kind() == kind)?;
        Some(std::mem::replace(slot, replacement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{LIFE, LIFE_PERCENT_OFFSET, POSITION, SCALE};
    use crate::influencers::{ScaleInfluencer, SpawnInfluencer};
    use crate::values::{RangedNumericValue, ScaledNumericValue, SpawnShapeValue};

    fn single_particle_emitter(life: f32) -> RegularEmitter {
        RegularEmitter {
            min_particle_count: 1,
            max_particle_count: 1,
            emission: ScaledNumericValue::constant(0.0),
            life: ScaledNumericValue::constant(life),
            duration: RangedNumericValue::constant(1.0),
            ..Default::default()
        }
    }

    fn scale_at(controller: &ParticleController) -> f32 {
        let store = controller.particles();
        let handle = store.get_channel(&SCALE).unwrap();
        store.floats(handle).unwrap()[0]
    }

    #[test]
    fn end_to_end_scale_over_life() {
        let mut controller = ParticleController::new(
            "fade",
            single_particle_emitter(1.0),
            vec![
                SpawnInfluencer::new(SpawnShapeValue::point(Vec3::ZERO)).into(),
                ScaleInfluencer::new(ScaledNumericValue::linear(1.0, 0.0)).into(),
            ],
        );
        controller.init().unwrap();
        controller.start().unwrap();

        controller.update(0.0).unwrap();
        assert_eq!(controller.particles().size(), 1);
        assert!((scale_at(&controller) - 1.0).abs() < 1e-6);

        controller.update(0.5).unwrap();
        assert!((scale_at(&controller) - 0.5).abs() < 1e-6);

        // Life percent 1.0 is the instant of death; set it directly
        let life = controller.particles().get_channel(&LIFE).unwrap();
        controller.particles_mut().floats_mut(life).unwrap()[LIFE_PERCENT_OFFSET] = 1.0;
        controller.update_influencers().unwrap();
        assert!(scale_at(&controller).abs() < 1e-6);
    }

    #[test]
    fn particles_die_and_are_replaced() {
        let mut controller = ParticleController::new("short", single_particle_emitter(0.25), vec![]);
        controller.init().unwrap();
        controller.start().unwrap();
        controller.update(0.0).unwrap();
        assert_eq!(controller.particles().size(), 1);
        // Emission happens before ageing, so the expired particle is only
        // replaced on the following frame
        controller.update(0.3).unwrap();
        assert_eq!(controller.particles().size(), 0);
        controller.update(0.0).unwrap();
        assert_eq!(controller.particles().size(), 1);
    }

    #[test]
    fn update_before_init_is_an_error() {
        let mut controller = ParticleController::new("raw", RegularEmitter::default(), vec![]);
        assert!(matches!(controller.update(0.1), Err(EmberError::NotInitialized(_))));
    }

    #[test]
    fn copy_gets_new_identity_and_no_store() {
        let mut controller = ParticleController::new("a", RegularEmitter::default(), vec![]);
        controller.init().unwrap();
        let copy = controller.copy();
        assert_ne!(copy.id(), controller.id());
        assert_eq!(copy.lifecycle(), Lifecycle::Unallocated);
        assert_eq!(copy.particles().channel_count(), 0);
        assert_eq!(copy.name, "a");
    }

    #[test]
    fn reinit_rebuilds_store() {
        let mut controller = ParticleController::new(
            "again",
            single_particle_emitter(1.0),
            vec![ScaleInfluencer::new(ScaledNumericValue::constant(1.0)).into()],
        );
        controller.init().unwrap();
        let channels = controller.particles().channel_count();
        controller.start().unwrap();
        controller.update(0.1).unwrap();
        controller.init().unwrap();
        assert_eq!(controller.particles().channel_count(), channels);
        assert_eq!(controller.particles().size(), 0);
    }

    #[test]
    fn transform_moves_spawn_and_bounds() {
        let mut controller = ParticleController::new(
            "moved",
            single_particle_emitter(1.0),
            vec![SpawnInfluencer::new(SpawnShapeValue::point(Vec3::ZERO)).into()],
        );
        controller.set_transform(&Transform::from_position(Vec3::new(1.0, 2.0, 3.0)));
        controller.init().unwrap();
        controller.start().unwrap();
        controller.update(0.0).unwrap();
        let bounds = controller.bounding_box();
        assert!((bounds.center() - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
        assert!((controller.state().origin() - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn completes_after_one_shot_cycle() {
        let mut controller = ParticleController::new(
            "burst",
            RegularEmitter {
                continuous: false,
                min_particle_count: 0,
                emission: ScaledNumericValue::constant(10.0),
                life: ScaledNumericValue::constant(0.1),
                duration: RangedNumericValue::constant(0.5),
                ..Default::default()
            },
            vec![],
        );
        controller.init().unwrap();
        controller.start().unwrap();
        assert!(!controller.is_complete());
        for _ in 0..20 {
            controller.update(0.1).unwrap();
        }
        assert!(controller.is_complete());
    }

    #[test]
    fn influencer_lookup_and_replace() {
        let mut controller = ParticleController::new(
            "edit",
            RegularEmitter::default(),
            vec![
                SpawnInfluencer::default().into(),
                ScaleInfluencer::new(ScaledNumericValue::constant(1.0)).into(),
            ],
        );
        assert!(controller.find_influencer("scale").is_some());
        let old = controller
            .replace_influencer("scale", ScaleInfluencer::new(ScaledNumericValue::constant(2.0)).into())
            .unwrap();
        assert_eq!(old.kind(), "scale");
        assert_eq!(controller.influencers[1].kind(), "scale");
        assert!(controller.remove_influencer("spawn").is_some());
        assert!(controller.find_influencer("spawn").is_none());
    }

    #[test]
    fn dispose_releases_store() {
        let mut controller = ParticleController::new("gone", single_particle_emitter(1.0), vec![]);
        controller.init().unwrap();
        controller.start().unwrap();
        controller.update(0.0).unwrap();
        controller.dispose().unwrap();
        assert_eq!(controller.lifecycle(), Lifecycle::Disposed);
        assert_eq!(controller.particles().size(), 0);
        assert!(controller.update(0.1).is_err());
    }

    #[test]
    fn spawn_shape_follows_cycle_progress_of_current_frame() {
        let mut shape = SpawnShapeValue::point(Vec3::ZERO);
        shape.width = ScaledNumericValue::linear(0.0, 10.0);
        let mut controller = ParticleController::new(
            "sweep",
            single_particle_emitter(10.0),
            vec![SpawnInfluencer::new(shape).into()],
        );
        controller.init().unwrap();
        controller.start().unwrap();

        controller.update(0.5).unwrap();
        let store = controller.particles();
        assert_eq!(store.size(), 1);
        let position = store.floats(store.get_channel(&POSITION).unwrap()).unwrap();
        assert!((position[0] - 5.0).abs() < 1e-5, "{}", position[0]);
    }
}
