//! Controller finalizer: moves each particle's nested controller to the particle
//! and advances it. Must be the last influencer in the list.

use super::interpolation::bound;
use super::Influence;
use crate::channels::{
    PARTICLE_CONTROLLER, POSITION, ROTATION_3D, SCALE, W_OFFSET, X_OFFSET, Y_OFFSET, Z_OFFSET,
};
use crate::controller::{ControllerState, ParticleController};
use crate::store::ChannelHandle;
use ember_core::{EmberError, Result, Transform};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerFinalizerInfluencer {
    #[serde(skip)]
    controller: Option<ChannelHandle>,
    #[serde(skip)]
    position: Option<ChannelHandle>,
    #[serde(skip)]
    scale: Option<ChannelHandle>,
    #[serde(skip)]
    rotation: Option<ChannelHandle>,
}

impl ControllerFinalizerInfluencer {
    fn particle_transform(&self, state: &ControllerState, i: usize) -> Result<Transform> {
        let store = &state.particles;
        let pos = store.floats(bound(self.position, "finalizer position")?)?;
        let k = i * POSITION.stride;
        let position = Vec3::new(pos[k + X_OFFSET], pos[k + Y_OFFSET], pos[k + Z_OFFSET]);
        let mut transform = Transform::from_position(position);
        if let Some(scale) = self.scale {
            transform.scale = store.floats(scale)?[i * SCALE.stride];
        }
        if let Some(rotation) = self.rotation {
            let r = &store.floats(rotation)?[i * ROTATION_3D.stride..];
            transform.rotation = Quat::from_xyzw(r[X_OFFSET], r[Y_OFFSET], r[Z_OFFSET], r[W_OFFSET]);
        }
        Ok(transform)
    }
}

impl Influence for ControllerFinalizerInfluencer {
    fn allocate_channels(&mut self, state: &mut ControllerState) -> Result<()> {
        let store = &mut state.particles;
        let controller = store
            .lookup_channel(&PARTICLE_CONTROLLER)?
            .ok_or_else(|| EmberError::MissingChannel(PARTICLE_CONTROLLER.to_string()))?;
        self.controller = Some(controller);
        self.position = Some(store.add_channel(&POSITION)?);
        self.scale = store.lookup_channel(&SCALE)?;
        self.rotation = store.lookup_channel(&ROTATION_3D)?;
        Ok(())
    }

    fn update(&mut self, state: &mut ControllerState) -> Result<()> {
        let channel = bound(self.controller, "finalizer controller")?;
        let dt = state.delta_time;
        for i in 0..state.particles.size() {
            let transform = self.particle_transform(state, i)?;
            if let Some(controller) = state.particles.object_mut::<ParticleController>(channel, i)? {
                controller.set_transform(&transform);
                controller.update(dt)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::RegularEmitter;
    use crate::influencers::{ParticleControllerInfluencer, ScaleInfluencer, SpawnInfluencer};
    use crate::values::{RangedNumericValue, ScaledNumericValue, SpawnShapeValue};

    fn one_particle_emitter() -> RegularEmitter {
        RegularEmitter {
            min_particle_count: 1,
            max_particle_count: 1,
            emission: ScaledNumericValue::constant(0.0),
            life: ScaledNumericValue::constant(10.0),
            duration: RangedNumericValue::constant(10.0),
            ..Default::default()
        }
    }

    fn nested_position(parent: &mut ParticleController) -> Vec3 {
        let channel = parent.particles().get_channel(&PARTICLE_CONTROLLER).unwrap();
        let child = parent
            .particles_mut()
            .object_mut::<ParticleController>(channel, 0)
            .unwrap()
            .unwrap();
        child.transform().w_axis.truncate()
    }

    #[test]
    fn missing_controller_channel_is_a_setup_error() {
        let mut finalizer = ControllerFinalizerInfluencer::default();
        let mut state = ControllerState::new(1, 1);
        assert!(matches!(
            finalizer.allocate_channels(&mut state),
            Err(EmberError::MissingChannel(_))
        ));
    }

    #[test]
    fn nested_controller_follows_its_particle() {
        let child = ParticleController::new(
            "child",
            one_particle_emitter(),
            vec![SpawnInfluencer::new(SpawnShapeValue::point(Vec3::ZERO)).into()],
        );
        let mut parent = ParticleController::new(
            "parent",
            one_particle_emitter(),
            vec![
                SpawnInfluencer::new(SpawnShapeValue::point(Vec3::new(2.0, 0.0, 0.0))).into(),
                ScaleInfluencer::new(ScaledNumericValue::constant(3.0)).into(),
                ParticleControllerInfluencer::single(child).into(),
                ControllerFinalizerInfluencer::default().into(),
            ],
        );
        parent.init().unwrap();
        parent.start().unwrap();
        parent.update(0.1).unwrap();

        assert!((nested_position(&mut parent) - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-6);

        let channel = parent.particles().get_channel(&PARTICLE_CONTROLLER).unwrap();
        let child = parent
            .particles_mut()
            .object_mut::<ParticleController>(channel, 0)
            .unwrap()
            .unwrap();
        // The child ran a frame of its own and spawned at the particle
        assert_eq!(child.particles().size(), 1);
        assert!((child.state().scale - Vec3::splat(3.0)).length() < 1e-6);
        let bounds = child.bounding_box();
        assert!((bounds.center() - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-6);
    }
}
