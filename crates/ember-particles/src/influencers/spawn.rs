//! Spawn influencer: places new particles on the configured shape

use super::interpolation::bound;
use super::Influence;
use crate::channels::{POSITION, X_OFFSET, Y_OFFSET, Z_OFFSET};
use crate::controller::ControllerState;
use crate::store::ChannelHandle;
use crate::values::SpawnShapeValue;
use ember_core::Result;
use serde::{Deserialize, Serialize};

/// Writes each new particle's world position, sampled from `shape` and moved by
/// the controller transform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnInfluencer {
    pub shape: SpawnShapeValue,
    #[serde(skip)]
    position: Option<ChannelHandle>,
}

impl SpawnInfluencer {
    pub fn new(shape: SpawnShapeValue) -> Self {
        Self {
            shape,
            position: None,
        }
    }

    pub fn copy(&self) -> Self {
        Self::new(self.shape.clone())
    }
}

impl Influence for SpawnInfluencer {
    fn allocate_channels(&mut self, state: &mut ControllerState) -> Result<()> {
        self.position = Some(state.particles.add_channel(&POSITION)?);
        Ok(())
    }

    fn init(&mut self, _state: &mut ControllerState) -> Result<()> {
        self.shape.validate()
    }

    fn start(&mut self, state: &mut ControllerState) -> Result<()> {
        self.shape.start(&mut state.rng);
        Ok(())
    }

    fn activate_particles(&mut self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        let handle = bound(self.position, "spawn position")?;
        let percent = state.emitter_percent;
        let transform = state.transform;
        let positions = state.particles.floats_mut(handle)?;
        let stride = POSITION.stride;
        for slot in positions[start * stride..(start + count) * stride].chunks_exact_mut(stride) {
            let p = transform.transform_point3(self.shape.spawn(&mut state.rng, percent));
            slot[X_OFFSET] = p.x;
            slot[Y_OFFSET] = p.y;
            slot[Z_OFFSET] = p.z;
        }
        Ok(())
    }
}
