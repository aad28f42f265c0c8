//! Single-value influencers: one float component driven over each particle's life

use super::interpolation::{bound, LifetimeTrack};
use super::Influence;
use crate::channels::{builtin_by_name, ChannelDescriptor, ElementType, LIFE, LIFE_PERCENT_OFFSET, SCALE};
use crate::controller::ControllerState;
use crate::store::ChannelHandle;
use crate::values::ScaledNumericValue;
use ember_core::{EmberError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default)]
struct SimpleBinding {
    life: Option<ChannelHandle>,
    target: Option<ChannelHandle>,
    component: usize,
}

fn bind_simple(
    track: &mut LifetimeTrack,
    state: &mut ControllerState,
    target: &ChannelDescriptor,
    component: usize,
) -> Result<SimpleBinding> {
    track.value.validate(target.name())?;
    let binding = SimpleBinding {
        life: Some(state.particles.add_channel(&LIFE)?),
        target: Some(state.particles.add_channel(target)?),
        component,
    };
    track.allocate(&mut state.particles);
    Ok(binding)
}

/// Sample the track for new particles and write their value at life percent 0.
fn activate_simple(
    track: &LifetimeTrack,
    binding: SimpleBinding,
    state: &mut ControllerState,
    start: usize,
    count: usize,
    factor: f32,
) -> Result<()> {
    track.activate_scaled(state, start, count, factor)?;
    let target = bound(binding.target, "simple influencer target")?;
    let [interp, values] = state.particles.floats_many_mut([track.channel()?, target])?;
    for i in start..start + count {
        values[i * target.stride + binding.component] = track.at(interp, i, 0.0);
    }
    Ok(())
}

fn update_simple(track: &LifetimeTrack, binding: SimpleBinding, state: &mut ControllerState) -> Result<()> {
    let life = bound(binding.life, "simple influencer life")?;
    let target = bound(binding.target, "simple influencer target")?;
    let size = state.particles.size();
    let [life_data, interp, values] = state.particles.floats_many_mut([life, track.channel()?, target])?;
    for i in 0..size {
        let percent = life_data[i * LIFE.stride + LIFE_PERCENT_OFFSET];
        values[i * target.stride + binding.component] = track.at(interp, i, percent);
    }
    Ok(())
}

/// Drives one component of any float channel, looked up by name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleInfluencer {
    /// Name of a built-in float channel, e.g. `"scale"`
    pub channel: String,
    /// Component within the channel's stride
    pub component: usize,
    pub value: LifetimeTrack,
    #[serde(skip)]
    binding: SimpleBinding,
}

impl Default for SimpleInfluencer {
    fn default() -> Self {
        Self::new(SCALE.name(), 0, ScaledNumericValue::constant(1.0))
    }
}

impl SimpleInfluencer {
    pub fn new(channel: impl Into<String>, component: usize, value: ScaledNumericValue) -> Self {
        Self {
            channel: channel.into(),
            component,
            value: LifetimeTrack::new(value),
            binding: SimpleBinding::default(),
        }
    }

    pub fn copy(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            component: self.component,
            value: self.value.copy(),
            binding: SimpleBinding::default(),
        }
    }

    fn target(&self) -> Result<ChannelDescriptor> {
        let descriptor = builtin_by_name(&self.channel)
            .ok_or_else(|| EmberError::InvalidConfig(format!("unknown channel '{}'", self.channel)))?;
        if descriptor.element != ElementType::Float || self.component >= descriptor.stride {
            return Err(EmberError::InvalidConfig(format!(
                "channel '{}' has no float component {}",
                self.channel, self.component
            )));
        }
        Ok(descriptor)
    }
}

impl Influence for SimpleInfluencer {
    fn allocate_channels(&mut self, state: &mut ControllerState) -> Result<()> {
        let target = self.target()?;
        self.binding = bind_simple(&mut self.value, state, &target, self.component)?;
        Ok(())
    }

    fn activate_particles(&mut self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        activate_simple(&self.value, self.binding, state, start, count, 1.0)
    }

    fn update(&mut self, state: &mut ControllerState) -> Result<()> {
        update_simple(&self.value, self.binding, state)
    }
}

/// Drives the Scale channel, multiplied by the controller's scale
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleInfluencer {
    pub value: LifetimeTrack,
    #[serde(skip)]
    binding: SimpleBinding,
}

impl ScaleInfluencer {
    pub fn new(value: ScaledNumericValue) -> Self {
        Self {
            value: LifetimeTrack::new(value),
            binding: SimpleBinding::default(),
        }
    }

    pub fn copy(&self) -> Self {
        Self::new(self.value.value.clone())
    }
}

impl Influence for ScaleInfluencer {
    fn allocate_channels(&mut self, state: &mut ControllerState) -> Result<()> {
        self.binding = bind_simple(&mut self.value, state, &SCALE, 0)?;
        Ok(())
    }

    fn activate_particles(&mut self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        let factor = state.scale.x;
        activate_simple(&self.value, self.binding, state, start, count, factor)
    }

    fn update(&mut self, state: &mut ControllerState) -> Result<()> {
        update_simple(&self.value, self.binding, state)
    }
}
