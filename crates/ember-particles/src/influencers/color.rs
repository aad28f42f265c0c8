//! Color influencers

use super::interpolation::{bound, LifetimeTrack};
use super::Influence;
use crate::channels::{
    ALPHA_OFFSET, BLUE_OFFSET, COLOR, GREEN_OFFSET, LIFE, LIFE_PERCENT_OFFSET, RED_OFFSET,
};
use crate::controller::ControllerState;
use crate::store::ChannelHandle;
use crate::values::{GradientColorValue, ScaledNumericValue};
use ember_core::Result;
use serde::{Deserialize, Serialize};

fn write_color(slot: &mut [f32], rgb: [f32; 3], alpha: f32) {
    slot[RED_OFFSET] = rgb[0];
    slot[GREEN_OFFSET] = rgb[1];
    slot[BLUE_OFFSET] = rgb[2];
    slot[ALPHA_OFFSET] = alpha;
}

/// RGB from a gradient and alpha from a curve, both over each particle's life
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorInfluencer {
    pub color: GradientColorValue,
    pub alpha: LifetimeTrack,
    #[serde(skip)]
    life: Option<ChannelHandle>,
    #[serde(skip)]
    target: Option<ChannelHandle>,
}

impl Default for ColorInfluencer {
    fn default() -> Self {
        Self::new(GradientColorValue::default(), ScaledNumericValue::constant(1.0))
    }
}

impl ColorInfluencer {
    pub fn new(color: GradientColorValue, alpha: ScaledNumericValue) -> Self {
        Self {
            color,
            alpha: LifetimeTrack::new(alpha),
            life: None,
            target: None,
        }
    }

    pub fn copy(&self) -> Self {
        Self::new(self.color.clone(), self.alpha.value.clone())
    }
}

impl Influence for ColorInfluencer {
    fn allocate_channels(&mut self, state: &mut ControllerState) -> Result<()> {
        self.color.validate()?;
        self.alpha.value.validate("alpha")?;
        self.life = Some(state.particles.add_channel(&LIFE)?);
        self.target = Some(state.particles.add_channel(&COLOR)?);
        self.alpha.allocate(&mut state.particles);
        Ok(())
    }

    fn activate_particles(&mut self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        self.alpha.activate(state, start, count)?;
        let target = bound(self.target, "color")?;
        let rgb = self.color.color(0.0);
        let [interp, colors] = state.particles.floats_many_mut([self.alpha.channel()?, target])?;
        for i in start..start + count {
            let k = i * COLOR.stride;
            write_color(&mut colors[k..k + COLOR.stride], rgb, self.alpha.at(interp, i, 0.0));
        }
        Ok(())
    }

    fn update(&mut self, state: &mut ControllerState) -> Result<()> {
        let life = bound(self.life, "color life")?;
        let target = bound(self.target, "color")?;
        let size = state.particles.size();
        let [life_data, interp, colors] =
            state.particles.floats_many_mut([life, self.alpha.channel()?, target])?;
        for i in 0..size {
            let percent = life_data[i * LIFE.stride + LIFE_PERCENT_OFFSET];
            let k = i * COLOR.stride;
            write_color(
                &mut colors[k..k + COLOR.stride],
                self.color.color(percent),
                self.alpha.at(interp, i, percent),
            );
        }
        Ok(())
    }
}

/// Uniformly random RGBA, fixed at activation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RandomColorInfluencer {
    #[serde(skip)]
    target: Option<ChannelHandle>,
}

impl RandomColorInfluencer {
    pub fn copy(&self) -> Self {
        Self::default()
    }
}

impl Influence for RandomColorInfluencer {
    fn allocate_channels(&mut self, state: &mut ControllerState) -> Result<()> {
        self.target = Some(state.particles.add_channel(&COLOR)?);
        Ok(())
    }

    fn activate_particles(&mut self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        let target = bound(self.target, "random color")?;
        let colors = state.particles.floats_mut(target)?;
        let stride = COLOR.stride;
        for slot in colors[start * stride..(start + count) * stride].chunks_exact_mut(stride) {
            let rgb = [state.rng.next_f32(), state.rng.next_f32(), state.rng.next_f32()];
            write_color(slot, rgb, state.rng.next_f32());
        }
        Ok(())
    }
}
