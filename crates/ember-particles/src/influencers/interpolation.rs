//! Per-particle interpolation tracks shared by influencers and dynamics modifiers
//!
//! A track samples a `(start, diff)` pair per particle at activation into a private
//! scratch channel, and evaluates `start + diff * curve(life_percent)` afterwards.

use crate::channels::{
    ScratchShape, INTERPOLATION_DIFF_OFFSET, INTERPOLATION_START_OFFSET, PHI_DIFF_OFFSET,
    PHI_START_OFFSET, THETA_DIFF_OFFSET, THETA_START_OFFSET,
};
use crate::controller::ControllerState;
use crate::store::{ChannelHandle, ParticleStore};
use crate::values::ScaledNumericValue;
use ember_core::{EmberError, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

pub(crate) fn bound(handle: Option<ChannelHandle>, what: &str) -> Result<ChannelHandle> {
    handle.ok_or_else(|| EmberError::ChannelNotBound(what.to_string()))
}

/// Unit direction for polar angle `theta` and azimuth `phi`, both in degrees
pub fn spherical_direction(theta: f32, phi: f32) -> Vec3 {
    let (sin_theta, cos_theta) = theta.to_radians().sin_cos();
    let (sin_phi, cos_phi) = phi.to_radians().sin_cos();
    Vec3::new(cos_theta * sin_phi, cos_phi, sin_theta * sin_phi)
}

/// One scalar interpolated over each particle's life
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LifetimeTrack {
    pub value: ScaledNumericValue,
    #[serde(skip)]
    channel: Option<ChannelHandle>,
}

impl LifetimeTrack {
    pub fn new(value: ScaledNumericValue) -> Self {
        Self {
            value,
            channel: None,
        }
    }

    pub fn copy(&self) -> Self {
        Self::new(self.value.clone())
    }

    pub fn allocate(&mut self, store: &mut ParticleStore) {
        self.channel = Some(store.add_scratch_channel(ScratchShape::Interpolation));
    }

    pub fn channel(&self) -> Result<ChannelHandle> {
        bound(self.channel, "lifetime track")
    }

    pub fn activate(&self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        self.activate_scaled(state, start, count, 1.0)
    }

    /// Sample `(start, diff)` for `[start, start + count)`, both multiplied by `factor`.
    pub fn activate_scaled(
        &self,
        state: &mut ControllerState,
        start: usize,
        count: usize,
        factor: f32,
    ) -> Result<()> {
        let handle = self.channel()?;
        let data = state.particles.floats_mut(handle)?;
        let stride = handle.stride;
        for slot in data[start * stride..(start + count) * stride].chunks_exact_mut(stride) {
            let (s, d) = self.value.sample_pair(&mut state.rng);
            slot[INTERPOLATION_START_OFFSET] = s * factor;
            slot[INTERPOLATION_DIFF_OFFSET] = d * factor;
        }
        Ok(())
    }

    /// Value for `particle` at `life_percent`, reading this track's column `data`
    #[inline]
    pub fn at(&self, data: &[f32], particle: usize, life_percent: f32) -> f32 {
        let k = particle * ScratchShape::Interpolation.stride();
        self.value.interpolate(
            data[k + INTERPOLATION_START_OFFSET],
            data[k + INTERPOLATION_DIFF_OFFSET],
            life_percent,
        )
    }
}

/// Two angles (theta, phi) interpolated over each particle's life
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AngularTrack {
    pub theta: ScaledNumericValue,
    pub phi: ScaledNumericValue,
    #[serde(skip)]
    channel: Option<ChannelHandle>,
}

impl Default for AngularTrack {
    fn default() -> Self {
        Self::new(ScaledNumericValue::constant(0.0), ScaledNumericValue::constant(0.0))
    }
}

impl AngularTrack {
    pub fn new(theta: ScaledNumericValue, phi: ScaledNumericValue) -> Self {
        Self {
            theta,
            phi,
            channel: None,
        }
    }

    pub fn copy(&self) -> Self {
        Self::new(self.theta.clone(), self.phi.clone())
    }

    pub fn allocate(&mut self, store: &mut ParticleStore) {
        self.channel = Some(store.add_scratch_channel(ScratchShape::Interpolation4));
    }

    pub fn channel(&self) -> Result<ChannelHandle> {
        bound(self.channel, "angular track")
    }

    pub fn activate(&self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        let handle = self.channel()?;
        let data = state.particles.floats_mut(handle)?;
        let stride = handle.stride;
        for slot in data[start * stride..(start + count) * stride].chunks_exact_mut(stride) {
            let (theta, theta_diff) = self.theta.sample_pair(&mut state.rng);
            let (phi, phi_diff) = self.phi.sample_pair(&mut state.rng);
            slot[THETA_START_OFFSET] = theta;
            slot[THETA_DIFF_OFFSET] = theta_diff;
            slot[PHI_START_OFFSET] = phi;
            slot[PHI_DIFF_OFFSET] = phi_diff;
        }
        Ok(())
    }

    /// `(theta, phi)` in degrees for `particle` at `life_percent`
    pub fn angles(&self, data: &[f32], particle: usize, life_percent: f32) -> (f32, f32) {
        let k = particle * ScratchShape::Interpolation4.stride();
        (
            self.theta
                .interpolate(data[k + THETA_START_OFFSET], data[k + THETA_DIFF_OFFSET], life_percent),
            self.phi
                .interpolate(data[k + PHI_START_OFFSET], data[k + PHI_DIFF_OFFSET], life_percent),
        )
    }

    pub fn direction(&self, data: &[f32], particle: usize, life_percent: f32) -> Vec3 {
        let (theta, phi) = self.angles(data, particle, life_percent);
        spherical_direction(theta, phi)
    }
}
