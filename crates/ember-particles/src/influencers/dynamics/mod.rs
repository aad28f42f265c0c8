//! Dynamics influencer: runs its modifiers, then integrates what they accumulated
//!
//! Position uses Verlet integration against PreviousPosition. A 2D angular
//! velocity (degrees per second) rotates the (cos, sin) pair in Rotation2D; a 3D
//! one (radians per second) is integrated into the Rotation3D quaternion.

mod modifiers;

pub use modifiers::{AngularModifier, DynamicsModifier, FaceDirection, StrengthModifier};

use super::interpolation::bound;
use super::Influence;
use crate::channels::{
    ACCELERATION, ANGULAR_VELOCITY_2D, ANGULAR_VELOCITY_3D, COSINE_OFFSET, POSITION,
    PREVIOUS_POSITION, ROTATION_2D, ROTATION_3D, SINE_OFFSET, W_OFFSET, X_OFFSET, Y_OFFSET,
    Z_OFFSET,
};
use crate::controller::ControllerState;
use crate::store::ChannelHandle;
use ember_core::Result;
use glam::{Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Spin {
    #[default]
    None,
    Planar,
    Spatial,
}

#[derive(Debug, Clone, Copy, Default)]
struct IntegratorChannels {
    acceleration: Option<ChannelHandle>,
    position: Option<ChannelHandle>,
    previous_position: Option<ChannelHandle>,
    angular_velocity: Option<ChannelHandle>,
    rotation: Option<ChannelHandle>,
    spin: Spin,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicsInfluencer {
    pub modifiers: Vec<DynamicsModifier>,
    #[serde(skip)]
    channels: IntegratorChannels,
}

impl DynamicsInfluencer {
    pub fn new(modifiers: Vec<DynamicsModifier>) -> Self {
        Self {
            modifiers,
            channels: IntegratorChannels::default(),
        }
    }

    pub fn copy(&self) -> Self {
        Self::new(self.modifiers.iter().map(DynamicsModifier::copy).collect())
    }

    fn integrate_position(&self, state: &mut ControllerState) -> Result<()> {
        let Some(acceleration) = self.channels.acceleration else {
            return Ok(());
        };
        let position = bound(self.channels.position, "dynamics position")?;
        let previous = bound(self.channels.previous_position, "dynamics previous position")?;
        let dt2 = state.delta_time_sqr;
        let size = state.particles.size();
        let [pos, prev, acc] = state.particles.floats_many_mut([position, previous, acceleration])?;
        for k in (0..size * 3).step_by(3) {
            for axis in [X_OFFSET, Y_OFFSET, Z_OFFSET] {
                let current = pos[k + axis];
                pos[k + axis] = 2.0 * current - prev[k + axis] + acc[k + axis] * dt2;
                prev[k + axis] = current;
            }
        }
        Ok(())
    }

    fn integrate_rotation(&self, state: &mut ControllerState) -> Result<()> {
        if self.channels.spin == Spin::None {
            return Ok(());
        }
        let velocity = bound(self.channels.angular_velocity, "angular velocity")?;
        let rotation = bound(self.channels.rotation, "rotation")?;
        let dt = state.delta_time;
        let size = state.particles.size();
        let [rot, vel] = state.particles.floats_many_mut([rotation, velocity])?;
        match self.channels.spin {
            Spin::Planar => {
                for i in 0..size {
                    let degrees = vel[i] * dt;
                    if degrees == 0.0 {
                        continue;
                    }
                    let (sin_b, cos_b) = degrees.to_radians().sin_cos();
                    let k = i * ROTATION_2D.stride;
                    let (c, s) = (rot[k + COSINE_OFFSET], rot[k + SINE_OFFSET]);
                    rot[k + COSINE_OFFSET] = c * cos_b - s * sin_b;
                    rot[k + SINE_OFFSET] = s * cos_b + c * sin_b;
                }
            }
            Spin::Spatial => {
                for i in 0..size {
                    let k = i * ANGULAR_VELOCITY_3D.stride;
                    let omega = Vec3::new(vel[k + X_OFFSET], vel[k + Y_OFFSET], vel[k + Z_OFFSET]);
                    if omega == Vec3::ZERO {
                        continue;
                    }
                    let r = i * ROTATION_3D.stride;
                    let q = Quat::from_xyzw(
                        rot[r + X_OFFSET],
                        rot[r + Y_OFFSET],
                        rot[r + Z_OFFSET],
                        rot[r + W_OFFSET],
                    );
                    let next = integrate_quat(q, omega, dt);
                    rot[r + X_OFFSET] = next.x;
                    rot[r + Y_OFFSET] = next.y;
                    rot[r + Z_OFFSET] = next.z;
                    rot[r + W_OFFSET] = next.w;
                }
            }
            Spin::None => {}
        }
        Ok(())
    }
}

/// One explicit step of `dq/dt = 0.5 * (omega, 0) * q`, renormalized
fn integrate_quat(q: Quat, omega: Vec3, dt: f32) -> Quat {
    // Hamilton product with a pure quaternion
    let spin = Vec4::new(
        omega.x * q.w + omega.y * q.z - omega.z * q.y,
        -omega.x * q.z + omega.y * q.w + omega.z * q.x,
        omega.x * q.y - omega.y * q.x + omega.z * q.w,
        -(omega.x * q.x + omega.y * q.y + omega.z * q.z),
    );
    let next = (Vec4::from(q) + spin * (0.5 * dt)).normalize_or_zero();
    if next == Vec4::ZERO {
        Quat::IDENTITY
    } else {
        Quat::from_vec4(next)
    }
}

impl Influence for DynamicsInfluencer {
    fn allocate_channels(&mut self, state: &mut ControllerState) -> Result<()> {
        for modifier in &mut self.modifiers {
            modifier.allocate_channels(state)?;
        }
        let store = &mut state.particles;
        let mut channels = IntegratorChannels {
            acceleration: store.lookup_channel(&ACCELERATION)?,
            ..Default::default()
        };
        if channels.acceleration.is_some() {
            channels.position = Some(store.add_channel(&POSITION)?);
            channels.previous_position = Some(store.add_channel(&PREVIOUS_POSITION)?);
        }
        if let Some(velocity) = store.lookup_channel(&ANGULAR_VELOCITY_2D)? {
            channels.angular_velocity = Some(velocity);
            channels.rotation = Some(store.add_channel(&ROTATION_2D)?);
            channels.spin = Spin::Planar;
        } else if let Some(velocity) = store.lookup_channel(&ANGULAR_VELOCITY_3D)? {
            channels.angular_velocity = Some(velocity);
            channels.rotation = Some(store.add_channel(&ROTATION_3D)?);
            channels.spin = Spin::Spatial;
        }
        self.channels = channels;
        Ok(())
    }

    fn activate_particles(&mut self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        if self.channels.acceleration.is_some() {
            let position = bound(self.channels.position, "dynamics position")?;
            let previous = bound(self.channels.previous_position, "dynamics previous position")?;
            let [pos, prev] = state.particles.floats_many_mut([position, previous])?;
            let range = start * 3..(start + count) * 3;
            prev[range.clone()].copy_from_slice(&pos[range]);
        }
        if let Some(rotation) = self.channels.rotation {
            let rot = state.particles.floats_mut(rotation)?;
            let identity: &[f32] = match self.channels.spin {
                Spin::Planar => &[1.0, 0.0],
                _ => &[0.0, 0.0, 0.0, 1.0],
            };
            let stride = rotation.stride;
            for slot in rot[start * stride..(start + count) * stride].chunks_exact_mut(stride) {
                slot.copy_from_slice(identity);
            }
        }
        for modifier in &self.modifiers {
            modifier.activate_particles(state, start, count)?;
        }
        Ok(())
    }

    fn update(&mut self, state: &mut ControllerState) -> Result<()> {
        let size = state.particles.size();
        for handle in [self.channels.acceleration, self.channels.angular_velocity]
            .into_iter()
            .flatten()
        {
            state.particles.floats_mut(handle)?[..size * handle.stride].fill(0.0);
        }
        for modifier in &self.modifiers {
            modifier.update(state)?;
        }
        self.integrate_position(state)?;
        self.integrate_rotation(state)
    }
}
