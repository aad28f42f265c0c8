//! Channel registry: the catalogue of per-particle data columns
//!
//! A channel is one strided array in a [`ParticleStore`](crate::store::ParticleStore).
//! Built-in kinds have fixed ids; hosts can register more with [`ChannelDescriptor::register`].
//! Scratch channels (interpolation start/diff pairs) have no global id at all: each
//! request gets a fresh store-local id through [`ScratchShape`].

use ember_core::ChannelId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type stored by a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    /// 32-bit floats, `stride` per particle
    Float,
    /// One opaque object slot per particle
    Object,
}

/// Identifies a channel kind: id, element type and component count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub id: ChannelId,
    pub element: ElementType,
    pub stride: usize,
}

impl ChannelDescriptor {
    pub const fn float(id: ChannelId, stride: usize) -> Self {
        Self {
            id,
            element: ElementType::Float,
            stride,
        }
    }

    pub const fn object(id: ChannelId) -> Self {
        Self {
            id,
            element: ElementType::Object,
            stride: 1,
        }
    }

    /// Register a new permanent channel kind with a fresh global id.
    pub fn register(element: ElementType, stride: usize) -> Self {
        let stride = match element {
            ElementType::Float => stride,
            ElementType::Object => 1,
        };
        Self {
            id: ChannelId::register(),
            element,
            stride,
        }
    }

    /// Human-readable name for built-in kinds, used in error messages and logs
    pub fn name(&self) -> &'static str {
        BUILTIN
            .iter()
            .find(|(d, _)| d.id == self.id)
            .map(|(_, name)| *name)
            .unwrap_or(if self.id.is_scratch() { "scratch" } else { "custom" })
    }

    pub(crate) fn shape(&self) -> String {
        match self.element {
            ElementType::Float => format!("float x{}", self.stride),
            ElementType::Object => "object".to_string(),
        }
    }
}

impl fmt::Display for ChannelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} ({})", self.name(), self.id, self.shape())
    }
}

/// Life: current remaining life, total life, life percent
pub const LIFE: ChannelDescriptor = ChannelDescriptor::float(ChannelId::builtin(0), 3);
pub const POSITION: ChannelDescriptor = ChannelDescriptor::float(ChannelId::builtin(1), 3);
pub const PREVIOUS_POSITION: ChannelDescriptor = ChannelDescriptor::float(ChannelId::builtin(2), 3);
pub const COLOR: ChannelDescriptor = ChannelDescriptor::float(ChannelId::builtin(3), 4);
/// u, v, u2, v2, half width, half height
pub const TEXTURE_REGION: ChannelDescriptor = ChannelDescriptor::float(ChannelId::builtin(4), 6);
/// cosine, sine
pub const ROTATION_2D: ChannelDescriptor = ChannelDescriptor::float(ChannelId::builtin(5), 2);
/// quaternion x, y, z, w
pub const ROTATION_3D: ChannelDescriptor = ChannelDescriptor::float(ChannelId::builtin(6), 4);
pub const SCALE: ChannelDescriptor = ChannelDescriptor::float(ChannelId::builtin(7), 1);
pub const MODEL_INSTANCE: ChannelDescriptor = ChannelDescriptor::object(ChannelId::builtin(8));
pub const PARTICLE_CONTROLLER: ChannelDescriptor = ChannelDescriptor::object(ChannelId::builtin(9));
pub const ACCELERATION: ChannelDescriptor = ChannelDescriptor::float(ChannelId::builtin(10), 3);
/// Degrees per second about Z
pub const ANGULAR_VELOCITY_2D: ChannelDescriptor = ChannelDescriptor::float(ChannelId::builtin(11), 1);
/// Radians per second, axis scaled by rate
pub const ANGULAR_VELOCITY_3D: ChannelDescriptor = ChannelDescriptor::float(ChannelId::builtin(12), 3);

const BUILTIN: [(ChannelDescriptor, &str); 13] = [
    (LIFE, "life"),
    (POSITION, "position"),
    (PREVIOUS_POSITION, "previous_position"),
    (COLOR, "color"),
    (TEXTURE_REGION, "texture_region"),
    (ROTATION_2D, "rotation_2d"),
    (ROTATION_3D, "rotation_3d"),
    (SCALE, "scale"),
    (MODEL_INSTANCE, "model_instance"),
    (PARTICLE_CONTROLLER, "particle_controller"),
    (ACCELERATION, "acceleration"),
    (ANGULAR_VELOCITY_2D, "angular_velocity_2d"),
    (ANGULAR_VELOCITY_3D, "angular_velocity_3d"),
];

/// Look up a built-in channel by name
pub fn builtin_by_name(name: &str) -> Option<ChannelDescriptor> {
    BUILTIN.iter().find(|(_, n)| *n == name).map(|(d, _)| *d)
}

/// Shape of a store-local scratch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchShape {
    /// One start/diff pair
    Interpolation,
    /// Two start/diff pairs
    Interpolation4,
}

impl ScratchShape {
    pub fn stride(&self) -> usize {
        match self {
            ScratchShape::Interpolation => 2,
            ScratchShape::Interpolation4 => 4,
        }
    }
}

/// Per-particle default pattern written into freshly allocated slots
pub(crate) fn initializer_for(descriptor: &ChannelDescriptor) -> Option<&'static [f32]> {
    match descriptor.id {
        id if id == COLOR.id => Some(&[1.0, 1.0, 1.0, 1.0]),
        id if id == SCALE.id => Some(&[1.0]),
        id if id == ROTATION_2D.id => Some(&[1.0, 0.0]),
        id if id == ROTATION_3D.id => Some(&[0.0, 0.0, 0.0, 1.0]),
        id if id == TEXTURE_REGION.id => Some(&[0.0, 0.0, 1.0, 1.0, 0.5, 0.5]),
        _ => None,
    }
}

// Component offsets within each channel's stride

pub const CURRENT_LIFE_OFFSET: usize = 0;
pub const TOTAL_LIFE_OFFSET: usize = 1;
pub const LIFE_PERCENT_OFFSET: usize = 2;

pub const RED_OFFSET: usize = 0;
pub const GREEN_OFFSET: usize = 1;
pub const BLUE_OFFSET: usize = 2;
pub const ALPHA_OFFSET: usize = 3;

pub const INTERPOLATION_START_OFFSET: usize = 0;
pub const INTERPOLATION_DIFF_OFFSET: usize = 1;

pub const THETA_START_OFFSET: usize = 0;
pub const THETA_DIFF_OFFSET: usize = 1;
pub const PHI_START_OFFSET: usize = 2;
pub const PHI_DIFF_OFFSET: usize = 3;

pub const X_OFFSET: usize = 0;
pub const Y_OFFSET: usize = 1;
pub const Z_OFFSET: usize = 2;
pub const W_OFFSET: usize = 3;

pub const U_OFFSET: usize = 0;
pub const V_OFFSET: usize = 1;
pub const U2_OFFSET: usize = 2;
pub const V2_OFFSET: usize = 3;
pub const HALF_WIDTH_OFFSET: usize = 4;
pub const HALF_HEIGHT_OFFSET: usize = 5;

pub const COSINE_OFFSET: usize = 0;
pub const SINE_OFFSET: usize = 1;
