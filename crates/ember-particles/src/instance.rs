//! Render instances: live particles flattened for instanced draw calls

use crate::channels::{
    ALPHA_OFFSET, BLUE_OFFSET, COLOR, COSINE_OFFSET, GREEN_OFFSET, HALF_HEIGHT_OFFSET,
    HALF_WIDTH_OFFSET, PARTICLE_CONTROLLER, POSITION, RED_OFFSET, ROTATION_2D, ROTATION_3D,
    SCALE, SINE_OFFSET, TEXTURE_REGION, U2_OFFSET, U_OFFSET, V2_OFFSET, V_OFFSET, W_OFFSET,
    X_OFFSET, Y_OFFSET, Z_OFFSET,
};
use crate::controller::ParticleController;
use bytemuck::{Pod, Zeroable};
use ember_core::Result;
use glam::Quat;

/// GPU instance data, 80 bytes (5 rows of vec4).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ParticleInstance {
    pub pos_scale: [f32; 4], // xyz = position, w = scale
    pub color: [f32; 4],     // rgba
    pub rotation: [f32; 4],  // quaternion xyzw
    pub region_uv: [f32; 4], // u, v, u2, v2
    pub extent: [f32; 4],    // x = half width, y = half height
}

impl Default for ParticleInstance {
    fn default() -> Self {
        Self {
            pos_scale: [0.0, 0.0, 0.0, 1.0],
            color: [1.0; 4],
            rotation: [0.0, 0.0, 0.0, 1.0],
            region_uv: [0.0, 0.0, 1.0, 1.0],
            extent: [0.5, 0.5, 0.0, 0.0],
        }
    }
}

/// Append one instance per live particle of `controller`, then recurse into any
/// nested controllers. Channels the controller lacks keep their defaults; without
/// a Position channel particles sit at the controller origin.
///
/// Returns the number of instances written.
pub fn pack_controller(controller: &ParticleController, out: &mut Vec<ParticleInstance>) -> Result<usize> {
    let store = controller.particles();
    let size = store.size();
    let origin = controller.state().origin();
    let first = out.len();

    let position = store.lookup_channel(&POSITION)?.map(|h| store.floats(h)).transpose()?;
    let scale = store.lookup_channel(&SCALE)?.map(|h| store.floats(h)).transpose()?;
    let color = store.lookup_channel(&COLOR)?.map(|h| store.floats(h)).transpose()?;
    let rotation_2d = store.lookup_channel(&ROTATION_2D)?.map(|h| store.floats(h)).transpose()?;
    let rotation_3d = store.lookup_channel(&ROTATION_3D)?.map(|h| store.floats(h)).transpose()?;
    let region = store.lookup_channel(&TEXTURE_REGION)?.map(|h| store.floats(h)).transpose()?;

    out.reserve(size);
    for i in 0..size {
        let mut instance = ParticleInstance::default();
        match position {
            Some(p) => {
                let k = i * POSITION.stride;
                instance.pos_scale[..3].copy_from_slice(&[p[k + X_OFFSET], p[k + Y_OFFSET], p[k + Z_OFFSET]]);
            }
            None => instance.pos_scale[..3].copy_from_slice(&origin.to_array()),
        }
        if let Some(s) = scale {
            instance.pos_scale[3] = s[i * SCALE.stride];
        }
        if let Some(c) = color {
            let k = i * COLOR.stride;
            instance.color = [c[k + RED_OFFSET], c[k + GREEN_OFFSET], c[k + BLUE_OFFSET], c[k + ALPHA_OFFSET]];
        }
        if let Some(r) = rotation_3d {
            let k = i * ROTATION_3D.stride;
            instance.rotation = [r[k + X_OFFSET], r[k + Y_OFFSET], r[k + Z_OFFSET], r[k + W_OFFSET]];
        } else if let Some(r) = rotation_2d {
            let k = i * ROTATION_2D.stride;
            let angle = r[k + SINE_OFFSET].atan2(r[k + COSINE_OFFSET]);
            instance.rotation = Quat::from_rotation_z(angle).to_array();
        }
        if let Some(t) = region {
            let k = i * TEXTURE_REGION.stride;
            instance.region_uv = [t[k + U_OFFSET], t[k + V_OFFSET], t[k + U2_OFFSET], t[k + V2_OFFSET]];
            instance.extent[0] = t[k + HALF_WIDTH_OFFSET];
            instance.extent[1] = t[k + HALF_HEIGHT_OFFSET];
        }
        out.push(instance);
    }

    if let Some(handle) = store.lookup_channel(&PARTICLE_CONTROLLER)? {
        for slot in &store.objects(handle)?[..size] {
            if let Some(nested) = slot.as_ref().and_then(|s| s.downcast_ref::<ParticleController>()) {
                pack_controller(nested, out)?;
            }
        }
    }

    Ok(out.len() - first)
}
