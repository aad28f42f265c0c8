//! Texture region assignment for sprite-sheet particles

use super::interpolation::bound;
use super::Influence;
use crate::channels::{
    HALF_HEIGHT_OFFSET, HALF_WIDTH_OFFSET, LIFE, LIFE_PERCENT_OFFSET, TEXTURE_REGION, U2_OFFSET,
    U_OFFSET, V2_OFFSET, V_OFFSET,
};
use crate::controller::ControllerState;
use crate::store::ChannelHandle;
use ember_core::{EmberError, Result};
use serde::{Deserialize, Serialize};

/// UV rectangle of one sprite frame plus its height/width ratio halved
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureRegion {
    pub u: f32,
    pub v: f32,
    pub u2: f32,
    pub v2: f32,
    pub half_inv_aspect_ratio: f32,
}

impl Default for TextureRegion {
    fn default() -> Self {
        Self {
            u: 0.0,
            v: 0.0,
            u2: 1.0,
            v2: 1.0,
            half_inv_aspect_ratio: 0.5,
        }
    }
}

impl TextureRegion {
    /// Region covering `[u, u2] x [v, v2]` of a `width` x `height` pixel texture
    pub fn new(u: f32, v: f32, u2: f32, v2: f32, width: f32, height: f32) -> Self {
        let w = (u2 - u).abs() * width;
        let h = (v2 - v).abs() * height;
        Self {
            u,
            v,
            u2,
            v2,
            half_inv_aspect_ratio: if w > 0.0 { 0.5 * h / w } else { 0.5 },
        }
    }

    /// Cells of a `columns` x `rows` sprite sheet, row by row
    pub fn grid(columns: u32, rows: u32) -> Vec<Self> {
        let (cw, ch) = (1.0 / columns.max(1) as f32, 1.0 / rows.max(1) as f32);
        (0..rows.max(1))
            .flat_map(|r| (0..columns.max(1)).map(move |c| (c, r)))
            .map(|(c, r)| {
                let (u, v) = (c as f32 * cw, r as f32 * ch);
                Self {
                    u,
                    v,
                    u2: u + cw,
                    v2: v + ch,
                    half_inv_aspect_ratio: 0.5,
                }
            })
            .collect()
    }

    fn write(&self, slot: &mut [f32]) {
        slot[U_OFFSET] = self.u;
        slot[V_OFFSET] = self.v;
        slot[U2_OFFSET] = self.u2;
        slot[V2_OFFSET] = self.v2;
        slot[HALF_WIDTH_OFFSET] = 0.5;
        slot[HALF_HEIGHT_OFFSET] = self.half_inv_aspect_ratio;
    }
}

/// How particles pick their region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionMode {
    /// Every particle uses the first region
    #[default]
    Single,
    /// A random region per particle, fixed at activation
    Random,
    /// Region stepped through the list by life percent, every frame
    Animated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionInfluencer {
    pub mode: RegionMode,
    pub regions: Vec<TextureRegion>,
    #[serde(skip)]
    life: Option<ChannelHandle>,
    #[serde(skip)]
    target: Option<ChannelHandle>,
}

impl Default for RegionInfluencer {
    fn default() -> Self {
        Self::new(RegionMode::Single, vec![TextureRegion::default()])
    }
}

impl RegionInfluencer {
    pub fn new(mode: RegionMode, regions: Vec<TextureRegion>) -> Self {
        Self {
            mode,
            regions,
            life: None,
            target: None,
        }
    }

    pub fn copy(&self) -> Self {
        Self::new(self.mode, self.regions.clone())
    }
}

impl Influence for RegionInfluencer {
    fn allocate_channels(&mut self, state: &mut ControllerState) -> Result<()> {
        if self.regions.is_empty() {
            return Err(EmberError::InvalidConfig("region influencer has no regions".into()));
        }
        self.target = Some(state.particles.add_channel(&TEXTURE_REGION)?);
        if self.mode == RegionMode::Animated {
            self.life = Some(state.particles.add_channel(&LIFE)?);
        }
        Ok(())
    }

    fn activate_particles(&mut self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        let target = bound(self.target, "texture region")?;
        let data = state.particles.floats_mut(target)?;
        let stride = TEXTURE_REGION.stride;
        for slot in data[start * stride..(start + count) * stride].chunks_exact_mut(stride) {
            let index = match self.mode {
                RegionMode::Single | RegionMode::Animated => 0,
                RegionMode::Random => state.rng.index(self.regions.len()),
            };
            self.regions[index].write(slot);
        }
        Ok(())
    }

    fn update(&mut self, state: &mut ControllerState) -> Result<()> {
        if self.mode != RegionMode::Animated {
            return Ok(());
        }
        let life = bound(self.life, "region life")?;
        let target = bound(self.target, "texture region")?;
        let size = state.particles.size();
        let last = self.regions.len() - 1;
        let [life_data, data] = state.particles.floats_many_mut([life, target])?;
        let stride = TEXTURE_REGION.stride;
        for i in 0..size {
            let percent = life_data[i * LIFE.stride + LIFE_PERCENT_OFFSET];
            let index = ((percent * last as f32) as usize).min(last);
            self.regions[index].write(&mut data[i * stride..(i + 1) * stride]);
        }
        Ok(())
    }
}
