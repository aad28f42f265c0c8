//! Influencers: the ordered simulation stages of a particle controller
//!
//! Every stage implements [`Influence`]. The controller calls the hooks in list
//! order, so a stage may only read channels created by stages before it.

mod color;
mod controller;
pub mod dynamics;
mod finalizer;
mod interpolation;
mod region;
mod simple;
mod spawn;

pub use color::{ColorInfluencer, RandomColorInfluencer};
pub use controller::{
    ControllerMode, ControllerPool, ParticleControllerInfluencer, PoolStats, TemplateRef,
    TemplateResolver,
};
pub use dynamics::{DynamicsInfluencer, DynamicsModifier};
pub use finalizer::ControllerFinalizerInfluencer;
pub use interpolation::{spherical_direction, AngularTrack, LifetimeTrack};
pub use region::{RegionInfluencer, RegionMode, TextureRegion};
pub use simple::{ScaleInfluencer, SimpleInfluencer};
pub use spawn::SpawnInfluencer;

use crate::controller::ControllerState;
use ember_core::{EmberError, Result};
use serde::{Deserialize, Serialize};

/// Lifecycle hooks of one simulation stage.
///
/// `allocate_channels` runs once per store build and must resolve every channel
/// the stage touches; the per-particle hooks receive half-open index ranges.
pub trait Influence {
    fn allocate_channels(&mut self, state: &mut ControllerState) -> Result<()>;

    fn init(&mut self, _state: &mut ControllerState) -> Result<()> {
        Ok(())
    }

    fn start(&mut self, _state: &mut ControllerState) -> Result<()> {
        Ok(())
    }

    fn end(&mut self, _state: &mut ControllerState) -> Result<()> {
        Ok(())
    }

    fn activate_particles(&mut self, _state: &mut ControllerState, _start: usize, _count: usize) -> Result<()> {
        Ok(())
    }

    fn kill_particles(&mut self, _state: &mut ControllerState, _start: usize, _count: usize) -> Result<()> {
        Ok(())
    }

    fn update(&mut self, _state: &mut ControllerState) -> Result<()> {
        Ok(())
    }

    fn dispose(&mut self, _state: &mut ControllerState) -> Result<()> {
        Ok(())
    }
}

/// Any influencer, tagged by `type` in effect files
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Influencer {
    Spawn(SpawnInfluencer),
    Simple(SimpleInfluencer),
    Scale(ScaleInfluencer),
    Color(ColorInfluencer),
    RandomColor(RandomColorInfluencer),
    Region(RegionInfluencer),
    Dynamics(DynamicsInfluencer),
    ParticleController(ParticleControllerInfluencer),
    ControllerFinalizer(ControllerFinalizerInfluencer),
}

impl Influencer {
    /// The `type` tag this influencer is saved under
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Spawn(_) => "spawn",
            Self::Simple(_) => "simple",
            Self::Scale(_) => "scale",
            Self::Color(_) => "color",
            Self::RandomColor(_) => "random_color",
            Self::Region(_) => "region",
            Self::Dynamics(_) => "dynamics",
            Self::ParticleController(_) => "particle_controller",
            Self::ControllerFinalizer(_) => "controller_finalizer",
        }
    }

    pub fn stage(&self) -> &dyn Influence {
        match self {
            Self::Spawn(s) => s,
            Self::Simple(s) => s,
            Self::Scale(s) => s,
            Self::Color(s) => s,
            Self::RandomColor(s) => s,
            Self::Region(s) => s,
            Self::Dynamics(s) => s,
            Self::ParticleController(s) => s,
            Self::ControllerFinalizer(s) => s,
        }
    }

    pub fn stage_mut(&mut self) -> &mut dyn Influence {
        match self {
            Self::Spawn(s) => s,
            Self::Simple(s) => s,
            Self::Scale(s) => s,
            Self::Color(s) => s,
            Self::RandomColor(s) => s,
            Self::Region(s) => s,
            Self::Dynamics(s) => s,
            Self::ParticleController(s) => s,
            Self::ControllerFinalizer(s) => s,
        }
    }

    /// Configuration-only copy. Channel bindings and runtime state are not carried.
    pub fn copy(&self) -> Self {
        match self {
            Self::Spawn(s) => Self::Spawn(s.copy()),
            Self::Simple(s) => Self::Simple(s.copy()),
            Self::Scale(s) => Self::Scale(s.copy()),
            Self::Color(s) => Self::Color(s.copy()),
            Self::RandomColor(s) => Self::RandomColor(s.copy()),
            Self::Region(s) => Self::Region(s.copy()),
            Self::Dynamics(s) => Self::Dynamics(s.copy()),
            Self::ParticleController(s) => Self::ParticleController(s.copy()),
            Self::ControllerFinalizer(_) => Self::ControllerFinalizer(ControllerFinalizerInfluencer::default()),
        }
    }

    /// Serialize this influencer's configuration into a TOML table
    pub fn write(&self) -> Result<toml::Table> {
        match toml::Value::try_from(self)? {
            toml::Value::Table(table) => Ok(table),
            other => Err(EmberError::TomlSerError(format!(
                "influencer serialized to a {}",
                other.type_str()
            ))),
        }
    }

    /// Rebuild an influencer from a table produced by [`Influencer::write`]
    pub fn read(table: toml::Table) -> Result<Self> {
        Ok(toml::Value::Table(table).try_into()?)
    }
}

impl Influence for Influencer {
    fn allocate_channels(&mut self, state: &mut ControllerState) -> Result<()> {
        self.stage_mut().allocate_channels(state)
    }

    fn init(&mut self, state: &mut ControllerState) -> Result<()> {
        self.stage_mut().init(state)
    }

    fn start(&mut self, state: &mut ControllerState) -> Result<()> {
        self.stage_mut().start(state)
    }

    fn end(&mut self, state: &mut ControllerState) -> Result<()> {
        self.stage_mut().end(state)
    }

    fn activate_particles(&mut self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        self.stage_mut().activate_particles(state, start, count)
    }

    fn kill_particles(&mut self, state: &mut ControllerState, start: usize, count: usize) -> Result<()> {
        self.stage_mut().kill_particles(state, start, count)
    }

    fn update(&mut self, state: &mut ControllerState) -> Result<()> {
        self.stage_mut().update(state)
    }

    fn dispose(&mut self, state: &mut ControllerState) -> Result<()> {
        self.stage_mut().dispose(state)
    }
}

macro_rules! impl_from_stage {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Influencer {
                fn from(stage: $ty) -> Self {
                    Self::$variant(stage)
                }
            }
        )*
    };
}

impl_from_stage!(
    Spawn(SpawnInfluencer),
    Simple(SimpleInfluencer),
    Scale(ScaleInfluencer),
    Color(ColorInfluencer),
    RandomColor(RandomColorInfluencer),
    Region(RegionInfluencer),
    Dynamics(DynamicsInfluencer),
    ParticleController(ParticleControllerInfluencer),
    ControllerFinalizer(ControllerFinalizerInfluencer),
);
