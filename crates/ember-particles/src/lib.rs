//! Ember Particles - channel-based particle simulation
//!
//! Provides column-oriented particle simulation with:
//! - A registry of typed channels and a parallel-array particle store
//! - An emitter plus an ordered list of influencers sharing that store
//! - Dynamics modifiers accumulating acceleration and angular velocity
//! - Nested particle controllers, pooled or per-particle
//! - TOML effect definitions and GPU instance packing

pub mod channels;
pub mod controller;
pub mod effect;
pub mod emitter;
pub mod influencers;
pub mod instance;
pub mod rand;
pub mod store;
pub mod system;
pub mod values;

pub use channels::{ChannelDescriptor, ElementType, ScratchShape};
pub use controller::{ControllerState, Lifecycle, ParticleController};
pub use effect::{EffectLibrary, ParticleEffect};
pub use emitter::{EmissionMode, RegularEmitter};
pub use influencers::{Influence, Influencer};
pub use instance::{pack_controller, ParticleInstance};
pub use rand::ParticleRng;
pub use store::{ChannelHandle, ParticleStore};
pub use system::{EffectDrawData, EffectHandle, ParticleSystem, SystemConfig};
