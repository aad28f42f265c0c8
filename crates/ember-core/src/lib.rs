//! Ember Core - Foundational types for the Ember particle engine
//!
//! This crate provides the core types that all other Ember crates depend on:
//! - `ChannelId`, `ControllerId` - Stable identifiers from append-only counters
//! - `Transform`, `BoundingBox` - Spatial types
//! - Error types and Result alias

mod error;
mod id;
mod types;

pub use error::{EmberError, Result};
pub use id::{ChannelId, ControllerId};
pub use types::{BoundingBox, Transform};
