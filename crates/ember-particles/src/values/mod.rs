//! Configurable value generators sampled by the emitter and influencers

mod gradient;
mod numeric;
mod spawn;

pub use gradient::GradientColorValue;
pub use numeric::{RangedNumericValue, ScaledNumericValue};
pub use spawn::{EllipseSide, SpawnShape, SpawnShapeValue};
