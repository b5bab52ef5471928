//! Concrete operators.

mod cast_permute;
mod crop;
mod paste;

pub use cast_permute::CastPermute;
pub use crop::Crop;
pub use paste::{MAX_CHANNELS, Paste};
