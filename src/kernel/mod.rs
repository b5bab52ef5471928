//! Pixel kernels: windowed extraction with type/layout conversion, and
//! canvas fill plus blit.

pub mod convert;
mod crop;
mod paste;

pub use convert::{ConvertRow, f32_to_f16_generic, f32_to_f16_row};
pub use crop::{crop, crop_image};
pub use paste::{paste, paste_image};
