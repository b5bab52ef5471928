//! # zenstage
//!
//! Batched image-transform pipeline stages: crop and paste operators under a
//! two-phase execution contract, plus an oracle for checking their output.
//!
//! ## Execution model
//!
//! An [`Operator`] runs a batch in two phases. Shared setup sees the whole
//! batch once, single-threaded, and may configure the operator (for example
//! inferring an output type from the first sample). The per-sample phase then
//! resolves each sample's geometry and runs its kernel, on any number of
//! threads and in any order. [`StageRunner`] drives both phases over rayon.
//!
//! Per-sample random arguments are drawn from the operator seed, the argument
//! name and the sample index, so results do not depend on scheduling.
//!
//! ## Operators
//!
//! - [`Crop`] extracts a fixed window at a per-sample anchor, converting
//!   element type and optionally permuting interleaved input to planar.
//! - [`Paste`] places each image on a larger canvas filled with a constant.
//! - [`CastPermute`] converts type and layout of the whole image.
//!
//! Half-precision output goes through a batched conversion that is
//! bit-identical to `f16::from_f32(f32::from(v))`. The `simd` feature adds a
//! runtime-dispatched AVX2/F16C row routine.
//!
//! ## Usage
//!
//! ```no_run
//! use zenstage::{Argument, Batch, Crop, Image, OpSpec, StageRunner, Unstoppable};
//!
//! let image = Image::interleaved_u8(4, 4, 3, vec![0; 48])?;
//! let inputs = [Batch::cycled(&[image], 8)?];
//!
//! let crop = Crop::new(
//!     OpSpec::new()
//!         .with_seed(7)
//!         .with_arg("crop", Argument::Ints(vec![2, 2]))
//!         .with_arg("crop_pos_x", Argument::Uniform { low: 0.0, high: 1.0 }),
//! )?;
//! let outputs = StageRunner::new(crop).run(&inputs, &Unstoppable)?;
//! assert_eq!(outputs[0].len(), 8);
//! # Ok::<(), zenstage::StageError>(())
//! ```

#![cfg_attr(not(feature = "simd"), forbid(unsafe_code))]
#![cfg_attr(feature = "simd", deny(unsafe_code))]

mod error;
mod executor;
mod image;
mod limits;
mod operator;
mod pixel;

pub mod args;
pub mod geometry;
pub mod kernel;
pub mod oracle;
pub mod ops;

// Re-exports
pub use args::{Argument, ImageType, OpSchema, OpSpec};
pub use enough::{Stop, Unstoppable};
pub use half::f16;
pub use error::StageError;
pub use executor::{
    DEFAULT_MAX_OUTPUT_BYTES, ParallelPolicy, PreparedBatch, SampleExecutor, StageRunner,
    split_outputs,
};
pub use image::{Batch, Image, Shape};
pub use limits::Limits;
pub use operator::{Operator, SampleContext};
pub use ops::{CastPermute, Crop, Paste};
pub use oracle::{CompareMode, ComparisonReport, compare};
pub use pixel::{Element, ElementType, Layout, PixelBuffer};
