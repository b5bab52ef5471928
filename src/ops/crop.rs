use log::trace;

use super::cast_permute::CastAttrs;
use crate::args::{ArgDefault, ArgSchema, Argument, OpSchema, OpSpec};
use crate::error::StageError;
use crate::geometry::{CropWindow, resolve_crop, validate_crop};
use crate::image::{Batch, Image, Shape};
use crate::kernel::crop_image;
use crate::operator::{Operator, SampleContext, check_input_sets};
use crate::pixel::{ElementType, Layout};

/// Fixed-size window extraction with per-sample anchors, element type
/// conversion and an optional interleaved-to-planar permute.
///
/// Several input sets may be passed at once; every set is cropped with the
/// same window for a given sample.
#[derive(Clone, Debug)]
pub struct Crop {
    spec: OpSpec,
    window_height: usize,
    window_width: usize,
    attrs: CastAttrs,
}

impl Crop {
    pub fn new(spec: OpSpec) -> Result<Self, StageError> {
        let spec = spec.resolve(&Self::schema())?;
        let (window_height, window_width) = match spec.ints("crop")?.as_slice() {
            &[side] => (side, side),
            &[h, w] => (h, w),
            other => {
                return Err(StageError::InvalidArgument(format!(
                    "crop takes one or two sizes, got {other:?}"
                )));
            }
        };
        let to_dim = |v: i64| {
            usize::try_from(v).ok().filter(|&d| d > 0).ok_or_else(|| {
                StageError::InvalidArgument(format!("crop size must be positive, got {v}"))
            })
        };
        let attrs = CastAttrs::from_spec(&spec)?;
        let window_height = to_dim(window_height)?;
        let window_width = to_dim(window_width)?;
        validate_crop(window_height, window_width, attrs.channels())?;
        Ok(Self {
            spec,
            window_height,
            window_width,
            attrs,
        })
    }

    /// Window size as `(height, width)`.
    pub fn window(&self) -> (usize, usize) {
        (self.window_height, self.window_width)
    }

    pub fn output_type(&self) -> ElementType {
        self.attrs.output_type
    }

    pub fn output_layout(&self) -> Layout {
        self.attrs.output_layout
    }
}

impl Operator for Crop {
    type Scratch = CropWindow;

    fn schema() -> OpSchema {
        let mut args = vec![
            ArgSchema {
                name: "crop",
                doc: "Window size as (height, width), or a single side for a square.",
                default: ArgDefault::Required,
                per_sample: false,
            },
            ArgSchema {
                name: "crop_pos_x",
                doc: "Normalized horizontal anchor of the window, 0 is left.",
                default: ArgDefault::Value(Argument::Float(0.5)),
                per_sample: true,
            },
            ArgSchema {
                name: "crop_pos_y",
                doc: "Normalized vertical anchor of the window, 0 is top.",
                default: ArgDefault::Value(Argument::Float(0.5)),
                per_sample: true,
            },
        ];
        args.extend(CastAttrs::schema_args());
        OpSchema {
            name: "Crop",
            doc: "Extracts a fixed-size window at a per-sample position.",
            num_inputs: 1,
            num_outputs: 1,
            allow_multiple_input_sets: true,
            args,
        }
    }

    fn shared_setup(&mut self, inputs: &[Batch]) -> Result<(), StageError> {
        let n = check_input_sets(&Self::schema(), inputs)?;
        self.attrs.shared_setup("Crop", inputs)?;
        for i in 0..n {
            let s0 = inputs[0].images[i].shape();
            for (set, batch) in inputs.iter().enumerate().skip(1) {
                let s = batch.images[i].shape();
                if (s.height, s.width) != (s0.height, s0.width) {
                    return Err(StageError::ShapeMismatch(format!(
                        "sample {i} is {}x{} in input set {set}, {}x{} in set 0",
                        s.height, s.width, s0.height, s0.width
                    )));
                }
            }
        }
        Ok(())
    }

    fn setup_sample(
        &self,
        ctx: &SampleContext<'_>,
        scratch: &mut CropWindow,
        outputs: &mut [&mut Image],
    ) -> Result<(), StageError> {
        let idx = ctx.sample_index();
        let s = ctx.input(0)?.shape();
        let anchor_y = self.spec.float("crop_pos_y", idx)?;
        let anchor_x = self.spec.float("crop_pos_x", idx)?;
        *scratch = resolve_crop(
            s.height,
            s.width,
            s.channels,
            self.window_height,
            self.window_width,
            anchor_y,
            anchor_x,
        )?;
        trace!(
            "Crop sample {idx} on worker {}: {:?}",
            ctx.thread_index(),
            scratch
        );
        let shape = Shape::new(self.window_height, self.window_width, s.channels);
        for out in outputs.iter_mut() {
            ctx.resize_output(out, shape, self.attrs.output_type, self.attrs.output_layout)?;
        }
        Ok(())
    }

    fn run_sample(
        &self,
        ctx: &SampleContext<'_>,
        scratch: &CropWindow,
        outputs: &mut [&mut Image],
    ) -> Result<(), StageError> {
        for (set, out) in outputs.iter_mut().enumerate() {
            crop_image(ctx.input(set)?, scratch, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> OpSpec {
        OpSpec::new().with_arg("crop", Argument::Ints(vec![2, 3]))
    }

    #[test]
    fn square_shorthand() {
        let op = Crop::new(OpSpec::new().with_arg("crop", Argument::Int(5))).unwrap();
        assert_eq!(op.window(), (5, 5));
    }

    #[test]
    fn defaults_are_planar_rgb() {
        let op = Crop::new(spec()).unwrap();
        assert_eq!(op.window(), (2, 3));
        assert_eq!(op.output_layout(), Layout::Planar);
        assert_eq!(op.attrs.channels(), 3);
    }

    #[test]
    fn rejects_bad_window_arguments() {
        let missing = Crop::new(OpSpec::new());
        assert!(matches!(missing, Err(StageError::MissingArgument("crop"))));
        let negative = Crop::new(OpSpec::new().with_arg("crop", Argument::Ints(vec![2, -1])));
        assert!(matches!(negative, Err(StageError::InvalidArgument(_))));
        let three = Crop::new(OpSpec::new().with_arg("crop", Argument::Ints(vec![1, 2, 3])));
        assert!(matches!(three, Err(StageError::InvalidArgument(_))));
    }

    #[test]
    fn shared_setup_infers_type_and_checks_sets() {
        let img = Image::interleaved_u8(4, 4, 3, vec![0; 48]).unwrap();
        let other = Image::interleaved_u8(5, 4, 3, vec![0; 60]).unwrap();
        let mut op = Crop::new(spec()).unwrap();
        let a = Batch::cycled(std::slice::from_ref(&img), 2).unwrap();
        op.shared_setup(std::slice::from_ref(&a)).unwrap();
        assert_eq!(op.output_type(), ElementType::U8);

        let b = Batch::new(vec![img.clone(), other]);
        assert!(matches!(
            op.shared_setup(&[a, b]),
            Err(StageError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn shared_setup_checks_channels_against_image_type() {
        let gray = Image::interleaved_u8(4, 4, 1, vec![0; 16]).unwrap();
        let mut op = Crop::new(spec()).unwrap();
        assert!(matches!(
            op.shared_setup(&[Batch::new(vec![gray])]),
            Err(StageError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn shared_setup_rejects_unsupported_channel_counts() {
        let rgba = Image::interleaved_u8(4, 4, 4, vec![0; 64]).unwrap();
        let mut op = Crop::new(spec()).unwrap();
        assert!(matches!(
            op.shared_setup(&[Batch::new(vec![rgba])]),
            Err(StageError::InvalidArgument(_))
        ));
    }
}
