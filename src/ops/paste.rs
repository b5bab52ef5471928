use log::{debug, trace};

use crate::args::{ArgDefault, ArgSchema, Argument, OpSchema, OpSpec};
use crate::error::StageError;
use crate::geometry::{PastePlacement, resolve_paste};
use crate::image::{Batch, Image, Shape};
use crate::kernel::paste_image;
use crate::operator::{Operator, SampleContext, check_input_sets};
use crate::pixel::{Element, PixelBuffer, with_buffer};

/// Upper bound on channel count, and so on the fill vector length.
pub const MAX_CHANNELS: usize = 1024;

/// Places each image on a larger canvas filled with a constant color.
#[derive(Clone, Debug)]
pub struct Paste {
    spec: OpSpec,
    channels: usize,
    fill: Vec<f32>,
    /// `fill` in the batch's element type, built during shared setup.
    fill_buffer: PixelBuffer,
}

impl Paste {
    pub fn new(spec: OpSpec) -> Result<Self, StageError> {
        let spec = spec.resolve(&Self::schema())?;
        let n = spec.int("n_channels")?;
        let channels = usize::try_from(n)
            .ok()
            .filter(|c| (1..=MAX_CHANNELS).contains(c))
            .ok_or_else(|| {
                StageError::InvalidArgument(format!(
                    "n_channels must be within 1..={MAX_CHANNELS}, got {n}"
                ))
            })?;
        let fill = if spec.contains("fill_value") {
            spec.floats("fill_value")?
        } else {
            vec![0.0]
        };
        let fill = match fill.len() {
            1 => vec![fill[0]; channels],
            len if len == channels => fill,
            len => {
                return Err(StageError::InvalidArgument(format!(
                    "fill_value needs 1 or {channels} entries, got {len}"
                )));
            }
        };
        Ok(Self {
            spec,
            channels,
            fill,
            fill_buffer: PixelBuffer::U8(Vec::new()),
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Per-channel fill color.
    pub fn fill(&self) -> &[f32] {
        &self.fill
    }
}

impl Operator for Paste {
    type Scratch = PastePlacement;

    fn schema() -> OpSchema {
        OpSchema {
            name: "Paste",
            doc: "Pastes each image onto a larger canvas filled with a constant color.",
            num_inputs: 1,
            num_outputs: 1,
            allow_multiple_input_sets: false,
            args: vec![
                ArgSchema {
                    name: "n_channels",
                    doc: "Channel count of every input.",
                    default: ArgDefault::Value(Argument::Int(3)),
                    per_sample: false,
                },
                ArgSchema {
                    name: "fill_value",
                    doc: "Canvas color, one value broadcast or one per channel.",
                    default: ArgDefault::Derived,
                    per_sample: false,
                },
                ArgSchema {
                    name: "ratio",
                    doc: "Canvas size relative to the input, at least 1.",
                    default: ArgDefault::Required,
                    per_sample: true,
                },
                ArgSchema {
                    name: "paste_x",
                    doc: "Normalized horizontal position of the input on the canvas.",
                    default: ArgDefault::Value(Argument::Float(0.5)),
                    per_sample: true,
                },
                ArgSchema {
                    name: "paste_y",
                    doc: "Normalized vertical position of the input on the canvas.",
                    default: ArgDefault::Value(Argument::Float(0.5)),
                    per_sample: true,
                },
            ],
        }
    }

    fn shared_setup(&mut self, inputs: &[Batch]) -> Result<(), StageError> {
        check_input_sets(&Self::schema(), inputs)?;
        let Some(first) = inputs[0].images.first() else {
            return Ok(());
        };
        let ty = first.element_type();
        for (i, img) in inputs[0].images.iter().enumerate() {
            if img.element_type() != ty {
                return Err(StageError::UnsupportedType(format!(
                    "Paste: sample {i} is {:?}, sample 0 is {ty:?}",
                    img.element_type()
                )));
            }
            if img.shape().channels != self.channels {
                return Err(StageError::ShapeMismatch(format!(
                    "Paste: sample {i} has {} channels, n_channels is {}",
                    img.shape().channels,
                    self.channels
                )));
            }
        }
        if self.fill_buffer.element_type() != ty || self.fill_buffer.len() != self.channels {
            let mut buf = PixelBuffer::zeroed(ty, self.channels);
            with_buffer!(&mut buf, v => {
                for (d, &f) in v.iter_mut().zip(&self.fill) {
                    *d = Element::from_f32(f);
                }
            });
            debug!("Paste: fill value {:?} as {ty:?}", self.fill);
            self.fill_buffer = buf;
        }
        Ok(())
    }

    fn setup_sample(
        &self,
        ctx: &SampleContext<'_>,
        scratch: &mut PastePlacement,
        outputs: &mut [&mut Image],
    ) -> Result<(), StageError> {
        let idx = ctx.sample_index();
        let input = ctx.input(0)?;
        let s = input.shape();
        let ratio = self.spec.float("ratio", idx)?;
        let place_y = self.spec.float("paste_y", idx)?;
        let place_x = self.spec.float("paste_x", idx)?;
        *scratch = resolve_paste(s.height, s.width, ratio, place_y, place_x)?;
        trace!(
            "Paste sample {idx} on worker {}: {:?}",
            ctx.thread_index(),
            scratch
        );
        let shape = Shape::new(scratch.canvas_height, scratch.canvas_width, s.channels);
        for out in outputs.iter_mut() {
            ctx.resize_output(out, shape, input.element_type(), input.layout())?;
        }
        Ok(())
    }

    fn run_sample(
        &self,
        ctx: &SampleContext<'_>,
        scratch: &PastePlacement,
        outputs: &mut [&mut Image],
    ) -> Result<(), StageError> {
        let input = ctx.input(0)?;
        for out in outputs.iter_mut() {
            paste_image(input, scratch, &self.fill_buffer, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> OpSpec {
        OpSpec::new().with_arg("ratio", Argument::Float(2.0))
    }

    #[test]
    fn fill_defaults_to_zero_per_channel() {
        let op = Paste::new(spec()).unwrap();
        assert_eq!(op.fill(), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn single_fill_value_broadcasts() {
        let op = Paste::new(
            spec()
                .with_arg("n_channels", Argument::Int(4))
                .with_arg("fill_value", Argument::Float(9.0)),
        )
        .unwrap();
        assert_eq!(op.fill(), [9.0; 4]);
    }

    #[test]
    fn rejects_bad_configuration() {
        let wrong_len = Paste::new(spec().with_arg("fill_value", Argument::Floats(vec![1.0, 2.0])));
        assert!(matches!(wrong_len, Err(StageError::InvalidArgument(_))));
        let too_many = Paste::new(spec().with_arg("n_channels", Argument::Int(1025)));
        assert!(matches!(too_many, Err(StageError::InvalidArgument(_))));
        let no_ratio = Paste::new(OpSpec::new());
        assert!(matches!(no_ratio, Err(StageError::MissingArgument("ratio"))));
    }

    #[test]
    fn shared_setup_converts_fill_to_input_type() {
        let mut op = Paste::new(
            spec().with_arg("fill_value", Argument::Floats(vec![1.0, 2.5, 300.0])),
        )
        .unwrap();
        let img = Image::new(
            Shape::new(1, 1, 3),
            crate::pixel::Layout::Interleaved,
            vec![0f32; 3],
        )
        .unwrap();
        op.shared_setup(&[Batch::new(vec![img])]).unwrap();
        assert_eq!(op.fill_buffer.as_slice::<f32>(), Some(&[1.0, 2.5, 300.0][..]));
    }
}
