use log::debug;

use crate::args::{ArgDefault, ArgSchema, Argument, ImageType, OpSchema, OpSpec};
use crate::error::StageError;
use crate::geometry::{CropWindow, validate_crop};
use crate::image::{Batch, Image, Shape};
use crate::kernel::crop_image;
use crate::operator::{Operator, SampleContext, check_input_sets};
use crate::pixel::{ElementType, Layout};

/// Output typing shared by the operators built on the crop kernel.
#[derive(Clone, Debug)]
pub(crate) struct CastAttrs {
    pub image_type: ImageType,
    requested: Option<ElementType>,
    pub output_type: ElementType,
    pub output_layout: Layout,
}

impl CastAttrs {
    pub fn schema_args() -> Vec<ArgSchema> {
        vec![
            ArgSchema {
                name: "image_type",
                doc: "Color space of the input; fixes the expected channel count.",
                default: ArgDefault::Value(Argument::ImageType(ImageType::Rgb)),
                per_sample: false,
            },
            ArgSchema {
                name: "output_dtype",
                doc: "Output element type. Unset keeps the input type.",
                default: ArgDefault::Value(Argument::ElementType(None)),
                per_sample: false,
            },
            ArgSchema {
                name: "output_layout",
                doc: "Output memory layout.",
                default: ArgDefault::Value(Argument::Layout(Layout::Planar)),
                per_sample: false,
            },
        ]
    }

    pub fn from_spec(spec: &OpSpec) -> Result<Self, StageError> {
        let requested = spec.element_type("output_dtype")?;
        Ok(Self {
            image_type: spec.image_type("image_type")?,
            requested,
            output_type: requested.unwrap_or(ElementType::U8),
            output_layout: spec.layout("output_layout")?,
        })
    }

    pub fn channels(&self) -> usize {
        self.image_type.channels()
    }

    /// Every input must be interleaved 8-bit with the channel count of
    /// `image_type`. Resolves an unset output type from the first sample.
    pub fn shared_setup(&mut self, op: &str, inputs: &[Batch]) -> Result<(), StageError> {
        let c = self.channels();
        for (set, batch) in inputs.iter().enumerate() {
            for (i, img) in batch.images.iter().enumerate() {
                check_input(op, set, i, img, c)?;
            }
        }
        if self.requested.is_none() {
            if let Some(first) = inputs.first().and_then(|b| b.images.first()) {
                self.output_type = first.element_type();
                debug!("{op}: output type inferred as {:?}", self.output_type);
            }
        }
        Ok(())
    }
}

fn check_input(op: &str, set: usize, i: usize, img: &Image, channels: usize) -> Result<(), StageError> {
    if img.element_type() != ElementType::U8 {
        return Err(StageError::UnsupportedType(format!(
            "{op}: input {set}/{i} is {:?}, only U8 inputs are supported",
            img.element_type()
        )));
    }
    if img.layout() != Layout::Interleaved {
        return Err(StageError::InvalidArgument(format!(
            "{op}: input {set}/{i} must be channel-interleaved"
        )));
    }
    if !matches!(img.shape().channels, 1 | 3) {
        return Err(StageError::InvalidArgument(format!(
            "{op}: input {set}/{i} has {} channels, only 1 or 3 are supported",
            img.shape().channels
        )));
    }
    if img.shape().channels != channels {
        return Err(StageError::ShapeMismatch(format!(
            "{op}: input {set}/{i} has {} channels, image type needs {channels}",
            img.shape().channels
        )));
    }
    Ok(())
}

/// Type cast plus layout permute of the whole image.
#[derive(Clone, Debug)]
pub struct CastPermute {
    attrs: CastAttrs,
}

impl CastPermute {
    pub fn new(spec: OpSpec) -> Result<Self, StageError> {
        let spec = spec.resolve(&Self::schema())?;
        Ok(Self {
            attrs: CastAttrs::from_spec(&spec)?,
        })
    }

    pub fn output_type(&self) -> ElementType {
        self.attrs.output_type
    }

    pub fn output_layout(&self) -> Layout {
        self.attrs.output_layout
    }
}

impl Operator for CastPermute {
    type Scratch = CropWindow;

    fn schema() -> OpSchema {
        OpSchema {
            name: "CastPermute",
            doc: "Converts element type and memory layout without cropping.",
            num_inputs: 1,
            num_outputs: 1,
            allow_multiple_input_sets: false,
            args: CastAttrs::schema_args(),
        }
    }

    fn shared_setup(&mut self, inputs: &[Batch]) -> Result<(), StageError> {
        check_input_sets(&Self::schema(), inputs)?;
        self.attrs.shared_setup("CastPermute", inputs)
    }

    fn setup_sample(
        &self,
        ctx: &SampleContext<'_>,
        scratch: &mut CropWindow,
        outputs: &mut [&mut Image],
    ) -> Result<(), StageError> {
        let s = ctx.input(0)?.shape();
        validate_crop(s.height, s.width, s.channels)?;
        *scratch = CropWindow {
            source_height: s.height,
            source_width: s.width,
            origin_y: 0,
            origin_x: 0,
            height: s.height,
            width: s.width,
        };
        for out in outputs.iter_mut() {
            ctx.resize_output(
                out,
                Shape::new(s.height, s.width, s.channels),
                self.attrs.output_type,
                self.attrs.output_layout,
            )?;
        }
        Ok(())
    }

    fn run_sample(
        &self,
        ctx: &SampleContext<'_>,
        scratch: &CropWindow,
        outputs: &mut [&mut Image],
    ) -> Result<(), StageError> {
        let input = ctx.input(0)?;
        for out in outputs.iter_mut() {
            crop_image(input, scratch, out)?;
        }
        Ok(())
    }
}
