//! The two-phase operator contract.
//!
//! A batch runs [`Operator::shared_setup`] exactly once, then
//! [`Operator::setup_sample`] followed by [`Operator::run_sample`] for every
//! sample, in any order and possibly on several threads at once. Shared setup
//! takes `&mut self` and the per-sample phase takes `&self`, so the barrier
//! between them is enforced by the borrow checker.

use crate::args::OpSchema;
use crate::error::StageError;
use crate::image::{Batch, Image, Shape};
use crate::limits::Limits;
use crate::pixel::{ElementType, Layout};

/// What one sample's execution can see: its inputs across every input set,
/// its index in the batch, and the output limits.
#[derive(Clone, Copy, Debug)]
pub struct SampleContext<'a> {
    inputs: &'a [Batch],
    sample_index: usize,
    thread_index: usize,
    limits: &'a Limits,
}

impl<'a> SampleContext<'a> {
    pub fn new(
        inputs: &'a [Batch],
        sample_index: usize,
        thread_index: usize,
        limits: &'a Limits,
    ) -> Self {
        Self {
            inputs,
            sample_index,
            thread_index,
            limits,
        }
    }

    /// Position in the batch. Drives per-sample argument resolution.
    pub fn sample_index(&self) -> usize {
        self.sample_index
    }

    /// Worker executing this sample. Opaque; never affects results.
    pub fn thread_index(&self) -> usize {
        self.thread_index
    }

    pub fn input_sets(&self) -> usize {
        self.inputs.len()
    }

    /// This sample's image from input set `set`.
    pub fn input(&self, set: usize) -> Result<&'a Image, StageError> {
        self.inputs
            .get(set)
            .and_then(|b| b.images.get(self.sample_index))
            .ok_or_else(|| {
                StageError::ShapeMismatch(format!(
                    "no sample {} in input set {set}",
                    self.sample_index
                ))
            })
    }

    /// Size `output` for this sample after checking the allocation against
    /// the runner's limits.
    pub fn resize_output(
        &self,
        output: &mut Image,
        shape: Shape,
        ty: ElementType,
        layout: Layout,
    ) -> Result<(), StageError> {
        self.limits.check_output(shape, ty)?;
        output.resize(shape, ty, layout)
    }
}

/// A batched image operator.
pub trait Operator: Send + Sync {
    /// Per-sample geometry computed in [`setup_sample`](Self::setup_sample)
    /// and consumed by [`run_sample`](Self::run_sample). One slot per sample
    /// is kept across batches.
    type Scratch: Default + Send;

    fn schema() -> OpSchema;

    /// Batch-wide validation and configuration. Runs once, single-threaded,
    /// before any sample.
    fn shared_setup(&mut self, inputs: &[Batch]) -> Result<(), StageError>;

    /// Resolve this sample's geometry into `scratch` and size every output.
    /// `outputs` holds one image per output of every input set.
    fn setup_sample(
        &self,
        ctx: &SampleContext<'_>,
        scratch: &mut Self::Scratch,
        outputs: &mut [&mut Image],
    ) -> Result<(), StageError>;

    /// Execute the kernel from `scratch` into the already-sized outputs.
    fn run_sample(
        &self,
        ctx: &SampleContext<'_>,
        scratch: &Self::Scratch,
        outputs: &mut [&mut Image],
    ) -> Result<(), StageError>;
}

/// Checks shared by every operator's shared setup: at least one input set,
/// each the same cardinality, and no more sets than the schema allows.
pub(crate) fn check_input_sets(schema: &OpSchema, inputs: &[Batch]) -> Result<usize, StageError> {
    let Some(first) = inputs.first() else {
        return Err(StageError::InvalidArgument(format!(
            "{} needs at least one input set",
            schema.name
        )));
    };
    let max_sets = if schema.allow_multiple_input_sets {
        usize::MAX
    } else {
        schema.num_inputs
    };
    if inputs.len() > max_sets || inputs.len() % schema.num_inputs != 0 {
        return Err(StageError::InvalidArgument(format!(
            "{} takes {} input(s) per set{}, got {} input batches",
            schema.name,
            schema.num_inputs,
            if schema.allow_multiple_input_sets {
                ""
            } else {
                " and a single set"
            },
            inputs.len()
        )));
    }
    let n = first.len();
    if let Some(bad) = inputs.iter().position(|b| b.len() != n) {
        return Err(StageError::ShapeMismatch(format!(
            "input set {bad} has {} samples, set 0 has {n}",
            inputs[bad].len()
        )));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(multi: bool) -> OpSchema {
        OpSchema {
            name: "Test",
            doc: "",
            num_inputs: 1,
            num_outputs: 1,
            allow_multiple_input_sets: multi,
            args: Vec::new(),
        }
    }

    fn batch(n: usize) -> Batch {
        Batch::cycled(&[Image::interleaved_u8(1, 1, 1, vec![0]).unwrap()], n).unwrap()
    }

    #[test]
    fn input_sets_must_agree_on_cardinality() {
        assert_eq!(check_input_sets(&schema(true), &[batch(3), batch(3)]).unwrap(), 3);
        assert!(matches!(
            check_input_sets(&schema(true), &[batch(3), batch(2)]),
            Err(StageError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn single_set_operators_reject_extra_sets() {
        assert!(check_input_sets(&schema(false), &[batch(1)]).is_ok());
        assert!(matches!(
            check_input_sets(&schema(false), &[batch(1), batch(1)]),
            Err(StageError::InvalidArgument(_))
        ));
        assert!(check_input_sets(&schema(false), &[]).is_err());
    }

    #[test]
    fn context_resize_applies_limits() {
        let inputs = [batch(2)];
        let limits = Limits::default().with_max_pixels(4);
        let ctx = SampleContext::new(&inputs, 1, 0, &limits);
        assert!(ctx.input(0).is_ok());
        assert!(ctx.input(1).is_err());
        let mut out = Image::empty();
        assert!(
            ctx.resize_output(&mut out, Shape::new(2, 2, 3), ElementType::U8, Layout::Planar)
                .is_ok()
        );
        assert!(matches!(
            ctx.resize_output(&mut out, Shape::new(3, 2, 3), ElementType::U8, Layout::Planar),
            Err(StageError::LimitExceeded(_))
        ));
    }
}
