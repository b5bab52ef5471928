//! Batch driver for the two-phase operator contract.

use enough::Stop;
use log::debug;
use rayon::prelude::*;

use crate::args::OpSchema;
use crate::error::StageError;
use crate::image::{Batch, Image};
use crate::limits::Limits;
use crate::operator::{Operator, SampleContext};

/// How the per-sample phase is spread across threads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParallelPolicy {
    /// Threads in a dedicated pool. `None` runs on rayon's global pool.
    pub max_threads: Option<usize>,
    /// Batches of at most this many samples run on the calling thread.
    pub sequential_threshold: usize,
}

impl Default for ParallelPolicy {
    fn default() -> Self {
        Self {
            max_threads: None,
            sequential_threshold: 1,
        }
    }
}

impl ParallelPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_threads(mut self, max_threads: Option<usize>) -> Self {
        self.max_threads = max_threads;
        self
    }

    pub fn with_sequential_threshold(mut self, threshold: usize) -> Self {
        self.sequential_threshold = threshold;
        self
    }

    /// Every batch on the calling thread.
    pub fn sequential() -> Self {
        Self::default().with_sequential_threshold(usize::MAX)
    }
}

/// Per-output byte cap a new [`StageRunner`] starts with, 4 GiB.
///
/// Paste canvases scale with a user-supplied ratio, so an unbounded default
/// lets one argument request an allocation the process cannot satisfy.
/// Replace it with [`StageRunner::with_limits`].
pub const DEFAULT_MAX_OUTPUT_BYTES: u64 = 4 << 30;

/// Drives one operator over batches: shared setup once, then setup and
/// kernel for every sample, in parallel when the policy allows.
///
/// Per-sample scratch slots are kept between batches and only grow.
pub struct StageRunner<O: Operator> {
    op: O,
    schema: OpSchema,
    scratch: Vec<O::Scratch>,
    policy: ParallelPolicy,
    pool: Option<rayon::ThreadPool>,
    limits: Limits,
}

impl<O: Operator> StageRunner<O> {
    pub fn new(op: O) -> Self {
        Self {
            op,
            schema: O::schema(),
            scratch: Vec::new(),
            policy: ParallelPolicy::default(),
            pool: None,
            limits: Limits::default().with_max_memory_bytes(DEFAULT_MAX_OUTPUT_BYTES),
        }
    }

    /// Apply `policy`, building a dedicated pool when it caps the thread count.
    pub fn with_policy(mut self, policy: ParallelPolicy) -> Result<Self, StageError> {
        self.pool = match policy.max_threads {
            Some(n) => Some(rayon::ThreadPoolBuilder::new().num_threads(n).build()?),
            None => None,
        };
        self.policy = policy;
        Ok(self)
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn operator(&self) -> &O {
        &self.op
    }

    pub fn schema(&self) -> &OpSchema {
        &self.schema
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Output slots for `inputs`: one batch per output of every input set.
    pub fn allocate_outputs(&self, inputs: &[Batch]) -> Vec<Batch> {
        let n = inputs.first().map_or(0, Batch::len);
        (0..output_count(&self.schema, inputs))
            .map(|_| Batch::with_capacity(n))
            .collect()
    }

    /// Phase one. Validates the batch and resolves batch-wide configuration.
    ///
    /// The returned handle is the only way into the per-sample phase, and the
    /// runner stays borrowed until it is dropped.
    pub fn run_shared_setup<'a>(
        &'a mut self,
        inputs: &'a [Batch],
    ) -> Result<PreparedBatch<'a, O>, StageError> {
        prepare(
            &mut self.op,
            &self.schema,
            &mut self.scratch,
            &self.limits,
            inputs,
        )
    }

    /// Run both phases for a whole batch.
    pub fn run(&mut self, inputs: &[Batch], stop: &(dyn Stop + Sync)) -> Result<Vec<Batch>, StageError> {
        let mut outputs = self.allocate_outputs(inputs);
        self.run_into(inputs, &mut outputs, stop)?;
        Ok(outputs)
    }

    /// Run both phases, writing into existing output slots so their
    /// allocations are reused.
    pub fn run_into(
        &mut self,
        inputs: &[Batch],
        outputs: &mut [Batch],
        stop: &(dyn Stop + Sync),
    ) -> Result<(), StageError> {
        stop.check()?;
        let Self {
            op,
            schema,
            scratch,
            policy,
            pool,
            limits,
        } = self;
        let prepared = prepare(op, schema, scratch, limits, inputs)?;
        let n = prepared.len();
        let mut slots = split_outputs(outputs, n)?;
        let (exec, scratch) = prepared.split();

        if n <= policy.sequential_threshold {
            debug!("{}: {n} sample(s) on the calling thread", schema.name);
            return slots
                .iter_mut()
                .zip(scratch.iter_mut())
                .enumerate()
                .try_for_each(|(i, (slot, s))| {
                    stop.check()?;
                    exec.run_per_sample(i, s, slot)
                });
        }

        debug!("{}: {n} sample(s) in parallel", schema.name);
        let mut parallel = || {
            slots
                .par_iter_mut()
                .zip(scratch.par_iter_mut())
                .enumerate()
                .try_for_each(|(i, (slot, s))| {
                    stop.check()?;
                    exec.run_per_sample(i, s, slot)
                })
        };
        match pool {
            Some(pool) => pool.install(parallel),
            None => parallel(),
        }
    }
}

fn output_count(schema: &OpSchema, inputs: &[Batch]) -> usize {
    inputs.len() / schema.num_inputs.max(1) * schema.num_outputs
}

fn prepare<'a, O: Operator>(
    op: &'a mut O,
    schema: &'a OpSchema,
    scratch: &'a mut Vec<O::Scratch>,
    limits: &'a Limits,
    inputs: &'a [Batch],
) -> Result<PreparedBatch<'a, O>, StageError> {
    op.shared_setup(inputs)?;
    let n = inputs.first().map_or(0, Batch::len);
    if scratch.len() < n {
        scratch.resize_with(n, Default::default);
    }
    debug!(
        "{}: shared setup done for {n} sample(s) in {} input batch(es)",
        schema.name,
        inputs.len()
    );
    Ok(PreparedBatch {
        exec: SampleExecutor {
            op,
            schema,
            limits,
            inputs,
            len: n,
            outputs: output_count(schema, inputs),
        },
        scratch: &mut scratch[..n],
    })
}

/// A batch whose shared setup has run.
///
/// Holds the operator read-only and one scratch slot per sample. Drive it
/// sample by sample with [`run_per_sample`](Self::run_per_sample), or
/// [`split`](Self::split) it to hand samples to other threads.
pub struct PreparedBatch<'a, O: Operator> {
    exec: SampleExecutor<'a, O>,
    scratch: &'a mut [O::Scratch],
}

impl<'a, O: Operator> PreparedBatch<'a, O> {
    pub fn len(&self) -> usize {
        self.exec.len
    }

    pub fn is_empty(&self) -> bool {
        self.exec.len == 0
    }

    /// Phase two for one sample, on the calling thread. `outputs` holds one
    /// batch per output, as from [`StageRunner::allocate_outputs`].
    pub fn run_per_sample(
        &mut self,
        outputs: &mut [Batch],
        sample_index: usize,
    ) -> Result<(), StageError> {
        check_outputs(outputs, self.exec.len)?;
        let scratch = self.scratch.get_mut(sample_index).ok_or_else(|| {
            StageError::InvalidArgument(format!(
                "sample {sample_index} outside a batch of {}",
                self.exec.len
            ))
        })?;
        let mut slot: Vec<&mut Image> = outputs
            .iter_mut()
            .map(|b| &mut b.images[sample_index])
            .collect();
        self.exec.run_per_sample(sample_index, scratch, &mut slot)
    }

    /// A shareable executor plus the scratch arena, one slot per sample.
    pub fn split(self) -> (SampleExecutor<'a, O>, &'a mut [O::Scratch]) {
        (self.exec, self.scratch)
    }
}

/// Per-sample phase of a prepared batch. `Copy` and `Sync`, so any number
/// of threads can run samples at once, each with its own scratch slot.
pub struct SampleExecutor<'a, O: Operator> {
    op: &'a O,
    schema: &'a OpSchema,
    limits: &'a Limits,
    inputs: &'a [Batch],
    len: usize,
    outputs: usize,
}

impl<O: Operator> Clone for SampleExecutor<'_, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O: Operator> Copy for SampleExecutor<'_, O> {}

impl<O: Operator> SampleExecutor<'_, O> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Per-sample setup then kernel for `sample_index`. `outputs` holds this
    /// sample's image from every output batch, as from [`split_outputs`].
    pub fn run_per_sample(
        &self,
        sample_index: usize,
        scratch: &mut O::Scratch,
        outputs: &mut [&mut Image],
    ) -> Result<(), StageError> {
        if sample_index >= self.len {
            return Err(StageError::InvalidArgument(format!(
                "{}: sample {sample_index} outside a batch of {}",
                self.schema.name, self.len
            )));
        }
        if outputs.len() != self.outputs {
            return Err(StageError::ShapeMismatch(format!(
                "{}: {} output slot(s) for sample {sample_index}, expected {}",
                self.schema.name,
                outputs.len(),
                self.outputs
            )));
        }
        let thread_index = rayon::current_thread_index().unwrap_or(0);
        let ctx = SampleContext::new(self.inputs, sample_index, thread_index, self.limits);
        self.op.setup_sample(&ctx, scratch, outputs)?;
        self.op.run_sample(&ctx, scratch, outputs)
    }
}

/// Regroup output batches by sample: entry `i` holds sample `i`'s image from
/// every batch in `outputs`.
pub fn split_outputs(outputs: &mut [Batch], n: usize) -> Result<Vec<Vec<&mut Image>>, StageError> {
    check_outputs(outputs, n)?;
    let mut slots: Vec<Vec<&mut Image>> =
        (0..n).map(|_| Vec::with_capacity(outputs.len())).collect();
    for batch in outputs.iter_mut() {
        for (slot, image) in slots.iter_mut().zip(batch.images.iter_mut()) {
            slot.push(image);
        }
    }
    Ok(slots)
}

fn check_outputs(outputs: &[Batch], n: usize) -> Result<(), StageError> {
    if let Some(bad) = outputs.iter().position(|b| b.len() != n) {
        return Err(StageError::ShapeMismatch(format!(
            "output batch {bad} has {} slots for {n} samples",
            outputs[bad].len()
        )));
    }
    Ok(())
}
