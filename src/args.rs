//! Operator arguments: fixed values, per-sample values and seeded random
//! draws, plus the schema each operator declares.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::StageError;
use crate::pixel::{ElementType, Layout};

/// Color space of an operator's input, which fixes its channel count.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ImageType {
    #[default]
    Rgb,
    Bgr,
    Gray,
}

impl ImageType {
    pub fn channels(&self) -> usize {
        match self {
            Self::Rgb | Self::Bgr => 3,
            Self::Gray => 1,
        }
    }
}

/// A single argument value.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub enum Argument {
    Int(i64),
    Float(f32),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
    ImageType(ImageType),
    /// `None` asks the operator to infer the type from its input.
    ElementType(Option<ElementType>),
    Layout(Layout),
    /// Drawn independently for every sample from `[low, high]`.
    Uniform { low: f32, high: f32 },
    /// One value per sample index.
    PerSample(Vec<f32>),
}

impl Argument {
    fn is_per_sample(&self) -> bool {
        matches!(self, Self::Uniform { .. } | Self::PerSample(_))
    }
}

/// Default behavior of a declared argument.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgDefault {
    /// Must be supplied.
    Required,
    /// May be omitted; the operator derives a value itself.
    Derived,
    Value(Argument),
}

/// One argument an operator recognizes.
#[derive(Clone, Debug, PartialEq)]
pub struct ArgSchema {
    pub name: &'static str,
    pub doc: &'static str,
    pub default: ArgDefault,
    /// Whether the argument may vary per sample.
    pub per_sample: bool,
}

/// What an operator declares to the scheduler.
#[derive(Clone, Debug, PartialEq)]
pub struct OpSchema {
    pub name: &'static str,
    pub doc: &'static str,
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub allow_multiple_input_sets: bool,
    pub args: Vec<ArgSchema>,
}

impl OpSchema {
    pub fn arg(&self, name: &str) -> Option<&ArgSchema> {
        self.args.iter().find(|a| a.name == name)
    }
}

/// Arguments supplied to one operator instance.
#[derive(Clone, Debug, Default)]
pub struct OpSpec {
    args: HashMap<String, Argument>,
    seed: u64,
}

impl OpSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, name: &str, value: Argument) -> Self {
        self.args.insert(name.to_owned(), value);
        self
    }

    /// Seed for per-sample random arguments.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.args.contains_key(name)
    }

    /// Check against `schema` and fill in declared defaults.
    pub fn resolve(mut self, schema: &OpSchema) -> Result<Self, StageError> {
        for (name, value) in &self.args {
            let decl = schema.arg(name).ok_or_else(|| {
                StageError::InvalidArgument(format!(
                    "{} does not recognize argument `{name}`",
                    schema.name
                ))
            })?;
            if let Argument::Uniform { low, high } = value {
                check_uniform(name, *low, *high)?;
            }
            if value.is_per_sample() && !decl.per_sample {
                return Err(StageError::InvalidArgument(format!(
                    "argument `{name}` of {} cannot vary per sample",
                    schema.name
                )));
            }
        }
        for decl in &schema.args {
            if self.args.contains_key(decl.name) {
                continue;
            }
            match &decl.default {
                ArgDefault::Required => return Err(StageError::MissingArgument(decl.name)),
                ArgDefault::Derived => {}
                ArgDefault::Value(v) => {
                    self.args.insert(decl.name.to_owned(), v.clone());
                }
            }
        }
        Ok(self)
    }

    fn get(&self, name: &'static str) -> Result<&Argument, StageError> {
        self.args.get(name).ok_or(StageError::MissingArgument(name))
    }

    fn wrong_kind(name: &str, want: &str, got: &Argument) -> StageError {
        StageError::InvalidArgument(format!("argument `{name}` must be {want}, got {got:?}"))
    }

    /// Scalar value of `name` for sample `sample_index`.
    pub fn float(&self, name: &'static str, sample_index: usize) -> Result<f32, StageError> {
        match self.get(name)? {
            Argument::Float(v) => Ok(*v),
            Argument::Int(v) => Ok(*v as f32),
            Argument::Uniform { low, high } => {
                check_uniform(name, *low, *high)?;
                Ok(draw_uniform(self.seed, name, sample_index, *low, *high))
            }
            Argument::PerSample(values) => values.get(sample_index).copied().ok_or_else(|| {
                StageError::ShapeMismatch(format!(
                    "argument `{name}` has {} per-sample values, sample {sample_index} requested",
                    values.len()
                ))
            }),
            other => Err(Self::wrong_kind(name, "a number", other)),
        }
    }

    pub fn int(&self, name: &'static str) -> Result<i64, StageError> {
        match self.get(name)? {
            Argument::Int(v) => Ok(*v),
            other => Err(Self::wrong_kind(name, "an integer", other)),
        }
    }

    pub fn ints(&self, name: &'static str) -> Result<Vec<i64>, StageError> {
        match self.get(name)? {
            Argument::Int(v) => Ok(vec![*v]),
            Argument::Ints(v) => Ok(v.clone()),
            other => Err(Self::wrong_kind(name, "an integer list", other)),
        }
    }

    pub fn floats(&self, name: &'static str) -> Result<Vec<f32>, StageError> {
        match self.get(name)? {
            Argument::Float(v) => Ok(vec![*v]),
            Argument::Int(v) => Ok(vec![*v as f32]),
            Argument::Floats(v) => Ok(v.clone()),
            Argument::Ints(v) => Ok(v.iter().map(|&i| i as f32).collect()),
            other => Err(Self::wrong_kind(name, "a number list", other)),
        }
    }

    pub fn image_type(&self, name: &'static str) -> Result<ImageType, StageError> {
        match self.get(name)? {
            Argument::ImageType(t) => Ok(*t),
            other => Err(Self::wrong_kind(name, "an image type", other)),
        }
    }

    pub fn element_type(&self, name: &'static str) -> Result<Option<ElementType>, StageError> {
        match self.get(name)? {
            Argument::ElementType(t) => Ok(*t),
            other => Err(Self::wrong_kind(name, "an element type", other)),
        }
    }

    pub fn layout(&self, name: &'static str) -> Result<Layout, StageError> {
        match self.get(name)? {
            Argument::Layout(l) => Ok(*l),
            other => Err(Self::wrong_kind(name, "a layout", other)),
        }
    }
}

/// Bounds `rand` can sample: finite, ordered, and a span that stays finite
/// after `rand` scales it by `1 / (1 - EPSILON)`.
fn check_uniform(name: &str, low: f32, high: f32) -> Result<(), StageError> {
    let span = (high - low) / (1.0 - f32::EPSILON);
    if !(low.is_finite() && high.is_finite() && low <= high && span.is_finite()) {
        return Err(StageError::InvalidArgument(format!(
            "argument `{name}` has unusable range [{low}, {high}]"
        )));
    }
    Ok(())
}

/// FNV-1a; stable across builds, unlike the std hasher.
const fn name_hash(name: &str) -> u64 {
    let bytes = name.as_bytes();
    let mut h = 0xcbf2_9ce4_8422_2325u64;
    let mut i = 0;
    while i < bytes.len() {
        h ^= bytes[i] as u64;
        h = h.wrapping_mul(0x0100_0000_01b3);
        i += 1;
    }
    h
}

/// Draw for (`seed`, `name`, `sample_index`). Depends only on those three,
/// never on which worker asks.
fn draw_uniform(seed: u64, name: &str, sample_index: usize, low: f32, high: f32) -> f32 {
    let key = seed
        ^ name_hash(name).rotate_left(17)
        ^ (sample_index as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    StdRng::seed_from_u64(key).gen_range(low..=high)
}
