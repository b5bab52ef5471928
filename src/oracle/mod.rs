//! Comparison of computed batches against reference batches.
//!
//! Differences are reported as mean absolute error in percent of the
//! element type's color range, per channel or pooled, per element or pooled
//! over the whole batch. Best-match mode also tries every one-pixel shift and
//! keeps the best-aligned overlap.

mod ssim;
mod stats;

use std::fmt;

use log::warn;

pub use ssim::mssim;
pub use stats::ChannelStats;
use stats::{DiffAccumulator, accumulate};

use crate::error::StageError;
use crate::image::{Batch, Image, Shape};

/// Shifts tried in best-match mode, unshifted first so ties keep it.
const SHIFTS: [(isize, isize); 9] = [
    (0, 0),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Ordering key for means: NaN ranks above everything.
fn severity(mean: f64) -> f64 {
    if mean.is_nan() { f64::INFINITY } else { mean }
}

/// Whether `mean` fails `tolerance`. NaN always fails.
fn exceeds(mean: f64, tolerance: f64) -> bool {
    !(mean <= tolerance)
}

/// Comparison options. The default pools everything into one statistic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompareMode {
    /// Separate statistics per color channel.
    pub per_channel: bool,
    /// Separate statistics per batch element.
    pub per_element: bool,
    /// Evaluate every element instead of stopping at the first failure.
    pub check_all: bool,
    /// Log failures as warnings instead of returning an error.
    pub no_assert: bool,
    /// Score each element by its best one-pixel shift. Implies `per_element`.
    pub best_match: bool,
}

impl CompareMode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_per_channel(mut self, v: bool) -> Self {
        self.per_channel = v;
        self
    }

    pub fn with_per_element(mut self, v: bool) -> Self {
        self.per_element = v;
        self
    }

    pub fn with_check_all(mut self, v: bool) -> Self {
        self.check_all = v;
        self
    }

    pub fn with_no_assert(mut self, v: bool) -> Self {
        self.no_assert = v;
        self
    }

    pub fn with_best_match(mut self, v: bool) -> Self {
        self.best_match = v;
        self
    }
}

/// Outcome for one element, or for the whole batch when pooled.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementRecord {
    /// `None` when the batch was pooled.
    pub index: Option<usize>,
    pub shape: Shape,
    /// Statistics at the chosen shift.
    pub channels: Vec<ChannelStats>,
    /// Channel with the largest mean. `None` when channels were pooled.
    pub worst_channel: Option<usize>,
    pub worst_mean: f64,
    /// Shift `(dy, dx)` applied to the computed image.
    pub shift: (isize, isize),
}

impl ElementRecord {
    fn from_stats(index: Option<usize>, shape: Shape, channels: Vec<ChannelStats>) -> Self {
        let worst = channels
            .iter()
            .copied()
            .reduce(|a, b| if severity(b.mean) > severity(a.mean) { b } else { a })
            .unwrap_or_default();
        Self {
            index,
            shape,
            worst_channel: worst.channel,
            worst_mean: worst.mean,
            channels,
            shift: (0, 0),
        }
    }
}

impl fmt::Display for ElementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(c) = self.worst_channel {
            write!(f, "color #{c} ")?;
        }
        if let Some(i) = self.index {
            write!(f, "element #{i} (h, w) = ({}, {}) ", self.shape.height, self.shape.width)?;
        }
        write!(f, "mean = {:.4}%", self.worst_mean)?;
        if self.shift != (0, 0) {
            write!(f, " at shift {:?}", self.shift)?;
        }
        Ok(())
    }
}

/// Everything a comparison evaluated.
#[derive(Clone, Debug, PartialEq)]
pub struct ComparisonReport {
    pub tolerance: f64,
    pub mode: CompareMode,
    /// Every evaluated element, in batch order.
    pub elements: Vec<ElementRecord>,
    /// Positions in `elements` that exceeded the tolerance.
    pub failures: Vec<usize>,
}

impl ComparisonReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Element with the largest worst-channel mean.
    pub fn worst(&self) -> Option<&ElementRecord> {
        self.elements
            .iter()
            .reduce(|a, b| {
                if severity(b.worst_mean) > severity(a.worst_mean) { b } else { a }
            })
    }

    pub fn failed_elements(&self) -> impl Iterator<Item = &ElementRecord> {
        self.failures.iter().map(|&i| &self.elements[i])
    }
}

/// Compare `computed` against `reference`.
///
/// A mean above `tolerance` (percent) fails. Failures return
/// [`StageError::ComparisonFailed`] unless `mode.no_assert` is set, in which
/// case they are logged and the report comes back as `Ok`.
pub fn compare(
    computed: &Batch,
    reference: &Batch,
    tolerance: f64,
    mode: CompareMode,
) -> Result<ComparisonReport, StageError> {
    if !(tolerance >= 0.0) {
        return Err(StageError::InvalidArgument(format!(
            "tolerance must be non-negative, got {tolerance}"
        )));
    }
    if computed.len() != reference.len() {
        return Err(StageError::ShapeMismatch(format!(
            "comparing {} computed elements against {} reference elements",
            computed.len(),
            reference.len()
        )));
    }
    for (i, (a, b)) in computed.images.iter().zip(&reference.images).enumerate() {
        check_pair(i, a, b)?;
    }

    let mut report = ComparisonReport {
        tolerance,
        mode,
        elements: Vec::new(),
        failures: Vec::new(),
    };
    if mode.per_element || mode.best_match {
        for (i, (a, b)) in computed.images.iter().zip(&reference.images).enumerate() {
            let record = compare_element(i, a, b, mode);
            let failed = exceeds(record.worst_mean, tolerance);
            report.elements.push(record);
            if failed {
                report.failures.push(report.elements.len() - 1);
                if !mode.check_all {
                    break;
                }
            }
        }
    } else {
        let record = compare_pooled(computed, reference, mode.per_channel);
        if exceeds(record.worst_mean, tolerance) {
            report.failures.push(0);
        }
        report.elements.push(record);
    }

    if report.passed() {
        return Ok(report);
    }
    if mode.no_assert {
        for record in report.failed_elements() {
            warn!("comparison warning: {record}, expected <= {tolerance}");
        }
        return Ok(report);
    }
    Err(StageError::ComparisonFailed(Box::new(report)))
}

fn check_pair(i: usize, a: &Image, b: &Image) -> Result<(), StageError> {
    if a.shape() != b.shape() {
        return Err(StageError::ShapeMismatch(format!(
            "element {i}: computed {:?}, reference {:?}",
            a.shape(),
            b.shape()
        )));
    }
    if a.element_type() != b.element_type() {
        return Err(StageError::UnsupportedType(format!(
            "element {i}: computed {:?}, reference {:?}",
            a.element_type(),
            b.element_type()
        )));
    }
    Ok(())
}

fn accumulators(channels: usize, per_channel: bool) -> Vec<DiffAccumulator> {
    vec![DiffAccumulator::default(); if per_channel { channels.max(1) } else { 1 }]
}

fn finish(accs: &[DiffAccumulator], per_channel: bool, range: f64) -> Vec<ChannelStats> {
    accs.iter()
        .enumerate()
        .map(|(c, acc)| acc.finish(per_channel.then_some(c), range))
        .collect()
}

fn compare_element(index: usize, a: &Image, b: &Image, mode: CompareMode) -> ElementRecord {
    let shape = a.shape();
    let range = a.element_type().color_range();
    let shifts: &[(isize, isize)] = if mode.best_match { &SHIFTS } else { &SHIFTS[..1] };
    let mut best: Option<ElementRecord> = None;
    for &shift in shifts {
        let mut accs = accumulators(shape.channels, mode.per_channel);
        if !accumulate(a, b, shift, &mut accs) && shift != (0, 0) {
            continue;
        }
        let mut record =
            ElementRecord::from_stats(Some(index), shape, finish(&accs, mode.per_channel, range));
        record.shift = shift;
        if best
            .as_ref()
            .is_none_or(|b| severity(record.worst_mean) < severity(b.worst_mean))
        {
            best = Some(record);
        }
    }
    best.unwrap_or_else(|| ElementRecord::from_stats(Some(index), shape, Vec::new()))
}

fn compare_pooled(computed: &Batch, reference: &Batch, per_channel: bool) -> ElementRecord {
    let channels = computed
        .images
        .iter()
        .map(|img| img.shape().channels)
        .max()
        .unwrap_or(1);
    let range = computed
        .images
        .first()
        .map_or(255.0, |img| img.element_type().color_range());
    let mut accs = accumulators(channels, per_channel);
    for (a, b) in computed.images.iter().zip(&reference.images) {
        let n = if per_channel { a.shape().channels } else { 1 };
        accumulate(a, b, (0, 0), &mut accs[..n.max(1)]);
    }
    let shape = computed.images.first().map_or(Shape::default(), Image::shape);
    ElementRecord::from_stats(None, shape, finish(&accs, per_channel, range))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(v: Vec<u8>) -> Image {
        Image::interleaved_u8(1, v.len() / 3, 3, v).unwrap()
    }

    #[test]
    fn pooled_mode_reports_one_record() {
        let a = Batch::new(vec![img(vec![10; 6]), img(vec![20; 6])]);
        let report = compare(&a, &a, 0.0, CompareMode::new()).unwrap();
        assert!(report.passed());
        assert_eq!(report.elements.len(), 1);
        assert_eq!(report.elements[0].index, None);
        assert_eq!(report.elements[0].worst_channel, None);
    }

    #[test]
    fn per_channel_names_worst_channel() {
        let a = Batch::new(vec![img(vec![0, 0, 0, 0, 0, 0])]);
        let b = Batch::new(vec![img(vec![0, 51, 0, 0, 0, 0])]);
        let mode = CompareMode::new().with_per_channel(true).with_no_assert(true);
        let report = compare(&a, &b, 1.0, mode).unwrap();
        assert!(!report.passed());
        assert_eq!(report.elements[0].worst_channel, Some(1));
        assert!((report.elements[0].worst_mean - 10.0).abs() < 1e-9);
    }

    #[test]
    fn fails_fast_without_check_all() {
        let a = Batch::new(vec![img(vec![0; 3]), img(vec![0; 3]), img(vec![0; 3])]);
        let b = Batch::new(vec![img(vec![0; 3]), img(vec![255; 3]), img(vec![255; 3])]);
        let mode = CompareMode::new().with_per_element(true);
        let Err(StageError::ComparisonFailed(report)) = compare(&a, &b, 0.0, mode) else {
            panic!("expected a comparison failure");
        };
        assert_eq!(report.elements.len(), 2);
        assert_eq!(report.failures, [1]);

        let all = mode.with_check_all(true).with_no_assert(true);
        let report = compare(&a, &b, 0.0, all).unwrap();
        assert_eq!(report.elements.len(), 3);
        assert_eq!(report.failures, [1, 2]);
    }

    #[test]
    fn nan_output_fails_in_every_mode() {
        let shape = Shape::new(1, 2, 1);
        let computed = Image::new(shape, crate::pixel::Layout::Planar, vec![f32::NAN; 2]).unwrap();
        let reference = Image::new(shape, crate::pixel::Layout::Planar, vec![0.0f32, 200.0]).unwrap();
        let a = Batch::new(vec![computed.clone()]);
        let b = Batch::new(vec![reference]);
        let modes = [
            CompareMode::new(),
            CompareMode::new().with_per_channel(true).with_per_element(true),
            CompareMode::new().with_best_match(true),
        ];
        for mode in modes {
            let report = compare(&a, &b, 0.0, mode.with_no_assert(true)).unwrap();
            assert!(!report.passed(), "{mode:?}");
            assert!(report.elements[0].worst_mean >= 100.0);
            assert!(compare(&a, &b, 0.0, mode).is_err());
        }
        assert!(compare(&a, &a, 0.0, CompareMode::new()).is_ok());
    }

    #[test]
    fn rejects_mismatched_batches() {
        let a = Batch::new(vec![img(vec![0; 3])]);
        let b = Batch::new(vec![img(vec![0; 6])]);
        assert!(matches!(
            compare(&a, &b, 0.0, CompareMode::new()),
            Err(StageError::ShapeMismatch(_))
        ));
        assert!(matches!(
            compare(&a, &Batch::default(), 0.0, CompareMode::new()),
            Err(StageError::ShapeMismatch(_))
        ));
        assert!(compare(&a, &a, -1.0, CompareMode::new()).is_err());
    }
}
