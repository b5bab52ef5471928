use crate::image::Image;

/// Difference statistics for one channel, or for all channels pooled.
///
/// `mean` and `std_dev` are percentages of the element type's color range.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChannelStats {
    /// `None` when channels were pooled.
    pub channel: Option<usize>,
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    /// Elements where computed equals reference.
    pub same: usize,
    /// Elements where computed exceeds reference.
    pub bigger: usize,
    /// Elements where computed is below reference.
    pub less: usize,
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct DiffAccumulator {
    count: usize,
    sum: f64,
    sum_sq: f64,
    same: usize,
    bigger: usize,
    less: usize,
}

impl DiffAccumulator {
    /// Add one element pair. A NaN on one side counts as a difference of
    /// `range`, tallied as `bigger` when the computed value is the NaN. NaN
    /// against NaN counts as equal.
    #[inline]
    pub fn push(&mut self, computed: f64, reference: f64, range: f64) {
        self.count += 1;
        let d = match (computed.is_nan(), reference.is_nan()) {
            (true, true) => {
                self.same += 1;
                return;
            }
            (true, false) => {
                self.bigger += 1;
                range
            }
            (false, true) => {
                self.less += 1;
                range
            }
            (false, false) if computed > reference => {
                self.bigger += 1;
                computed - reference
            }
            (false, false) if computed < reference => {
                self.less += 1;
                reference - computed
            }
            (false, false) => {
                self.same += 1;
                return;
            }
        };
        self.sum += d;
        self.sum_sq += d * d;
    }

    pub fn finish(&self, channel: Option<usize>, range: f64) -> ChannelStats {
        let (mean, std_dev) = if self.count == 0 {
            (0.0, 0.0)
        } else {
            let n = self.count as f64;
            let mean = self.sum / n;
            let var = (self.sum_sq / n - mean * mean).max(0.0);
            (mean, var.sqrt())
        };
        let to_percent = 100.0 / range;
        ChannelStats {
            channel,
            count: self.count,
            mean: mean * to_percent,
            std_dev: std_dev * to_percent,
            same: self.same,
            bigger: self.bigger,
            less: self.less,
        }
    }
}

/// Index range `i` such that both `i` and `i + shift` lie in `0..len`.
fn overlap(len: usize, shift: isize) -> std::ops::Range<usize> {
    let start = shift.min(0).unsigned_abs();
    let end = len.saturating_sub(shift.max(0) as usize);
    start..end.max(start)
}

/// Accumulate `|computed(y + dy, x + dx) - reference(y, x)|` over the
/// region where both are defined. `accs` holds one accumulator per channel,
/// or a single one to pool channels.
///
/// Returns `false` when the shift leaves no overlap.
pub(crate) fn accumulate(
    computed: &Image,
    reference: &Image,
    (dy, dx): (isize, isize),
    accs: &mut [DiffAccumulator],
) -> bool {
    let s = reference.shape();
    let ys = overlap(s.height, dy);
    let xs = overlap(s.width, dx);
    if ys.is_empty() || xs.is_empty() {
        return false;
    }
    let pooled = accs.len() == 1;
    let range = reference.element_type().color_range();
    for c in 0..s.channels {
        let acc = &mut accs[if pooled { 0 } else { c }];
        for y in ys.clone() {
            let cy = y.wrapping_add_signed(dy);
            for x in xs.clone() {
                let cx = x.wrapping_add_signed(dx);
                acc.push(computed.value(cy, cx, c), reference.value(y, x, c), range);
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_excludes_shifted_border() {
        assert_eq!(overlap(4, 0), 0..4);
        assert_eq!(overlap(4, 1), 0..3);
        assert_eq!(overlap(4, -1), 1..4);
        assert!(overlap(1, 1).is_empty());
    }

    #[test]
    fn stats_in_percent_of_range() {
        let mut acc = DiffAccumulator::default();
        acc.push(10.0, 10.0, 255.0);
        acc.push(0.0, 51.0, 255.0);
        acc.push(51.0, 0.0, 255.0);
        let st = acc.finish(Some(1), 255.0);
        assert_eq!((st.same, st.bigger, st.less), (1, 1, 1));
        assert!((st.mean - 34.0 / 255.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn nan_counts_as_full_range() {
        let mut acc = DiffAccumulator::default();
        acc.push(f64::NAN, 0.0, 255.0);
        acc.push(0.0, f64::NAN, 255.0);
        let st = acc.finish(None, 255.0);
        assert_eq!((st.bigger, st.less), (1, 1));
        assert_eq!(st.mean, 100.0);

        let mut acc = DiffAccumulator::default();
        acc.push(f64::NAN, f64::NAN, 255.0);
        let st = acc.finish(None, 255.0);
        assert_eq!((st.same, st.mean), (1, 0.0));
    }

    #[test]
    fn shifted_accumulation_matches_translated_image() {
        // reference is computed moved one pixel right
        let computed = Image::interleaved_u8(1, 4, 1, vec![1, 2, 3, 4]).unwrap();
        let reference = Image::interleaved_u8(1, 4, 1, vec![9, 1, 2, 3]).unwrap();
        let mut accs = [DiffAccumulator::default()];
        assert!(accumulate(&computed, &reference, (0, -1), &mut accs));
        let st = accs[0].finish(None, 255.0);
        assert_eq!(st.count, 3);
        assert_eq!(st.mean, 0.0);
    }
}
