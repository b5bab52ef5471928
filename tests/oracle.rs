use zenstage::oracle::mssim;
use zenstage::*;

fn gradient(h: usize, w: usize, seed: usize) -> Image {
    let mut pixels = Vec::with_capacity(h * w * 3);
    for y in 0..h {
        for x in 0..w {
            for c in 0..3 {
                pixels.push(((y * 17 + x * 29 + c * 53 + seed * 7) % 256) as u8);
            }
        }
    }
    Image::interleaved_u8(h, w, 3, pixels).unwrap()
}

/// `src` translated by one pixel to the right, left column repeated.
fn shifted_right(src: &Image) -> Image {
    let s = src.shape();
    let mut pixels = Vec::with_capacity(s.height * s.width * s.channels);
    for y in 0..s.height {
        for x in 0..s.width {
            for c in 0..s.channels {
                pixels.push(src.value(y, x.saturating_sub(1), c) as u8);
            }
        }
    }
    Image::interleaved_u8(s.height, s.width, s.channels, pixels).unwrap()
}

fn all_modes() -> Vec<CompareMode> {
    let mut modes = Vec::new();
    for bits in 0..32u32 {
        modes.push(
            CompareMode::new()
                .with_per_channel(bits & 1 != 0)
                .with_per_element(bits & 2 != 0)
                .with_check_all(bits & 4 != 0)
                .with_no_assert(bits & 8 != 0)
                .with_best_match(bits & 16 != 0),
        );
    }
    modes
}

#[test]
fn identical_batches_pass_with_zero_difference() {
    let sources: Vec<Image> = (0..4).map(|i| gradient(6, 5, i)).collect();
    let batch = Batch::cycled(&sources, 10).unwrap();
    let mode = CompareMode::new().with_per_channel(true).with_per_element(true);
    let report = compare(&batch, &batch.clone(), 0.0, mode).unwrap();
    assert!(report.passed());
    assert_eq!(report.elements.len(), 10);
    for record in &report.elements {
        assert_eq!(record.channels.len(), 3);
        for st in &record.channels {
            assert_eq!(st.mean, 0.0);
            assert_eq!(st.same, 30);
        }
    }
}

#[test]
fn comparison_is_idempotent_in_every_mode() {
    let batch = Batch::cycled(&[gradient(4, 4, 1), gradient(3, 7, 2)], 5).unwrap();
    for mode in all_modes() {
        for tolerance in [0.0, 0.5, 100.0] {
            let report = compare(&batch, &batch, tolerance, mode).unwrap();
            assert!(report.passed(), "{mode:?} at {tolerance}");
        }
    }
}

#[test]
fn best_match_never_increases_the_score() {
    let a: Vec<Image> = (0..3).map(|i| gradient(8, 8, i)).collect();
    let b: Vec<Image> = a.iter().map(shifted_right).collect();
    let a = Batch::new(a);
    let b = Batch::new(b);
    let base = CompareMode::new()
        .with_per_channel(true)
        .with_per_element(true)
        .with_check_all(true)
        .with_no_assert(true);
    let plain = compare(&a, &b, 0.0, base).unwrap();
    let best = compare(&a, &b, 0.0, base.with_best_match(true)).unwrap();
    for (p, q) in plain.elements.iter().zip(&best.elements) {
        assert!(q.worst_mean <= p.worst_mean);
        assert!(p.worst_mean > 0.0);
        assert_eq!(q.worst_mean, 0.0);
        assert_eq!(q.shift, (0, -1));
    }
}

#[test]
fn best_match_tolerates_one_pixel_offset() {
    let a = Batch::new(vec![gradient(9, 9, 3)]);
    let b = Batch::new(vec![shifted_right(&a.images[0])]);
    let mode = CompareMode::new().with_per_channel(true).with_per_element(true);
    assert!(matches!(
        compare(&a, &b, 0.0, mode),
        Err(StageError::ComparisonFailed(_))
    ));
    assert!(compare(&a, &b, 0.0, mode.with_best_match(true)).is_ok());
}

#[test]
fn no_assert_reports_without_failing() {
    let a = Batch::new(vec![gradient(4, 4, 0)]);
    let b = Batch::new(vec![gradient(4, 4, 9)]);
    let report = compare(&a, &b, 1.0, CompareMode::new().with_no_assert(true)).unwrap();
    assert!(!report.passed());
    assert_eq!(report.failures, [0]);
    assert!(report.worst().is_some_and(|w| w.worst_mean > 1.0));

    let err = compare(&a, &b, 1.0, CompareMode::new()).unwrap_err();
    let StageError::ComparisonFailed(report) = err else {
        panic!("expected a comparison failure");
    };
    assert_eq!(report.failures.len(), 1);
}

#[test]
fn float_batches_use_color_scale() {
    let a = Image::new(Shape::new(1, 2, 1), Layout::Planar, vec![0.0f32, 0.0]).unwrap();
    let b = Image::new(Shape::new(1, 2, 1), Layout::Planar, vec![25.5f32, 0.0]).unwrap();
    let report = compare(
        &Batch::new(vec![a]),
        &Batch::new(vec![b]),
        10.0,
        CompareMode::new(),
    )
    .unwrap();
    assert!((report.elements[0].worst_mean - 5.0).abs() < 1e-6);
}

#[test]
fn mssim_ranks_similar_above_dissimilar() {
    let a = gradient(16, 16, 0);
    let near = shifted_right(&a);
    let far = gradient(16, 16, 20);
    let to_near = mssim(&a, &near).unwrap();
    let to_far = mssim(&a, &far).unwrap();
    let to_self = mssim(&a, &a).unwrap();
    for c in 0..3 {
        assert!((to_self[c] - 1.0).abs() < 1e-9);
        assert!(to_near[c] < to_self[c]);
    }
    assert!(mssim(&a, &gradient(8, 16, 0)).is_err());
    assert_eq!(to_far.len(), 3);
}
