use crate::error::StageError;
use crate::image::Image;

const WINDOW: usize = 11;
const SIGMA: f64 = 1.5;
/// `(0.01 * 255)^2`
const C1: f64 = 6.5025;
/// `(0.03 * 255)^2`
const C2: f64 = 58.5225;

fn gaussian_kernel() -> [f64; WINDOW] {
    let mut k = [0.0; WINDOW];
    let center = (WINDOW / 2) as f64;
    for (i, w) in k.iter_mut().enumerate() {
        let d = i as f64 - center;
        *w = (-(d * d) / (2.0 * SIGMA * SIGMA)).exp();
    }
    let sum: f64 = k.iter().sum();
    k.iter_mut().for_each(|w| *w /= sum);
    k
}

/// Mirror `i` into `0..n` without repeating the edge sample (`dcb|abcd|cba`).
fn reflect101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let i = i.rem_euclid(period);
    let i = if i >= n as isize { period - i } else { i };
    i as usize
}

/// Separable Gaussian blur of a `h × w` plane.
fn blur(plane: &[f64], h: usize, w: usize, kernel: &[f64; WINDOW]) -> Vec<f64> {
    let r = (WINDOW / 2) as isize;
    let mut tmp = vec![0.0; plane.len()];
    for y in 0..h {
        let row = &plane[y * w..][..w];
        for x in 0..w {
            tmp[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, &kw)| kw * row[reflect101(x as isize + k as isize - r, w)])
                .sum();
        }
    }
    let mut out = vec![0.0; plane.len()];
    for y in 0..h {
        for x in 0..w {
            out[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, &kw)| kw * tmp[reflect101(y as isize + k as isize - r, h) * w + x])
                .sum();
        }
    }
    out
}

fn plane(img: &Image, c: usize) -> Vec<f64> {
    let s = img.shape();
    let mut v = Vec::with_capacity(s.height * s.width);
    for y in 0..s.height {
        for x in 0..s.width {
            v.push(img.value(y, x, c));
        }
    }
    v
}

/// Mean structural similarity of `a` and `b`, one value per channel.
///
/// Gaussian-weighted 11×11 window with σ = 1.5 and reflected borders, on the
/// raw element values. Identical images score 1.
pub fn mssim(a: &Image, b: &Image) -> Result<Vec<f64>, StageError> {
    if a.shape() != b.shape() {
        return Err(StageError::ShapeMismatch(format!(
            "ssim of {:?} against {:?}",
            a.shape(),
            b.shape()
        )));
    }
    let s = a.shape();
    let (h, w) = (s.height, s.width);
    if h == 0 || w == 0 {
        return Err(StageError::InvalidArgument(format!(
            "ssim needs a non-empty image, got {h}x{w}"
        )));
    }
    let kernel = gaussian_kernel();
    let mut result = Vec::with_capacity(s.channels);
    for c in 0..s.channels {
        let i1 = plane(a, c);
        let i2 = plane(b, c);
        let product = |p: &[f64], q: &[f64]| -> Vec<f64> {
            p.iter().zip(q).map(|(x, y)| x * y).collect()
        };
        let mu1 = blur(&i1, h, w, &kernel);
        let mu2 = blur(&i2, h, w, &kernel);
        let s11 = blur(&product(&i1, &i1), h, w, &kernel);
        let s22 = blur(&product(&i2, &i2), h, w, &kernel);
        let s12 = blur(&product(&i1, &i2), h, w, &kernel);

        let mut total = 0.0;
        for k in 0..h * w {
            let (m1, m2) = (mu1[k], mu2[k]);
            let var1 = s11[k] - m1 * m1;
            let var2 = s22[k] - m2 * m2;
            let cov = s12[k] - m1 * m2;
            total += ((2.0 * m1 * m2 + C1) * (2.0 * cov + C2))
                / ((m1 * m1 + m2 * m2 + C1) * (var1 + var2 + C2));
        }
        result.push(total / (h * w) as f64);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(h: usize, w: usize, seed: u32) -> Image {
        let mut x = seed;
        let pixels = (0..h * w * 3)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12345);
                (x >> 16) as u8
            })
            .collect();
        Image::interleaved_u8(h, w, 3, pixels).unwrap()
    }

    #[test]
    fn reflect_skips_edge() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(-7, 3), 1);
        assert_eq!(reflect101(4, 1), 0);
    }

    #[test]
    fn identical_images_score_one() {
        let img = noise(16, 12, 7);
        for v in mssim(&img, &img).unwrap() {
            assert!((v - 1.0).abs() < 1e-9, "{v}");
        }
    }

    #[test]
    fn unrelated_noise_scores_low() {
        let a = noise(24, 24, 1);
        let b = noise(24, 24, 2);
        for v in mssim(&a, &b).unwrap() {
            assert!(v < 0.5, "{v}");
        }
    }

    #[test]
    fn layout_does_not_change_score() {
        let a = noise(9, 7, 3);
        let b = noise(9, 7, 4);
        let planar = mssim(
            &a.to_layout(crate::pixel::Layout::Planar),
            &b.to_layout(crate::pixel::Layout::Planar),
        )
        .unwrap();
        assert_eq!(planar, mssim(&a, &b).unwrap());
    }
}
