use imgref::ImgRef;

use super::convert::ConvertRow;
use crate::error::StageError;
use crate::geometry::CropWindow;
use crate::image::{Image, Shape};
use crate::pixel::{Layout, with_buffer};

/// Copy `window` out of an interleaved 8-bit `src` into `dst`, converting
/// every element to `T` and writing in `layout` order.
///
/// Source rows are `window.source_width * channels` elements apart, so the
/// window is read as a strided sub-image of the full source.
pub fn crop<T: ConvertRow>(
    src: &[u8],
    window: &CropWindow,
    channels: usize,
    layout: Layout,
    dst: &mut [T],
) -> Result<(), StageError> {
    let c = channels;
    let stride = window.source_width * c;
    let needed = stride * window.source_height;
    if src.len() < needed {
        return Err(StageError::ShapeMismatch(format!(
            "source holds {} elements, {}x{}x{c} needs {needed}",
            src.len(),
            window.source_height,
            window.source_width
        )));
    }
    if window.origin_y + window.height > window.source_height
        || window.origin_x + window.width > window.source_width
    {
        return Err(StageError::ShapeMismatch(format!(
            "window {window:?} exceeds its source"
        )));
    }
    let row_len = window.width * c;
    let out_len = row_len * window.height;
    if dst.len() != out_len {
        return Err(StageError::ShapeMismatch(format!(
            "output holds {} elements, crop needs {out_len}",
            dst.len()
        )));
    }
    if out_len == 0 {
        return Ok(());
    }

    let full = ImgRef::new_stride(&src[..needed], stride, window.source_height, stride);
    let view = full.sub_image(window.origin_x * c, window.origin_y, row_len, window.height);

    match layout {
        Layout::Interleaved => {
            for (row, out) in view.rows().zip(dst.chunks_exact_mut(row_len)) {
                T::convert_row(row, 1, out);
            }
        }
        Layout::Planar => {
            let plane = window.width * window.height;
            for (ch, plane_out) in dst.chunks_exact_mut(plane).enumerate() {
                for (row, out) in view.rows().zip(plane_out.chunks_exact_mut(window.width)) {
                    T::convert_row(&row[ch..], c, out);
                }
            }
        }
    }
    Ok(())
}

/// Crop `src` into a `dst` image already sized to the window, dispatching
/// on the destination element type.
pub fn crop_image(src: &Image, window: &CropWindow, dst: &mut Image) -> Result<(), StageError> {
    if src.layout() != Layout::Interleaved {
        return Err(StageError::InvalidArgument(
            "crop input must be channel-interleaved".into(),
        ));
    }
    let s = src.shape();
    if s.height != window.source_height || s.width != window.source_width {
        return Err(StageError::ShapeMismatch(format!(
            "window resolved for {}x{}, input is {}x{}",
            window.source_height, window.source_width, s.height, s.width
        )));
    }
    let expected = Shape::new(window.height, window.width, s.channels);
    if dst.shape() != expected {
        return Err(StageError::ShapeMismatch(format!(
            "output sized {:?}, crop produces {expected:?}",
            dst.shape()
        )));
    }
    let pixels = src.pixels::<u8>()?;
    let layout = dst.layout();
    with_buffer!(dst.data_mut(), v => crop(pixels, window, s.channels, layout, v.as_mut_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    /// 4x4x3 image where every element encodes its own (y, x, c).
    fn coded_source() -> Vec<u8> {
        let mut v = Vec::with_capacity(48);
        for y in 0..4u8 {
            for x in 0..4u8 {
                for c in 0..3u8 {
                    v.push(y * 100 + x * 10 + c);
                }
            }
        }
        v
    }

    fn window(oy: usize, ox: usize, h: usize, w: usize) -> CropWindow {
        CropWindow {
            source_height: 4,
            source_width: 4,
            origin_y: oy,
            origin_x: ox,
            height: h,
            width: w,
        }
    }

    #[test]
    fn interleaved_window_uses_source_stride() {
        let src = coded_source();
        let mut out = vec![0u8; 2 * 2 * 3];
        crop(&src, &window(1, 2, 2, 2), 3, Layout::Interleaved, &mut out).unwrap();
        assert_eq!(
            out,
            [120, 121, 122, 130, 131, 132, 220, 221, 222, 230, 231, 232]
        );
    }

    #[test]
    fn planar_window_splits_channels() {
        let src = coded_source();
        let mut out = vec![0f32; 2 * 2 * 3];
        crop(&src, &window(0, 0, 2, 2), 3, Layout::Planar, &mut out).unwrap();
        assert_eq!(
            out,
            [0., 10., 100., 110., 1., 11., 101., 111., 2., 12., 102., 112.]
        );
    }

    #[test]
    fn half_output_matches_two_step_conversion() {
        let src = coded_source();
        let mut out = vec![f16::ZERO; 3 * 4 * 3];
        crop(&src, &window(1, 0, 3, 4), 3, Layout::Planar, &mut out).unwrap();
        let mut reference = vec![0f32; out.len()];
        crop(&src, &window(1, 0, 3, 4), 3, Layout::Planar, &mut reference).unwrap();
        for (h, f) in out.iter().zip(&reference) {
            assert_eq!(h.to_bits(), f16::from_f32(*f).to_bits());
        }
    }

    #[test]
    fn rejects_wrong_output_size() {
        let src = coded_source();
        let mut out = vec![0u8; 5];
        let err = crop(&src, &window(0, 0, 2, 2), 3, Layout::Planar, &mut out).unwrap_err();
        assert!(matches!(err, StageError::ShapeMismatch(_)));
    }
}
