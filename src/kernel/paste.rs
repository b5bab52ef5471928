use imgref::ImgRefMut;

use crate::error::StageError;
use crate::geometry::PastePlacement;
use crate::image::{Image, Shape};
use crate::pixel::{Element, Layout, PixelBuffer, with_buffer};

/// Fill the canvas `dst` with `fill`, then blit `src` at the placement.
///
/// `src` and `dst` share `layout` and element type; no conversion happens.
pub fn paste<T: Element>(
    src: &[T],
    placement: &PastePlacement,
    channels: usize,
    layout: Layout,
    fill: &[T],
    dst: &mut [T],
) -> Result<(), StageError> {
    let p = placement;
    let c = channels;
    if fill.len() != c {
        return Err(StageError::ShapeMismatch(format!(
            "fill value has {} entries for {c} channels",
            fill.len()
        )));
    }
    let src_plane = p.source_height * p.source_width;
    if src_plane == 0 {
        return Err(StageError::InvalidArgument(format!(
            "paste source must be non-empty, got {}x{}",
            p.source_height, p.source_width
        )));
    }
    let dst_plane = p.canvas_height * p.canvas_width;
    if src.len() != src_plane * c {
        return Err(StageError::ShapeMismatch(format!(
            "source holds {} elements, {}x{}x{c} needs {}",
            src.len(),
            p.source_height,
            p.source_width,
            src_plane * c
        )));
    }
    if dst.len() != dst_plane * c {
        return Err(StageError::ShapeMismatch(format!(
            "canvas holds {} elements, {}x{}x{c} needs {}",
            dst.len(),
            p.canvas_height,
            p.canvas_width,
            dst_plane * c
        )));
    }
    if p.origin_y + p.source_height > p.canvas_height
        || p.origin_x + p.source_width > p.canvas_width
    {
        return Err(StageError::ShapeMismatch(format!(
            "placement {p:?} exceeds its canvas"
        )));
    }
    if dst.is_empty() {
        return Ok(());
    }

    match layout {
        Layout::Interleaved => {
            for px in dst.chunks_exact_mut(c) {
                px.copy_from_slice(fill);
            }
            let row_len = p.source_width * c;
            let mut canvas = ImgRefMut::new(dst, p.canvas_width * c, p.canvas_height);
            let mut region =
                canvas.sub_image_mut(p.origin_x * c, p.origin_y, row_len, p.source_height);
            for (out, row) in region.rows_mut().zip(src.chunks_exact(row_len)) {
                out.copy_from_slice(row);
            }
        }
        Layout::Planar => {
            let planes = dst.chunks_exact_mut(dst_plane).zip(src.chunks_exact(src_plane));
            for ((plane, src_px), &value) in planes.zip(fill) {
                plane.fill(value);
                let mut canvas = ImgRefMut::new(plane, p.canvas_width, p.canvas_height);
                let mut region = canvas.sub_image_mut(
                    p.origin_x,
                    p.origin_y,
                    p.source_width,
                    p.source_height,
                );
                for (out, row) in region.rows_mut().zip(src_px.chunks_exact(p.source_width)) {
                    out.copy_from_slice(row);
                }
            }
        }
    }
    Ok(())
}

/// Paste `src` into a `dst` image already sized to the canvas. `fill` must
/// hold one value per channel in the source's element type.
pub fn paste_image(
    src: &Image,
    placement: &PastePlacement,
    fill: &PixelBuffer,
    dst: &mut Image,
) -> Result<(), StageError> {
    let s = src.shape();
    if s.height != placement.source_height || s.width != placement.source_width {
        return Err(StageError::ShapeMismatch(format!(
            "placement resolved for {}x{}, input is {}x{}",
            placement.source_height, placement.source_width, s.height, s.width
        )));
    }
    let expected = Shape::new(placement.canvas_height, placement.canvas_width, s.channels);
    if dst.shape() != expected || dst.layout() != src.layout() {
        return Err(StageError::ShapeMismatch(format!(
            "output sized {:?} {:?}, paste produces {expected:?} {:?}",
            dst.shape(),
            dst.layout(),
            src.layout()
        )));
    }
    if dst.element_type() != src.element_type() || fill.element_type() != src.element_type() {
        return Err(StageError::UnsupportedType(format!(
            "paste keeps the input type {:?}, got output {:?} and fill {:?}",
            src.element_type(),
            dst.element_type(),
            fill.element_type()
        )));
    }
    let layout = src.layout();
    with_buffer!(dst.data_mut(), v => {
        let out = v.as_mut_slice();
        let pixels = src.data().as_slice().ok_or_else(|| type_error(src))?;
        let fill = fill.as_slice().ok_or_else(|| type_error(src))?;
        paste(pixels, placement, s.channels, layout, fill, out)
    })
}

fn type_error(src: &Image) -> StageError {
    StageError::UnsupportedType(format!("paste input {:?}", src.element_type()))
}
