//! Per-sample geometry: crop windows and paste placements.
//!
//! Everything here is a pure function of its arguments.

use crate::error::StageError;

/// Pixel window extracted from a source image by the crop kernel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CropWindow {
    pub source_height: usize,
    pub source_width: usize,
    pub origin_y: usize,
    pub origin_x: usize,
    pub height: usize,
    pub width: usize,
}

/// Placement of a source image inside a larger fill canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PastePlacement {
    pub source_height: usize,
    pub source_width: usize,
    pub canvas_height: usize,
    pub canvas_width: usize,
    pub origin_y: usize,
    pub origin_x: usize,
}

fn check_unit(name: &str, v: f32) -> Result<(), StageError> {
    if !(0.0..=1.0).contains(&v) {
        return Err(StageError::InvalidArgument(format!(
            "{name} must be within [0, 1], got {v}"
        )));
    }
    Ok(())
}

/// Check crop preconditions: positive dimensions and 1 or 3 channels.
pub fn validate_crop(height: usize, width: usize, channels: usize) -> Result<(), StageError> {
    if height == 0 || width == 0 {
        return Err(StageError::InvalidArgument(format!(
            "crop dimensions must be positive, got {height}x{width}"
        )));
    }
    if channels != 1 && channels != 3 {
        return Err(StageError::InvalidArgument(format!(
            "crop supports 1 or 3 channels, got {channels}"
        )));
    }
    Ok(())
}

/// Resolve the crop origin for a `window_h × window_w` window anchored at
/// normalized `(anchor_y, anchor_x)` inside a `source_h × source_w` image.
///
/// `origin = round(anchor * (source - window))`, so `origin + window` never
/// exceeds the source.
pub fn resolve_crop(
    source_h: usize,
    source_w: usize,
    channels: usize,
    window_h: usize,
    window_w: usize,
    anchor_y: f32,
    anchor_x: f32,
) -> Result<CropWindow, StageError> {
    if source_h == 0 || source_w == 0 {
        return Err(StageError::InvalidArgument(format!(
            "source dimensions must be positive, got {source_h}x{source_w}"
        )));
    }
    validate_crop(window_h, window_w, channels)?;
    check_unit("crop_pos_y", anchor_y)?;
    check_unit("crop_pos_x", anchor_x)?;
    if window_h > source_h || window_w > source_w {
        return Err(StageError::ShapeMismatch(format!(
            "crop window {window_h}x{window_w} larger than image {source_h}x{source_w}"
        )));
    }
    let origin = |anchor: f32, slack: usize| -> usize {
        let o = (f64::from(anchor) * slack as f64).round() as usize;
        o.min(slack)
    };
    Ok(CropWindow {
        source_height: source_h,
        source_width: source_w,
        origin_y: origin(anchor_y, source_h - window_h),
        origin_x: origin(anchor_x, source_w - window_w),
        height: window_h,
        width: window_w,
    })
}

/// Resolve the canvas size and placement for pasting a `source_h × source_w`
/// image with enlargement `ratio` at normalized `(place_y, place_x)`.
///
/// `canvas = floor(ratio * source)`, `origin = floor(place * (canvas - source))`.
pub fn resolve_paste(
    source_h: usize,
    source_w: usize,
    ratio: f32,
    place_y: f32,
    place_x: f32,
) -> Result<PastePlacement, StageError> {
    if source_h == 0 || source_w == 0 {
        return Err(StageError::InvalidArgument(format!(
            "source dimensions must be positive, got {source_h}x{source_w}"
        )));
    }
    if ratio.is_nan() || ratio.is_infinite() || ratio < 1.0 {
        return Err(StageError::InvalidArgument(format!(
            "ratio must be a finite value >= 1, got {ratio}"
        )));
    }
    check_unit("paste_y", place_y)?;
    check_unit("paste_x", place_x)?;

    let canvas_h = (ratio * source_h as f32) as usize;
    let canvas_w = (ratio * source_w as f32) as usize;
    // f32 rounding on huge dims can land a hair under `source`.
    let canvas_h = canvas_h.max(source_h);
    let canvas_w = canvas_w.max(source_w);

    let origin_y = (place_y * (canvas_h - source_h) as f32) as usize;
    let origin_x = (place_x * (canvas_w - source_w) as f32) as usize;
    Ok(PastePlacement {
        source_height: source_h,
        source_width: source_w,
        canvas_height: canvas_h,
        canvas_width: canvas_w,
        origin_y: origin_y.min(canvas_h - source_h),
        origin_x: origin_x.min(canvas_w - source_w),
    })
}
