use crate::error::StageError;
use crate::image::Shape;
use crate::pixel::ElementType;

/// Resource limits applied to every output buffer an operator allocates.
///
/// All fields default to `None` (no limit).
#[derive(Clone, Debug, Default)]
pub struct Limits {
    pub max_width: Option<u64>,
    pub max_height: Option<u64>,
    /// Maximum pixel count (width * height).
    pub max_pixels: Option<u64>,
    /// Maximum bytes for a single output buffer.
    pub max_memory_bytes: Option<u64>,
}

impl Limits {
    pub fn with_max_width(mut self, v: u64) -> Self {
        self.max_width = Some(v);
        self
    }

    pub fn with_max_height(mut self, v: u64) -> Self {
        self.max_height = Some(v);
        self
    }

    pub fn with_max_pixels(mut self, v: u64) -> Self {
        self.max_pixels = Some(v);
        self
    }

    pub fn with_max_memory_bytes(mut self, v: u64) -> Self {
        self.max_memory_bytes = Some(v);
        self
    }

    /// Check an output allocation of `shape` elements of type `ty`.
    pub(crate) fn check_output(&self, shape: Shape, ty: ElementType) -> Result<(), StageError> {
        let (w, h) = (shape.width as u64, shape.height as u64);
        if let Some(max_w) = self.max_width.filter(|&m| w > m) {
            return Err(StageError::LimitExceeded(format!(
                "width {w} exceeds limit {max_w}"
            )));
        }
        if let Some(max_h) = self.max_height.filter(|&m| h > m) {
            return Err(StageError::LimitExceeded(format!(
                "height {h} exceeds limit {max_h}"
            )));
        }
        let pixels = w.saturating_mul(h);
        if let Some(max_px) = self.max_pixels.filter(|&m| pixels > m) {
            return Err(StageError::LimitExceeded(format!(
                "pixel count {pixels} exceeds limit {max_px}"
            )));
        }
        let bytes = pixels
            .saturating_mul(shape.channels as u64)
            .saturating_mul(ty.size() as u64);
        if let Some(max_mem) = self.max_memory_bytes.filter(|&m| bytes > m) {
            return Err(StageError::LimitExceeded(format!(
                "allocation {bytes} bytes exceeds memory limit {max_mem}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_by_default() {
        let shape = Shape::new(1 << 16, 1 << 16, 3);
        assert!(Limits::default().check_output(shape, ElementType::F32).is_ok());
    }

    #[test]
    fn memory_counts_element_size() {
        let limits = Limits::default().with_max_memory_bytes(48);
        let shape = Shape::new(2, 2, 3);
        assert!(limits.check_output(shape, ElementType::U8).is_ok());
        assert!(limits.check_output(shape, ElementType::F32).is_ok());
        let err = limits.check_output(shape, ElementType::I64).unwrap_err();
        assert!(matches!(err, StageError::LimitExceeded(_)));
    }
}
