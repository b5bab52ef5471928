use crate::error::StageError;
use crate::pixel::{Element, ElementType, Layout, PixelBuffer};

/// Image dimensions. Always listed as height, width, channels regardless of
/// the buffer's memory layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Shape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl Shape {
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Total element count, `None` on overflow.
    pub fn len(&self) -> Option<usize> {
        self.height
            .checked_mul(self.width)
            .and_then(|hw| hw.checked_mul(self.channels))
    }

    /// Dimensions in memory order for `layout`.
    pub fn dims(&self, layout: Layout) -> [usize; 3] {
        match layout {
            Layout::Interleaved => [self.height, self.width, self.channels],
            Layout::Planar => [self.channels, self.height, self.width],
        }
    }
}

/// A contiguous pixel buffer with its shape and layout.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    shape: Shape,
    layout: Layout,
    data: PixelBuffer,
}

impl Image {
    /// Wrap an existing buffer. Fails when the buffer length does not match
    /// the shape.
    pub fn new(
        shape: Shape,
        layout: Layout,
        data: impl Into<PixelBuffer>,
    ) -> Result<Self, StageError> {
        let data = data.into();
        let expected = shape.len().ok_or_else(|| {
            StageError::ShapeMismatch(format!("{shape:?} element count overflows"))
        })?;
        if data.len() != expected {
            return Err(StageError::ShapeMismatch(format!(
                "buffer holds {} elements, {shape:?} needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            shape,
            layout,
            data,
        })
    }

    /// Interleaved 8-bit image, the layout decoders hand to the pipeline.
    pub fn interleaved_u8(
        height: usize,
        width: usize,
        channels: usize,
        pixels: Vec<u8>,
    ) -> Result<Self, StageError> {
        Self::new(
            Shape::new(height, width, channels),
            Layout::Interleaved,
            pixels,
        )
    }

    /// Empty placeholder for an output slot that has not been sized yet.
    pub fn empty() -> Self {
        Self {
            shape: Shape::default(),
            layout: Layout::Interleaved,
            data: PixelBuffer::U8(Vec::new()),
        }
    }

    /// Re-size this image in place, reusing the allocation when the element
    /// type is unchanged. Contents are zeroed.
    pub fn resize(
        &mut self,
        shape: Shape,
        ty: ElementType,
        layout: Layout,
    ) -> Result<(), StageError> {
        let len = shape.len().ok_or_else(|| {
            StageError::ShapeMismatch(format!("{shape:?} element count overflows"))
        })?;
        if self.data.element_type() == ty {
            crate::pixel::with_buffer!(&mut self.data, v => {
                v.clear();
                v.resize(len, Default::default());
            });
        } else {
            self.data = PixelBuffer::zeroed(ty, len);
        }
        self.shape = shape;
        self.layout = layout;
        Ok(())
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn data(&self) -> &PixelBuffer {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut PixelBuffer {
        &mut self.data
    }

    pub fn into_data(self) -> PixelBuffer {
        self.data
    }

    /// Typed pixel slice. Fails with `UnsupportedType` when `T` does not
    /// match the stored element type.
    pub fn pixels<T: Element>(&self) -> Result<&[T], StageError> {
        let actual = self.element_type();
        self.data.as_slice::<T>().ok_or_else(|| {
            StageError::UnsupportedType(format!("expected {:?}, got {actual:?}", T::TYPE))
        })
    }

    /// Mutable typed pixel slice.
    pub fn pixels_mut<T: Element>(&mut self) -> Result<&mut [T], StageError> {
        let actual = self.element_type();
        self.data.as_mut_slice::<T>().ok_or_else(|| {
            StageError::UnsupportedType(format!("expected {:?}, got {actual:?}", T::TYPE))
        })
    }

    /// Value at `(y, x, c)` widened to `f64`, honoring the layout.
    #[inline]
    pub fn value(&self, y: usize, x: usize, c: usize) -> f64 {
        let s = self.shape;
        self.data
            .get_f64(self.layout.index(s.height, s.width, s.channels, y, x, c))
    }

    /// Copy with the opposite layout, same element type.
    pub fn to_layout(&self, layout: Layout) -> Image {
        if layout == self.layout {
            return self.clone();
        }
        let s = self.shape;
        let src_layout = self.layout;
        let data = crate::pixel::with_buffer!(&self.data, v => {
            let mut out = v.clone();
            for c in 0..s.channels {
                for y in 0..s.height {
                    for x in 0..s.width {
                        out[layout.index(s.height, s.width, s.channels, y, x, c)] =
                            v[src_layout.index(s.height, s.width, s.channels, y, x, c)];
                    }
                }
            }
            PixelBuffer::from(out)
        });
        Image {
            shape: s,
            layout,
            data,
        }
    }
}

/// One input set: a fixed-cardinality sequence of samples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    pub images: Vec<Image>,
}

impl Batch {
    pub fn new(images: Vec<Image>) -> Self {
        Self { images }
    }

    /// `n` samples drawn from `sources` in round-robin order.
    pub fn cycled(sources: &[Image], n: usize) -> Result<Self, StageError> {
        if sources.is_empty() {
            return Err(StageError::InvalidArgument(
                "cannot build a batch from zero source images".into(),
            ));
        }
        Ok(Self {
            images: (0..n).map(|i| sources[i % sources.len()].clone()).collect(),
        })
    }

    /// `n` unsized output slots.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            images: (0..n).map(|_| Image::empty()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
