use half::f16;

/// Element type of a pixel buffer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// IEEE 754 half-precision float.
    F16,
    /// IEEE 754 single-precision float.
    F32,
}

impl ElementType {
    /// Bytes per element.
    pub fn size(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 | Self::F16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 => 8,
        }
    }

    /// Full-scale value used to normalize differences into percent.
    ///
    /// Float buffers produced from 8-bit sources keep the 0..255 scale, so
    /// they share the 8-bit range.
    pub fn color_range(&self) -> f64 {
        match self {
            Self::U8 | Self::F16 | Self::F32 => 255.0,
            Self::I16 => i16::MAX as f64,
            Self::I32 => i32::MAX as f64,
            Self::I64 => i64::MAX as f64,
        }
    }
}

/// Memory arrangement of channels within an image buffer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Channel-interleaved, pixel-major (HWC).
    Interleaved,
    /// Channel-planar, channel-major (CHW).
    #[default]
    Planar,
}

impl Layout {
    /// Flat index of `(y, x, c)` in an `h × w × channels` buffer.
    #[inline]
    pub fn index(&self, h: usize, w: usize, channels: usize, y: usize, x: usize, c: usize) -> usize {
        match self {
            Self::Interleaved => (y * w + x) * channels + c,
            Self::Planar => (c * h + y) * w + x,
        }
    }
}

/// A scalar pixel element the kernels can produce.
///
/// Conversion from `f32` is the generic path: `as` casts for integers
/// (saturating), round-to-nearest-even for [`f16`].
pub trait Element: Copy + Default + PartialOrd + Send + Sync + 'static {
    const TYPE: ElementType;

    fn from_f32(v: f32) -> Self;

    fn to_f64(self) -> f64;
}

macro_rules! int_element {
    ($t:ty, $tag:ident) => {
        impl Element for $t {
            const TYPE: ElementType = ElementType::$tag;

            #[inline]
            fn from_f32(v: f32) -> Self {
                v as $t
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

int_element!(u8, U8);
int_element!(i16, I16);
int_element!(i32, I32);
int_element!(i64, I64);

impl Element for f32 {
    const TYPE: ElementType = ElementType::F32;

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }

    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Element for f16 {
    const TYPE: ElementType = ElementType::F16;

    #[inline]
    fn from_f32(v: f32) -> Self {
        f16::from_f32(v)
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self.to_f64()
    }
}

/// Owned pixel storage, tagged by element type.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub enum PixelBuffer {
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F16(Vec<f16>),
    F32(Vec<f32>),
}

/// Expands `$body` once per variant with `$v` bound to the inner `Vec`.
macro_rules! with_buffer {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            $crate::pixel::PixelBuffer::U8($v) => $body,
            $crate::pixel::PixelBuffer::I16($v) => $body,
            $crate::pixel::PixelBuffer::I32($v) => $body,
            $crate::pixel::PixelBuffer::I64($v) => $body,
            $crate::pixel::PixelBuffer::F16($v) => $body,
            $crate::pixel::PixelBuffer::F32($v) => $body,
        }
    };
}
pub(crate) use with_buffer;

impl PixelBuffer {
    /// Zero-filled buffer of `len` elements.
    pub fn zeroed(ty: ElementType, len: usize) -> Self {
        match ty {
            ElementType::U8 => Self::U8(vec![0; len]),
            ElementType::I16 => Self::I16(vec![0; len]),
            ElementType::I32 => Self::I32(vec![0; len]),
            ElementType::I64 => Self::I64(vec![0; len]),
            ElementType::F16 => Self::F16(vec![f16::ZERO; len]),
            ElementType::F32 => Self::F32(vec![0.0; len]),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Self::U8(_) => ElementType::U8,
            Self::I16(_) => ElementType::I16,
            Self::I32(_) => ElementType::I32,
            Self::I64(_) => ElementType::I64,
            Self::F16(_) => ElementType::F16,
            Self::F32(_) => ElementType::F32,
        }
    }

    pub fn len(&self) -> usize {
        with_buffer!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `i` widened to `f64`.
    #[inline]
    pub fn get_f64(&self, i: usize) -> f64 {
        with_buffer!(self, v => v[i].to_f64())
    }

    /// Typed view, `None` when `T` is not this buffer's element type.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        let any: &dyn core::any::Any = with_buffer!(self, v => v);
        any.downcast_ref::<Vec<T>>().map(Vec::as_slice)
    }

    /// Mutable typed view, `None` when `T` is not this buffer's element type.
    pub fn as_mut_slice<T: Element>(&mut self) -> Option<&mut [T]> {
        let any: &mut dyn core::any::Any = with_buffer!(self, v => v);
        any.downcast_mut::<Vec<T>>().map(Vec::as_mut_slice)
    }
}

impl From<Vec<u8>> for PixelBuffer {
    fn from(v: Vec<u8>) -> Self {
        Self::U8(v)
    }
}

impl From<Vec<f32>> for PixelBuffer {
    fn from(v: Vec<f32>) -> Self {
        Self::F32(v)
    }
}

impl From<Vec<f16>> for PixelBuffer {
    fn from(v: Vec<f16>) -> Self {
        Self::F16(v)
    }
}

impl From<Vec<i16>> for PixelBuffer {
    fn from(v: Vec<i16>) -> Self {
        Self::I16(v)
    }
}

impl From<Vec<i32>> for PixelBuffer {
    fn from(v: Vec<i32>) -> Self {
        Self::I32(v)
    }
}

impl From<Vec<i64>> for PixelBuffer {
    fn from(v: Vec<i64>) -> Self {
        Self::I64(v)
    }
}
