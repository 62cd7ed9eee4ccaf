pub mod fits;
pub mod locate;

use std::fmt;
use std::path::PathBuf;

use ndarray::Array2;

use crate::geom::TanWcs;

pub use fits::MaskReader;
pub use locate::{MaskFile, MaskLocator};

/// Unsigned integer width of mask pixels and mask codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PixelType {
    U8,
    U16,
    U32,
    U64,
}

impl PixelType {
    pub fn bits(self) -> u32 {
        match self {
            PixelType::U8 => 8,
            PixelType::U16 => 16,
            PixelType::U32 => 32,
            PixelType::U64 => 64,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    /// Narrowest type that can hold `value`.
    pub fn smallest_for(value: u64) -> Self {
        if value <= u64::from(u8::MAX) {
            PixelType::U8
        } else if value <= u64::from(u16::MAX) {
            PixelType::U16
        } else if value <= u64::from(u32::MAX) {
            PixelType::U32
        } else {
            PixelType::U64
        }
    }

    /// Integer FITS `BITPIX` values, read back as unsigned.
    pub fn from_bitpix(bitpix: i64) -> Option<Self> {
        match bitpix {
            8 => Some(PixelType::U8),
            16 => Some(PixelType::U16),
            32 => Some(PixelType::U32),
            64 => Some(PixelType::U64),
            _ => None,
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uint{}", self.bits())
    }
}

/// A concrete mask pixel type.
///
/// The masking loop is generic over this trait, so each width gets its own
/// monomorphized copy and the runtime dispatch happens once per file.
pub trait MaskWord: Copy + Default + Into<u64> + Send + Sync + 'static {
    const PIXEL_TYPE: PixelType;

    /// Decode one big-endian word. `bytes` has exactly `PIXEL_TYPE.bytes()` elements.
    fn from_be_slice(bytes: &[u8]) -> Self;

    fn wrap(pixels: Array2<Self>) -> MaskPixels;

    /// The array held by `pixels` if it has this word type.
    fn unwrap(pixels: MaskPixels) -> Option<Array2<Self>>;
}

impl MaskWord for u8 {
    const PIXEL_TYPE: PixelType = PixelType::U8;

    fn from_be_slice(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn wrap(pixels: Array2<Self>) -> MaskPixels {
        MaskPixels::U8(pixels)
    }

    fn unwrap(pixels: MaskPixels) -> Option<Array2<Self>> {
        match pixels {
            MaskPixels::U8(a) => Some(a),
            _ => None,
        }
    }
}

impl MaskWord for u16 {
    const PIXEL_TYPE: PixelType = PixelType::U16;

    fn from_be_slice(bytes: &[u8]) -> Self {
        let mut word = [0u8; 2];
        word.copy_from_slice(bytes);
        u16::from_be_bytes(word)
    }

    fn wrap(pixels: Array2<Self>) -> MaskPixels {
        MaskPixels::U16(pixels)
    }

    fn unwrap(pixels: MaskPixels) -> Option<Array2<Self>> {
        match pixels {
            MaskPixels::U16(a) => Some(a),
            _ => None,
        }
    }
}

impl MaskWord for u32 {
    const PIXEL_TYPE: PixelType = PixelType::U32;

    fn from_be_slice(bytes: &[u8]) -> Self {
        let mut word = [0u8; 4];
        word.copy_from_slice(bytes);
        u32::from_be_bytes(word)
    }

    fn wrap(pixels: Array2<Self>) -> MaskPixels {
        MaskPixels::U32(pixels)
    }

    fn unwrap(pixels: MaskPixels) -> Option<Array2<Self>> {
        match pixels {
            MaskPixels::U32(a) => Some(a),
            _ => None,
        }
    }
}

impl MaskWord for u64 {
    const PIXEL_TYPE: PixelType = PixelType::U64;

    fn from_be_slice(bytes: &[u8]) -> Self {
        let mut word = [0u8; 8];
        word.copy_from_slice(bytes);
        u64::from_be_bytes(word)
    }

    fn wrap(pixels: Array2<Self>) -> MaskPixels {
        MaskPixels::U64(pixels)
    }

    fn unwrap(pixels: MaskPixels) -> Option<Array2<Self>> {
        match pixels {
            MaskPixels::U64(a) => Some(a),
            _ => None,
        }
    }
}

/// Mask pixels of one of the supported widths, indexed `[[y, x]]`.
#[derive(Debug, Clone)]
pub enum MaskPixels {
    U8(Array2<u8>),
    U16(Array2<u16>),
    U32(Array2<u32>),
    U64(Array2<u64>),
}

impl MaskPixels {
    pub fn pixel_type(&self) -> PixelType {
        match self {
            MaskPixels::U8(_) => PixelType::U8,
            MaskPixels::U16(_) => PixelType::U16,
            MaskPixels::U32(_) => PixelType::U32,
            MaskPixels::U64(_) => PixelType::U64,
        }
    }

    /// `(height, width)` in pixels.
    pub fn dim(&self) -> (usize, usize) {
        match self {
            MaskPixels::U8(a) => a.dim(),
            MaskPixels::U16(a) => a.dim(),
            MaskPixels::U32(a) => a.dim(),
            MaskPixels::U64(a) => a.dim(),
        }
    }

    /// Value at column `x`, row `y`, widened to `u64`.
    pub fn get(&self, x: usize, y: usize) -> Option<u64> {
        match self {
            MaskPixels::U8(a) => a.get([y, x]).map(|&v| v.into()),
            MaskPixels::U16(a) => a.get([y, x]).map(|&v| v.into()),
            MaskPixels::U32(a) => a.get([y, x]).map(|&v| v.into()),
            MaskPixels::U64(a) => a.get([y, x]).copied(),
        }
    }
}

/// A decoded maskbit image with its projection.
#[derive(Debug, Clone)]
pub struct MaskImage {
    pub path: PathBuf,
    pub wcs: TanWcs,
    pub pixels: MaskPixels,
}

impl MaskImage {
    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }

    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixels.pixel_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smallest_type_for_value() {
        assert_eq!(PixelType::smallest_for(0), PixelType::U8);
        assert_eq!(PixelType::smallest_for(250), PixelType::U8);
        assert_eq!(PixelType::smallest_for(255), PixelType::U8);
        assert_eq!(PixelType::smallest_for(256), PixelType::U16);
        assert_eq!(PixelType::smallest_for(70000), PixelType::U32);
        assert_eq!(PixelType::smallest_for(1 << 40), PixelType::U64);
    }

    #[test]
    fn pixel_types_order_by_width() {
        assert!(PixelType::U8 < PixelType::U16);
        assert!(PixelType::U32 < PixelType::U64);
        assert_eq!(
            [PixelType::U16, PixelType::U64, PixelType::U8].into_iter().max(),
            Some(PixelType::U64)
        );
        assert_eq!(PixelType::from_bitpix(-32), None);
        assert_eq!(PixelType::from_bitpix(16), Some(PixelType::U16));
        assert_eq!(PixelType::U32.to_string(), "uint32");
    }

    #[test]
    fn words_decode_big_endian() {
        assert_eq!(u16::from_be_slice(&[0x12, 0x34]), 0x1234);
        assert_eq!(u32::from_be_slice(&[0, 0, 1, 0]), 256);
        assert_eq!(u64::from_be_slice(&[0xff; 8]), u64::MAX);
    }

    #[test]
    fn pixels_index_row_major() {
        let a = Array2::from_shape_vec((2, 3), vec![0u16, 1, 2, 3, 4, 5]).unwrap();
        let px = <u16 as MaskWord>::wrap(a);
        assert_eq!(px.dim(), (2, 3));
        assert_eq!(px.get(2, 0), Some(2));
        assert_eq!(px.get(0, 1), Some(3));
        assert_eq!(px.get(3, 0), None);
        assert!(<u8 as MaskWord>::unwrap(px.clone()).is_none());
        assert!(<u16 as MaskWord>::unwrap(px).is_some());
    }
}
