//! Reading maskbit images from FITS files.

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::ops::Range;
use std::path::Path;

use fitsrs::Fits;
use fitsrs::card::Value;
use fitsrs::hdu::HDU;
use fitsrs::hdu::data::image::Pixels;
use flate2::bufread::MultiGzDecoder;
use ndarray::Array2;

use super::{MaskImage, MaskPixels, MaskWord, PixelType};
use crate::error::{Error, Result, try_reserve};
use crate::geom::TanWcs;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const FITS_BLOCK: usize = 2880;
const FITS_CARD: usize = 80;

/// Header keywords describing distortion, rotation or pole conventions that
/// a plain TAN projection cannot represent.
const UNSUPPORTED_KEYS: &[&str] = &[
    "A_ORDER", "B_ORDER", "AP_ORDER", "BP_ORDER", "CROTA1", "CROTA2", "PC1_1", "PC1_2", "PC2_1",
    "PC2_2",
];

/// Highest `m` checked for `PVi_m` projection parameters.
const MAX_PV_INDEX: usize = 39;

/// Header values the readers need, detached from the `fitsrs` header.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Card {
    Number(f64),
    Text(String),
    Other,
}

impl Card {
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::Integer { value, .. } => Card::Number(*value as f64),
            Value::Float { value, .. } => Card::Number(*value),
            Value::String { value, .. } => Card::Text(value.trim().to_string()),
            _ => Card::Other,
        }
    }
}

fn number(get: &dyn Fn(&str) -> Option<Card>, key: &str, path: &Path) -> Result<f64> {
    match get(key) {
        Some(Card::Number(v)) if v.is_finite() => Ok(v),
        Some(_) => Err(Error::mask(path, format!("keyword {key} is not a finite number"))),
        None => Err(Error::mask(path, format!("missing keyword {key}"))),
    }
}

/// Build the projection of a maskbit header, rejecting anything beyond an
/// undistorted `RA---TAN` / `DEC--TAN` plane.
fn wcs_from_header(get: &dyn Fn(&str) -> Option<Card>, path: &Path) -> Result<TanWcs> {
    for (key, expected) in [("CTYPE1", "RA---TAN"), ("CTYPE2", "DEC--TAN")] {
        match get(key) {
            Some(Card::Text(t)) if t == expected => {}
            Some(Card::Text(t)) => {
                return Err(Error::mask(
                    path,
                    format!("unsupported projection {key} = '{t}', expected '{expected}'"),
                ));
            }
            _ => return Err(Error::mask(path, format!("missing keyword {key}"))),
        }
    }

    for key in UNSUPPORTED_KEYS {
        if get(key).is_some() {
            return Err(Error::mask(path, format!("unsupported WCS keyword {key}")));
        }
    }
    for axis in 1..=2 {
        for m in 0..=MAX_PV_INDEX {
            let key = format!("PV{axis}_{m}");
            if get(&key).is_some() {
                return Err(Error::mask(path, format!("unsupported WCS keyword {key}")));
            }
        }
    }
    if let Some(card) = get("LONPOLE")
        && card != Card::Number(180.0)
    {
        return Err(Error::mask(path, "non-default LONPOLE is not supported"));
    }

    let crval = [number(get, "CRVAL1", path)?, number(get, "CRVAL2", path)?];
    let crpix = [number(get, "CRPIX1", path)?, number(get, "CRPIX2", path)?];
    let cd = [
        [number(get, "CD1_1", path)?, number(get, "CD1_2", path)?],
        [number(get, "CD2_1", path)?, number(get, "CD2_2", path)?],
    ];
    TanWcs::new(crval, crpix, cd).ok_or_else(|| Error::SingularWcs {
        path: path.to_path_buf(),
    })
}

fn is_end_card(card: &[u8]) -> bool {
    card.starts_with(b"END") && card[3..].iter().all(|&c| c == b' ')
}

fn block_padded(n: usize) -> usize {
    n.div_ceil(FITS_BLOCK) * FITS_BLOCK
}

/// Byte ranges of the data units of the HDUs in `bytes`, in file order.
///
/// Sizes come from the raw `BITPIX`, `NAXISn`, `PCOUNT` and `GCOUNT` cards.
/// A range may run past the end of a truncated file.
pub(crate) fn data_unit_ranges(bytes: &[u8]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let header = &bytes[pos..];
        let Some(end) = header.chunks_exact(FITS_CARD).position(is_end_card) else {
            break;
        };
        let int = |key: &str| header_card(header, key).and_then(|v| v.parse::<i64>().ok());
        let count = |key: &str, default: i64| int(key).unwrap_or(default).max(0) as usize;

        let word = int("BITPIX").unwrap_or(8).unsigned_abs() as usize / 8;
        let naxis = count("NAXIS", 0);
        let elements = if naxis == 0 {
            0
        } else {
            (1..=naxis).fold(1usize, |acc, k| {
                acc.saturating_mul(count(&format!("NAXIS{k}"), 0))
            })
        };
        let len = word
            .saturating_mul(count("GCOUNT", 1).max(1))
            .saturating_mul(elements.saturating_add(count("PCOUNT", 0)));

        let start = pos + block_padded((end + 1) * FITS_CARD);
        ranges.push(start..start.saturating_add(len));
        if len > bytes.len() {
            break;
        }
        pos = start + block_padded(len);
    }
    ranges
}

/// Raw value text of a keyword in the header starting at `bytes`, without
/// any comment. Only integer and logical values are safe to read this way.
pub(crate) fn header_card<'a>(bytes: &'a [u8], key: &str) -> Option<&'a str> {
    bytes
        .chunks_exact(FITS_CARD)
        .take_while(|card| !is_end_card(card))
        .find(|card| {
            card[..8].trim_ascii_end() == key.as_bytes() && card[8..10] == *b"= "
        })
        .and_then(|card| std::str::from_utf8(&card[10..]).ok())
        .map(|value| value.split('/').next().unwrap_or_default().trim())
}

/// Replace the contents of `buf` with the file at `path`, decompressing it
/// when it starts with the gzip magic.
pub(crate) fn read_file(path: &Path, buf: &mut Vec<u8>) -> Result<()> {
    buf.clear();
    let file = File::open(path).map_err(|e| Error::read(path, e))?;
    let mut reader = BufReader::new(file);
    let gzipped = reader
        .fill_buf()
        .map_err(|e| Error::read(path, e))?
        .starts_with(&GZIP_MAGIC);
    let res = if gzipped {
        MultiGzDecoder::new(reader).read_to_end(buf)
    } else {
        reader.read_to_end(buf)
    };
    res.map(|_| ()).map_err(|e| Error::read(path, e))
}

/// Loads maskbit images, keeping its file and pixel buffers between calls.
///
/// One reader per worker thread; hand images back with [`MaskReader::recycle`]
/// so the next file of the same width reuses their allocation.
#[derive(Debug, Default)]
pub struct MaskReader {
    bytes: Vec<u8>,
    spare: Option<MaskPixels>,
    fast: bool,
}

impl MaskReader {
    /// `fast` enables decoding primary-HDU pixels straight from the file
    /// bytes when no `BSCALE`/`BZERO` is present.
    pub fn new(fast: bool) -> Self {
        Self {
            bytes: Vec::new(),
            spare: None,
            fast,
        }
    }

    pub fn recycle(&mut self, image: MaskImage) {
        self.spare = Some(image.pixels);
    }

    /// Read the first 2-D image of a (possibly gzip-compressed) FITS file.
    pub fn read(&mut self, path: &Path) -> Result<MaskImage> {
        read_file(path, &mut self.bytes)?;
        let Self { bytes, spare, fast } = self;
        let bytes: &[u8] = bytes;

        let mut hdu_list = Fits::from_reader(BufReader::new(Cursor::new(bytes)));

        // The primary HDU may be empty with the image in an extension.
        let (hdu, primary) = loop {
            match hdu_list.next() {
                Some(Ok(HDU::Primary(hdu))) => {
                    if hdu.get_header().get_xtension().get_naxis().len() >= 2 {
                        break (hdu, true);
                    }
                }
                Some(Ok(HDU::XImage(hdu))) => {
                    if hdu.get_header().get_xtension().get_naxis().len() >= 2 {
                        break (hdu, false);
                    }
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(Error::mask(path, format!("failed to read FITS HDU: {e}")));
                }
                None => return Err(Error::mask(path, "no image HDU with data")),
            }
        };

        let header = hdu.get_header();
        let naxis = header.get_xtension().get_naxis();
        if naxis.len() != 2 {
            return Err(Error::mask(
                path,
                format!("expected a 2-D image, found NAXIS = {}", naxis.len()),
            ));
        }
        let (width, height) = (naxis[0] as usize, naxis[1] as usize);
        if width == 0 || height == 0 {
            return Err(Error::mask(
                path,
                format!("invalid image dimensions {width} x {height}"),
            ));
        }

        let get = |key: &str| header.get(key).map(Card::from_value);
        let wcs = wcs_from_header(&get, path)?;
        let scaled = get("BSCALE").is_some() || get("BZERO").is_some();

        let shape = (height, width);
        let pixels = if *fast && primary && !scaled {
            let bitpix = header_card(bytes, "BITPIX")
                .ok_or_else(|| Error::mask(path, "missing keyword BITPIX"))?;
            let pixel_type = bitpix
                .parse::<i64>()
                .ok()
                .and_then(PixelType::from_bitpix)
                .ok_or_else(|| Error::mask(path, format!("unsupported BITPIX = {bitpix}")))?;
            let data_unit = data_unit_ranges(bytes)
                .into_iter()
                .next()
                .ok_or_else(|| Error::mask(path, "no END card in primary header"))?;
            let data = bytes.get(data_unit.start..).unwrap_or_default();
            match pixel_type {
                PixelType::U8 => decode_be::<u8>(data, spare, shape, path)?,
                PixelType::U16 => decode_be::<u16>(data, spare, shape, path)?,
                PixelType::U32 => decode_be::<u32>(data, spare, shape, path)?,
                PixelType::U64 => decode_be::<u64>(data, spare, shape, path)?,
            }
        } else {
            // Values are taken as stored: BSCALE/BZERO are not applied and
            // signed words are reinterpreted as unsigned bit patterns.
            match hdu_list.get_data(&hdu).pixels() {
                Pixels::U8(it) => collect_pixels(it, spare, shape, path)?,
                Pixels::I16(it) => collect_pixels(it.map(|v| v as u16), spare, shape, path)?,
                Pixels::I32(it) => collect_pixels(it.map(|v| v as u32), spare, shape, path)?,
                Pixels::I64(it) => collect_pixels(it.map(|v| v as u64), spare, shape, path)?,
                Pixels::F32(_) | Pixels::F64(_) => {
                    return Err(Error::mask(
                        path,
                        "floating-point pixels (negative BITPIX) are not supported",
                    ));
                }
            }
        };

        log::debug!(
            "{}: {width} x {height} {} pixels",
            path.display(),
            pixels.pixel_type()
        );

        Ok(MaskImage {
            path: path.to_path_buf(),
            wcs,
            pixels,
        })
    }
}

/// Take the spare pixel buffer if it has word type `T`, emptied.
fn reuse_buffer<T: MaskWord>(spare: &mut Option<MaskPixels>) -> Vec<T> {
    match spare.take().and_then(T::unwrap) {
        Some(array) => {
            let (mut buf, _) = array.into_raw_vec_and_offset();
            buf.clear();
            buf
        }
        None => Vec::new(),
    }
}

fn into_pixels<T: MaskWord>(buf: Vec<T>, shape: (usize, usize), path: &Path) -> Result<MaskPixels> {
    let found = buf.len();
    Array2::from_shape_vec(shape, buf)
        .map(T::wrap)
        .map_err(|_| {
            Error::mask(
                path,
                format!(
                    "expected {} pixels ({} x {}), got {found}",
                    shape.0 * shape.1,
                    shape.1,
                    shape.0
                ),
            )
        })
}

fn collect_pixels<T: MaskWord>(
    values: impl Iterator<Item = T>,
    spare: &mut Option<MaskPixels>,
    shape: (usize, usize),
    path: &Path,
) -> Result<MaskPixels> {
    let n = shape.0 * shape.1;
    let mut buf = reuse_buffer::<T>(spare);
    try_reserve(&mut buf, n, "mask pixels")?;
    buf.extend(values.take(n));
    into_pixels(buf, shape, path)
}

fn decode_be<T: MaskWord>(
    data: &[u8],
    spare: &mut Option<MaskPixels>,
    shape: (usize, usize),
    path: &Path,
) -> Result<MaskPixels> {
    let n = shape.0 * shape.1;
    let size = T::PIXEL_TYPE.bytes();
    if data.len() < n * size {
        return Err(Error::mask(
            path,
            format!("truncated data: {} bytes for {n} pixels", data.len()),
        ));
    }
    let mut buf = reuse_buffer::<T>(spare);
    try_reserve(&mut buf, n, "mask pixels")?;
    buf.extend(data[..n * size].chunks_exact(size).map(T::from_be_slice));
    into_pixels(buf, shape, path)
}
