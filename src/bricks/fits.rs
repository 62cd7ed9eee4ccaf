//! Legacy Survey `survey-bricks` tables stored as FITS binary tables.
//!
//! The first `BINTABLE` extension must carry `BRICKNAME`, `RA1`, `RA2`,
//! `DEC1` and `DEC2` columns; `PHOTSYS` is optional. Column names match
//! case-insensitively and any other columns are skipped.

use std::io::{BufReader, Cursor};
use std::path::Path;

use fitsrs::Fits;
use fitsrs::hdu::HDU;

use super::{BrickRecord, Region};
use crate::error::{Error, Result, try_reserve};
use crate::mask::fits::{Card, data_unit_ranges};

/// Leading bytes of every FITS file.
pub const FITS_MAGIC: &[u8] = b"SIMPLE  =";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Char,
    Double,
    Float,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
struct Field {
    name: String,
    kind: FieldKind,
    offset: usize,
    width: usize,
}

impl Field {
    fn is_real_scalar(&self) -> bool {
        matches!(
            (self.kind, self.width),
            (FieldKind::Double, 8) | (FieldKind::Float, 4)
        )
    }

    /// Character value with trailing NULs and surrounding blanks removed.
    fn text(&self, row: &[u8]) -> String {
        let raw = &row[self.offset..self.offset + self.width];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).trim().to_string()
    }

    fn real(&self, row: &[u8]) -> f64 {
        let raw = &row[self.offset..self.offset + self.width];
        if self.kind == FieldKind::Float {
            let mut word = [0u8; 4];
            word.copy_from_slice(raw);
            f32::from_be_bytes(word) as f64
        } else {
            let mut word = [0u8; 8];
            word.copy_from_slice(raw);
            f64::from_be_bytes(word)
        }
    }
}

/// Kind and byte width of a `TFORMn` value such as `8A` or `1D`.
fn parse_tform(tform: &str) -> Option<(FieldKind, usize)> {
    let tform = tform.trim();
    let digits = tform.bytes().take_while(u8::is_ascii_digit).count();
    let repeat: usize = match digits {
        0 => 1,
        _ => tform[..digits].parse().ok()?,
    };
    let (kind, bytes) = match tform[digits..].chars().next()? {
        'A' => (FieldKind::Char, 1),
        'D' => (FieldKind::Double, 8),
        'E' => (FieldKind::Float, 4),
        'L' | 'B' => (FieldKind::Other, 1),
        'I' => (FieldKind::Other, 2),
        'J' => (FieldKind::Other, 4),
        'K' | 'C' | 'P' => (FieldKind::Other, 8),
        'M' | 'Q' => (FieldKind::Other, 16),
        'X' => return Some((FieldKind::Other, repeat.div_ceil(8))),
        _ => return None,
    };
    Some((kind, repeat.checked_mul(bytes)?))
}

/// Row layout of the brick table, resolved from the extension header.
#[derive(Debug)]
struct TableLayout {
    row_len: usize,
    rows: usize,
    name: Field,
    /// `RA1`, `RA2`, `DEC1`, `DEC2`.
    bounds: [Field; 4],
    region: Option<Field>,
}

impl TableLayout {
    fn from_header(get: &dyn Fn(&str) -> Option<Card>) -> std::result::Result<Self, String> {
        let count = |key: &str| match get(key) {
            Some(Card::Number(v)) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
            _ => Err(format!("missing or invalid keyword {key}")),
        };
        let row_len = count("NAXIS1")?;
        let rows = count("NAXIS2")?;
        let nfields = count("TFIELDS")?;

        let mut fields = Vec::with_capacity(nfields.min(999));
        let mut offset = 0;
        for i in 1..=nfields {
            let name = match get(&format!("TTYPE{i}")) {
                Some(Card::Text(name)) => name.trim().to_string(),
                _ => String::new(),
            };
            let Some(Card::Text(tform)) = get(&format!("TFORM{i}")) else {
                return Err(format!("missing keyword TFORM{i}"));
            };
            let (kind, width) =
                parse_tform(&tform).ok_or_else(|| format!("unsupported TFORM{i} = '{tform}'"))?;
            fields.push(Field { name, kind, offset, width });
            offset += width;
        }
        if offset != row_len {
            return Err(format!("columns span {offset} bytes but NAXIS1 = {row_len}"));
        }
        if row_len == 0 || rows == 0 {
            return Err("empty table".into());
        }

        let column = |wanted: &str| {
            fields
                .iter()
                .find(|f| f.name.eq_ignore_ascii_case(wanted))
                .cloned()
        };
        let name = column("BRICKNAME")
            .filter(|f| f.kind == FieldKind::Char)
            .ok_or("no character column BRICKNAME")?;
        let bound = |wanted: &str| {
            column(wanted)
                .filter(Field::is_real_scalar)
                .ok_or_else(|| format!("no floating-point column {wanted}"))
        };
        let bounds = [bound("RA1")?, bound("RA2")?, bound("DEC1")?, bound("DEC2")?];
        let region = match column("PHOTSYS") {
            Some(f) if f.kind != FieldKind::Char => {
                return Err("PHOTSYS is not a character column".into());
            }
            region => region,
        };

        Ok(Self { row_len, rows, name, bounds, region })
    }
}

/// Parse a brick table from the bytes of a FITS file.
pub fn parse_brick_table(bytes: &[u8], path: &Path) -> Result<Vec<BrickRecord>> {
    let table_err = |message: String| Error::BrickTable(format!("{}: {message}", path.display()));

    let mut hdu_list = Fits::from_reader(BufReader::new(Cursor::new(bytes)));
    let mut position = 0;
    let layout = loop {
        match hdu_list.next() {
            Some(Ok(HDU::XBinaryTable(hdu))) => {
                let header = hdu.get_header();
                let get = |key: &str| header.get(key).map(Card::from_value);
                break TableLayout::from_header(&get).map_err(table_err)?;
            }
            Some(Ok(_)) => position += 1,
            Some(Err(e)) => return Err(table_err(format!("failed to read FITS HDU: {e}"))),
            None => return Err(table_err("no binary table extension".into())),
        }
    };

    let data = data_unit_ranges(bytes)
        .get(position)
        .and_then(|unit| {
            let len = layout.row_len.checked_mul(layout.rows)?;
            bytes.get(unit.start..)?.get(..len)
        })
        .ok_or_else(|| table_err("truncated table data".into()))?;

    let mut bricks = Vec::new();
    try_reserve(&mut bricks, layout.rows, "brick table")?;
    for (i, row) in data.chunks_exact(layout.row_len).enumerate() {
        let name = layout.name.text(row);
        if name.is_empty() {
            return Err(table_err(format!("row {}: empty BRICKNAME", i + 1)));
        }
        let [ra_min, ra_max, dec_min, dec_max] = layout.bounds.each_ref().map(|f| f.real(row));
        let region = match &layout.region {
            None => None,
            Some(field) => {
                let tag = field.text(row);
                let mut chars = tag.chars();
                match (chars.next().map(Region::from_tag), chars.next()) {
                    (None, _) => None,
                    (Some(Some(region)), None) => Some(region),
                    _ => return Err(table_err(format!("row {}: invalid PHOTSYS '{tag}'", i + 1))),
                }
            }
        };
        bricks.push(BrickRecord { name, ra_min, ra_max, dec_min, dec_max, region });
    }
    log::debug!("{} bricks in FITS table {}", bricks.len(), path.display());
    Ok(bricks)
}
