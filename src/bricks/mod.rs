pub mod fits;
pub mod list;

use std::cmp::Ordering;
use std::io::Cursor;
use std::path::Path;

use crate::error::{Error, Result};

/// Boundary values are snapped to multiples of this many degrees, so that
/// neighbouring bricks share bit-identical edges.
pub const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// Read a brick table, as a FITS binary table when the (possibly gzipped)
/// file starts with the FITS magic and as whitespace-separated text otherwise.
pub fn read_brick_table(path: &Path) -> Result<Vec<BrickRecord>> {
    let mut bytes = Vec::new();
    crate::mask::fits::read_file(path, &mut bytes)?;
    if bytes.starts_with(fits::FITS_MAGIC) {
        fits::parse_brick_table(&bytes, path)
    } else {
        list::parse_brick_list(Cursor::new(bytes), path)
    }
}

/// Photometric region of a brick, selecting the mask directory layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    North,
    South,
}

impl Region {
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag.to_ascii_uppercase() {
            'N' => Some(Region::North),
            'S' => Some(Region::South),
            _ => None,
        }
    }

    /// Directory name used by the Legacy Survey data release layout.
    pub fn dir_name(self) -> &'static str {
        match self {
            Region::North => "north",
            Region::South => "south",
        }
    }
}

/// One rectangular sky tile, half-open on both axes.
#[derive(Debug, Clone, PartialEq)]
pub struct BrickRecord {
    pub name: String,
    pub ra_min: f64,
    pub ra_max: f64,
    pub dec_min: f64,
    pub dec_max: f64,
    pub region: Option<Region>,
}

impl BrickRecord {
    /// Order of this brick relative to the point (RA, Dec): `Greater` when
    /// the point lies before the brick in (Dec band, RA) order, `Less` when
    /// it lies after, `Equal` when the brick contains it.
    fn locate(&self, ra: f64, dec: f64) -> Ordering {
        if dec < self.dec_min {
            Ordering::Greater
        } else if dec >= self.dec_max {
            Ordering::Less
        } else if ra < self.ra_min {
            Ordering::Greater
        } else if ra >= self.ra_max {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    }

    pub fn contains(&self, ra: f64, dec: f64) -> bool {
        self.locate(ra, dec) == Ordering::Equal
    }
}

/// Reciprocal of [`BOUNDARY_TOLERANCE`], exact in `f64`.
const BOUNDARY_STEPS: f64 = 1e9;

fn snap(v: f64) -> f64 {
    (v * BOUNDARY_STEPS).round() / BOUNDARY_STEPS
}

/// Bricks sorted by `(dec_min, ra_min)`, searchable by coordinate.
#[derive(Debug, Clone)]
pub struct BrickIndex {
    bricks: Vec<BrickRecord>,
}

impl BrickIndex {
    /// Validate and index a brick table.
    ///
    /// Boundaries are snapped to [`BOUNDARY_TOLERANCE`]. The table must
    /// already be sorted by declination, then right ascension.
    pub fn build(mut bricks: Vec<BrickRecord>) -> Result<Self> {
        if bricks.is_empty() {
            return Err(Error::BrickTable("no bricks".into()));
        }

        for b in bricks.iter_mut() {
            let bounds = [b.ra_min, b.ra_max, b.dec_min, b.dec_max];
            if bounds.iter().any(|v| !v.is_finite()) {
                return Err(Error::BrickTable(format!(
                    "non-finite boundary for brick `{}`",
                    b.name
                )));
            }
            b.ra_min = snap(b.ra_min);
            b.ra_max = snap(b.ra_max);
            b.dec_min = snap(b.dec_min);
            b.dec_max = snap(b.dec_max);
            if b.ra_max <= b.ra_min || b.dec_max <= b.dec_min {
                return Err(Error::BrickTable(format!(
                    "zero-area brick `{}`: RA [{}, {}), Dec [{}, {})",
                    b.name, b.ra_min, b.ra_max, b.dec_min, b.dec_max
                )));
            }
        }

        for (i, pair) in bricks.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.dec_min < prev.dec_min {
                return Err(Error::BrickTable(format!(
                    "invalid declination order at row {}: brick `{}` (Dec {}) follows `{}` (Dec {})",
                    i + 2,
                    next.name,
                    next.dec_min,
                    prev.name,
                    prev.dec_min
                )));
            }
            if next.dec_min == prev.dec_min && next.ra_min < prev.ra_min {
                return Err(Error::BrickTable(format!(
                    "invalid right ascension order at row {}: brick `{}` (RA {}) follows `{}` (RA {})",
                    i + 2,
                    next.name,
                    next.ra_min,
                    prev.name,
                    prev.ra_min
                )));
            }
        }

        Ok(Self { bricks })
    }

    /// Id of the brick containing (RA, Dec), or `None` if no brick does.
    ///
    /// Coordinates on a brick's upper RA or Dec edge belong to the next brick.
    pub fn find(&self, ra: f64, dec: f64) -> Option<usize> {
        self.bricks.binary_search_by(|b| b.locate(ra, dec)).ok()
    }

    pub fn get(&self, id: usize) -> &BrickRecord {
        &self.bricks[id]
    }

    pub fn len(&self) -> usize {
        self.bricks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bricks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BrickRecord> {
        self.bricks.iter()
    }

    /// Length of the longest brick name.
    pub fn max_name_len(&self) -> usize {
        self.bricks.iter().map(|b| b.name.len()).max().unwrap_or(0)
    }
}
