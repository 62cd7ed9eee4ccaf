pub mod ascii;

use crate::bricks::BOUNDARY_TOLERANCE;
use crate::error::{Result, try_reserve};

/// Bring a coordinate into the half-open brick grid: RA 360 wraps to 0 and
/// the north pole moves just inside the topmost declination band.
pub fn normalize_coord(ra: f64, dec: f64) -> (f64, f64) {
    let ra = if ra >= 360.0 { ra - 360.0 } else { ra };
    let dec = if dec >= 90.0 { 90.0 - BOUNDARY_TOLERANCE } else { dec };
    (ra, dec)
}

/// Objects to be masked, stored column-wise in input order.
///
/// `payload` carries everything the masking pipeline does not look at (the
/// rest of a text row, for instance) and is never reordered.
#[derive(Debug, Clone)]
pub struct Catalog<P> {
    ra: Vec<f64>,
    dec: Vec<f64>,
    payload: Vec<P>,
}

impl<P> Default for Catalog<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Catalog<P> {
    pub fn new() -> Self {
        Self {
            ra: Vec::new(),
            dec: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Append an object, normalizing its coordinate.
    pub fn push(&mut self, ra: f64, dec: f64, payload: P) -> Result<()> {
        let grow = self.ra.len().max(128);
        if self.ra.len() == self.ra.capacity() {
            try_reserve(&mut self.ra, grow, "catalog coordinates")?;
        }
        if self.dec.len() == self.dec.capacity() {
            try_reserve(&mut self.dec, grow, "catalog coordinates")?;
        }
        if self.payload.len() == self.payload.capacity() {
            try_reserve(&mut self.payload, grow, "catalog rows")?;
        }
        let (ra, dec) = normalize_coord(ra, dec);
        self.ra.push(ra);
        self.dec.push(dec);
        self.payload.push(payload);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ra.is_empty()
    }

    pub fn ra(&self) -> &[f64] {
        &self.ra
    }

    pub fn dec(&self) -> &[f64] {
        &self.dec
    }

    pub fn payloads(&self) -> &[P] {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_keeps_grid_half_open() {
        assert_eq!(normalize_coord(360.0, 10.0), (0.0, 10.0));
        assert_eq!(normalize_coord(359.5, -90.0), (359.5, -90.0));
        let (_, dec) = normalize_coord(12.0, 90.0);
        assert!(dec < 90.0);
        assert!(90.0 - dec <= 2.0 * BOUNDARY_TOLERANCE);
    }

    #[test]
    fn push_normalizes_and_keeps_order() {
        let mut cat = Catalog::new();
        for i in 0..300 {
            cat.push(360.0, i as f64 / 10.0, i).unwrap();
        }
        assert_eq!(cat.len(), 300);
        assert!(cat.ra().iter().all(|&ra| ra == 0.0));
        assert_eq!(cat.payloads()[123], 123);
        assert_eq!(cat.dec()[5], 0.5);
    }

    #[test]
    fn every_column_grows_through_try_reserve() {
        let mut cat: Catalog<String> = Catalog {
            ra: Vec::with_capacity(1000),
            dec: Vec::with_capacity(1000),
            payload: Vec::new(),
        };
        cat.push(1.0, 2.0, "row".into()).unwrap();
        assert!(cat.payload.capacity() >= 128);

        let mut cat: Catalog<()> = Catalog {
            ra: Vec::with_capacity(1000),
            dec: Vec::new(),
            payload: Vec::with_capacity(1000),
        };
        cat.push(1.0, 2.0, ()).unwrap();
        assert!(cat.dec.capacity() >= 128);
    }
}
