use super::sphere::{self, dot};

/// TAN (gnomonic) WCS projection without distortion terms.
///
/// Holds the header values of a `RA---TAN` / `DEC--TAN` image together with
/// the quantities derived from them once per file: the reference direction
/// with its local east/north axes, and the inverse determinant of the CD
/// matrix.
#[derive(Debug, Clone)]
pub struct TanWcs {
    /// Reference point on sky (RA, Dec) in degrees.
    pub crval: [f64; 2],
    /// Reference pixel, 1-indexed as in the FITS header.
    pub crpix: [f64; 2],
    /// CD matrix in degrees per pixel.
    /// `cd[0] = [cd1_1, cd1_2]`, `cd[1] = [cd2_1, cd2_2]`.
    pub cd: [[f64; 2]; 2],
    reference: [f64; 3],
    east: [f64; 3],
    north: [f64; 3],
    inv_det: f64,
}

impl TanWcs {
    /// Returns `None` when the CD matrix is not invertible.
    pub fn new(crval: [f64; 2], crpix: [f64; 2], cd: [[f64; 2]; 2]) -> Option<Self> {
        let det = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
        if det == 0.0 || !det.is_finite() {
            return None;
        }

        let (ra0, dec0) = (crval[0].to_radians(), crval[1].to_radians());
        let (east, north) = sphere::tangent_basis(ra0, dec0);

        Some(Self {
            crval,
            crpix,
            cd,
            reference: sphere::radec_to_xyz(ra0, dec0),
            east,
            north,
            inv_det: 1.0 / det,
        })
    }

    /// Project (RA, Dec) in degrees to 0-indexed pixel coordinates.
    ///
    /// Never fails. The tangent point itself, and points on or behind the
    /// horizon of the tangent plane, land on the reference pixel
    /// `crpix - 1`. The caller checks whether the result lies in the image.
    pub fn world_to_pixel(&self, ra: f64, dec: f64) -> (f64, f64) {
        let s = sphere::radec_to_xyz(ra.to_radians(), dec.to_radians());

        let cos_dist = dot(s, self.reference);
        let along_east = dot(s, self.east);
        let along_north = dot(s, self.north);

        let (xi, eta) = if cos_dist >= 1.0
            || cos_dist <= 0.0
            || (along_east == 0.0 && along_north == 0.0)
        {
            (0.0, 0.0)
        } else {
            let scale = 1.0_f64.to_degrees() / cos_dist;
            (along_east * scale, along_north * scale)
        };

        let cd = &self.cd;
        let u = (xi * cd[1][1] - eta * cd[0][1]) * self.inv_det;
        let v = (-xi * cd[1][0] + eta * cd[0][0]) * self.inv_det;

        (u + self.crpix[0] - 1.0, v + self.crpix[1] - 1.0)
    }

    /// Deproject 0-indexed pixel coordinates to (RA, Dec) in degrees.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> (f64, f64) {
        let u = x + 1.0 - self.crpix[0];
        let v = y + 1.0 - self.crpix[1];
        let xi = (self.cd[0][0] * u + self.cd[0][1] * v).to_radians();
        let eta = (self.cd[1][0] * u + self.cd[1][1] * v).to_radians();

        let mut p = [0.0; 3];
        for (k, out) in p.iter_mut().enumerate() {
            *out = self.reference[k] + xi * self.east[k] + eta * self.north[k];
        }
        let norm = dot(p, p).sqrt();
        let (ra, dec) = sphere::xyz_to_radec([p[0] / norm, p[1] / norm, p[2] / norm]);
        (ra.to_degrees(), dec.to_degrees())
    }

    /// Approximate pixel scale in degrees per pixel.
    pub fn pixel_scale(&self) -> f64 {
        self.inv_det.abs().recip().sqrt()
    }
}
