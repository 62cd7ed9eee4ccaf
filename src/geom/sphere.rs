use std::f64::consts::TAU;

/// Convert (RA, Dec) in radians to a unit vector `[x, y, z]`.
pub fn radec_to_xyz(ra: f64, dec: f64) -> [f64; 3] {
    let cos_dec = dec.cos();
    [cos_dec * ra.cos(), cos_dec * ra.sin(), dec.sin()]
}

/// Convert a unit vector to (RA, Dec) in radians.
/// RA is in `[0, 2*pi)`, Dec is in `[-pi/2, pi/2]`.
pub fn xyz_to_radec(xyz: [f64; 3]) -> (f64, f64) {
    let mut ra = f64::atan2(xyz[1], xyz[0]);
    if ra < 0.0 {
        ra += TAU;
    }
    let dec = xyz[2].atan2(xyz[0].hypot(xyz[1]));
    (ra, dec)
}

pub fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Local east and north unit vectors at (RA, Dec) in radians.
///
/// East points toward increasing RA, north toward increasing Dec. At the
/// poles east is taken along the `ra` meridian's normal, so the basis stays
/// orthonormal.
pub fn tangent_basis(ra: f64, dec: f64) -> ([f64; 3], [f64; 3]) {
    let (sin_ra, cos_ra) = ra.sin_cos();
    let (sin_dec, cos_dec) = dec.sin_cos();
    let east = [-sin_ra, cos_ra, 0.0];
    let north = [-cos_ra * sin_dec, -sin_ra * sin_dec, cos_dec];
    (east, north)
}
