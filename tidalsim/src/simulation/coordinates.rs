//! Coordinate conversions between the observational and simulation frames
//!
//! - heliocentric galactic `(l, b, r)` <-> galactocentric Cartesian `(x, y, z)`,
//!   with the Sun on the negative x axis at `sun_gc_distance`
//! - heliocentric `(l, b)` -> stream coordinates `(lambda, beta)` via a ZXZ Euler rotation

use nalgebra::Matrix3;

use crate::simulation::states::NVec3;

/// Convert heliocentric `(l, b, r)` (angles in radians) to galactocentric Cartesian
pub fn lbr_to_cartesian(lbr: &NVec3, sun_gc_distance: f64) -> NVec3 {
    let (l, b, r) = (lbr.x, lbr.y, lbr.z);
    let (sin_l, cos_l) = l.sin_cos();
    let (sin_b, cos_b) = b.sin_cos();

    NVec3::new(r * cos_b * cos_l - sun_gc_distance, r * cos_b * sin_l, r * sin_b)
}

/// Convert galactocentric Cartesian to heliocentric `(l, b, r)` with angles in radians
pub fn cartesian_to_lbr(pos: &NVec3, sun_gc_distance: f64) -> NVec3 {
    let xh = pos.x + sun_gc_distance;
    let r = (xh * xh + pos.y * pos.y + pos.z * pos.z).sqrt();
    let l = pos.y.atan2(xh);
    let b = pos.z.atan2((xh * xh + pos.y * pos.y).sqrt());

    NVec3::new(l, b, r)
}

/// A great-circle frame aligned with a stream, defined by Euler angles in degrees
#[derive(Debug, Clone)]
pub struct StreamFrame {
    rotation: Matrix3<f64>,
}

impl StreamFrame {
    pub fn new(phi: f64, theta: f64, psi: f64) -> Self {
        let (sphi, cphi) = phi.to_radians().sin_cos();
        let (stheta, ctheta) = theta.to_radians().sin_cos();
        let (spsi, cpsi) = psi.to_radians().sin_cos();

        let rotation = Matrix3::new(
            cpsi * cphi - ctheta * sphi * spsi,
            cpsi * sphi + ctheta * cphi * spsi,
            spsi * stheta,
            -spsi * cphi - ctheta * sphi * cpsi,
            -spsi * sphi + ctheta * cphi * cpsi,
            cpsi * stheta,
            stheta * sphi,
            -stheta * cphi,
            ctheta,
        );

        Self { rotation }
    }

    /// Stream `(lambda, beta)` in degrees for heliocentric `(l, b)` in radians
    pub fn lambda_beta(&self, l: f64, b: f64) -> (f64, f64) {
        let (sin_l, cos_l) = l.sin_cos();
        let (sin_b, cos_b) = b.sin_cos();
        let unit = NVec3::new(cos_b * cos_l, cos_b * sin_l, sin_b);
        let rotated = self.rotation * unit;

        let lambda = rotated.y.atan2(rotated.x).to_degrees();
        let beta = rotated.z.clamp(-1.0, 1.0).asin().to_degrees();
        (lambda, beta)
    }

    /// Stream coordinates of a galactocentric position
    pub fn project(&self, pos: &NVec3, sun_gc_distance: f64) -> (f64, f64) {
        let lbr = cartesian_to_lbr(pos, sun_gc_distance);
        self.lambda_beta(lbr.x, lbr.y)
    }
}
