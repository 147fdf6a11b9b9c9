//! Static analytic galactic potential
//!
//! The background is a fixed set of three components, each a closed sum type
//! over the models it supports:
//! - [`Disk`]      exponential or Miyamoto–Nagai
//! - [`Spherical`] Hernquist-like bulge ("sphere")
//! - [`Halo`]      NFW, logarithmic or triaxial logarithmic
//!
//! Every component evaluates in closed form with `G = 1`. Radial profiles use
//! series expansions near the center and a radius floor so that `r -> 0`
//! yields finite values instead of `0/0`.

use crate::error::{SimError, SimResult};
use crate::simulation::states::NVec3;

/// Radii below this are treated as this value
const RADIUS_FLOOR: f64 = 1.0e-12;

/// Below this dimensionless radius the enclosed-mass fractions switch to series
const SERIES_CUTOFF: f64 = 1.0e-3;

/// Peak of `(ln(1 + u) - u / (1 + u)) / u`, so `vhalo` is the halo's maximum circular speed
const NFW_NORM: f64 = 0.216_216_595_4;

#[derive(Debug, Clone, PartialEq)]
pub enum Disk {
    /// Spherically averaged exponential disk, `M(r) = M [1 - e^(-r/b) (1 + r/b)]`
    Exponential { mass: f64, scale_length: f64 },
    /// Miyamoto–Nagai disk with radial scale `a` and vertical scale `b`
    MiyamotoNagai { mass: f64, scale_length: f64, scale_height: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Spherical {
    /// `Phi = -M / (r + a)`
    Hernquist { mass: f64, scale: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Halo {
    Nfw { vhalo: f64, scale_length: f64 },
    Logarithmic { vhalo: f64, scale_length: f64, flatten_z: f64 },
    /// Triaxial logarithmic halo; `c1..c3` are derived from the flattenings and angle
    Triaxial {
        vhalo: f64,
        scale_length: f64,
        flatten_z: f64,
        c1: f64,
        c2: f64,
        c3: f64,
    },
}

impl Halo {
    /// Builds a triaxial halo, rotating the x/y flattening by `triax_angle` degrees
    pub fn triaxial(vhalo: f64, scale_length: f64, flatten_x: f64, flatten_y: f64, flatten_z: f64, triax_angle: f64) -> Self {
        let (sin_phi, cos_phi) = triax_angle.to_radians().sin_cos();
        let qx2 = flatten_x * flatten_x;
        let qy2 = flatten_y * flatten_y;

        Halo::Triaxial {
            vhalo,
            scale_length,
            flatten_z,
            c1: cos_phi * cos_phi / qx2 + sin_phi * sin_phi / qy2,
            c2: sin_phi * sin_phi / qx2 + cos_phi * cos_phi / qy2,
            c3: 2.0 * sin_phi * cos_phi * (1.0 / qx2 - 1.0 / qy2),
        }
    }
}

/// The complete background potential
#[derive(Debug, Clone, PartialEq)]
pub struct Potential {
    pub disk: Disk,
    pub sphere: Spherical,
    pub halo: Halo,
}

impl Potential {
    /// Total acceleration at `pos`
    pub fn acceleration(&self, pos: &NVec3) -> NVec3 {
        self.disk.acceleration(pos) + self.sphere.acceleration(pos) + self.halo.acceleration(pos)
    }

    /// Total potential at `pos`
    pub fn potential(&self, pos: &NVec3) -> f64 {
        self.disk.potential(pos) + self.sphere.potential(pos) + self.halo.potential(pos)
    }

    /// Checks that every mass and scale parameter is a positive finite real
    pub fn validate(&self) -> SimResult<()> {
        match self.disk {
            Disk::Exponential { mass, scale_length } => {
                positive("disk mass", mass)?;
                positive("disk scale-length", scale_length)?;
            }
            Disk::MiyamotoNagai { mass, scale_length, scale_height } => {
                positive("disk mass", mass)?;
                positive("disk scale-length", scale_length)?;
                positive("disk scale-height", scale_height)?;
            }
        }

        match self.sphere {
            Spherical::Hernquist { mass, scale } => {
                positive("sphere mass", mass)?;
                positive("sphere r0-scale", scale)?;
            }
        }

        match self.halo {
            Halo::Nfw { vhalo, scale_length } => {
                positive("halo vhalo", vhalo)?;
                positive("halo scale-length", scale_length)?;
            }
            Halo::Logarithmic { vhalo, scale_length, flatten_z } => {
                positive("halo vhalo", vhalo)?;
                positive("halo scale-length", scale_length)?;
                positive("halo flatten-z", flatten_z)?;
            }
            Halo::Triaxial { vhalo, scale_length, flatten_z, c1, c2, c3 } => {
                positive("halo vhalo", vhalo)?;
                positive("halo scale-length", scale_length)?;
                positive("halo flatten-z", flatten_z)?;
                if !(c1.is_finite() && c2.is_finite() && c3.is_finite()) {
                    return Err(SimError::config("halo flatten-x and flatten-y must be positive"));
                }
            }
        }

        Ok(())
    }
}

fn positive(name: &str, value: f64) -> SimResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::config(format!("{name} must be a positive finite number, got {value}")))
    }
}

impl Disk {
    pub fn acceleration(&self, pos: &NVec3) -> NVec3 {
        match *self {
            Disk::Exponential { mass, scale_length } => {
                let r = floored_radius(pos);
                let x = r / scale_length;
                let enclosed = if x < SERIES_CUTOFF {
                    // 1 - e^-x (1 + x) = x^2/2 - x^3/3 + x^4/8 - ...
                    x * x * (0.5 - x / 3.0 + x * x / 8.0)
                } else {
                    1.0 - (-x).exp() * (1.0 + x)
                };
                -(mass * enclosed / (r * r * r)) * pos
            }
            Disk::MiyamotoNagai { mass, scale_length, scale_height } => {
                let zp = (pos.z * pos.z + scale_height * scale_height).sqrt();
                let azp = scale_length + zp;
                let rp = pos.x * pos.x + pos.y * pos.y + azp * azp;
                let inv_rth = 1.0 / (rp * rp.sqrt());

                NVec3::new(
                    -mass * pos.x * inv_rth,
                    -mass * pos.y * inv_rth,
                    -mass * pos.z * azp * inv_rth / zp,
                )
            }
        }
    }

    pub fn potential(&self, pos: &NVec3) -> f64 {
        match *self {
            Disk::Exponential { mass, scale_length } => {
                let r = floored_radius(pos);
                mass * (-r / scale_length).exp_m1() / r
            }
            Disk::MiyamotoNagai { mass, scale_length, scale_height } => {
                let zp = (pos.z * pos.z + scale_height * scale_height).sqrt();
                let azp = scale_length + zp;
                -mass / (pos.x * pos.x + pos.y * pos.y + azp * azp).sqrt()
            }
        }
    }
}

impl Spherical {
    pub fn acceleration(&self, pos: &NVec3) -> NVec3 {
        match *self {
            Spherical::Hernquist { mass, scale } => {
                let r = floored_radius(pos);
                let ra = r + scale;
                -(mass / (r * ra * ra)) * pos
            }
        }
    }

    pub fn potential(&self, pos: &NVec3) -> f64 {
        match *self {
            Spherical::Hernquist { mass, scale } => -mass / (pos.norm() + scale),
        }
    }
}

impl Halo {
    pub fn acceleration(&self, pos: &NVec3) -> NVec3 {
        match *self {
            Halo::Nfw { vhalo, scale_length } => {
                let r = floored_radius(pos);
                let u = r / scale_length;
                let enclosed = if u < SERIES_CUTOFF {
                    // ln(1 + u) - u / (1 + u) = u^2/2 - 2u^3/3 + 3u^4/4 - ...
                    u * u * (0.5 - 2.0 * u / 3.0 + 0.75 * u * u)
                } else {
                    u.ln_1p() - u / (1.0 + u)
                };
                -(nfw_mass_scale(vhalo, scale_length) * enclosed / (r * r * r)) * pos
            }
            Halo::Logarithmic { vhalo, scale_length, flatten_z } => {
                let q2 = flatten_z * flatten_z;
                let denom = pos.x * pos.x + pos.y * pos.y + pos.z * pos.z / q2 + scale_length * scale_length;
                let coef = -2.0 * vhalo * vhalo / denom;

                NVec3::new(coef * pos.x, coef * pos.y, coef * pos.z / q2)
            }
            Halo::Triaxial { vhalo, scale_length, flatten_z, c1, c2, c3 } => {
                let qz2 = flatten_z * flatten_z;
                let denom = triaxial_denominator(pos, scale_length, flatten_z, c1, c2, c3);
                let coef = -vhalo * vhalo / denom;

                NVec3::new(
                    coef * (2.0 * c1 * pos.x + c3 * pos.y),
                    coef * (2.0 * c2 * pos.y + c3 * pos.x),
                    coef * 2.0 * pos.z / qz2,
                )
            }
        }
    }

    pub fn potential(&self, pos: &NVec3) -> f64 {
        match *self {
            Halo::Nfw { vhalo, scale_length } => {
                let r = floored_radius(pos);
                -nfw_mass_scale(vhalo, scale_length) * (r / scale_length).ln_1p() / r
            }
            Halo::Logarithmic { vhalo, scale_length, flatten_z } => {
                let q2 = flatten_z * flatten_z;
                let denom = pos.x * pos.x + pos.y * pos.y + pos.z * pos.z / q2 + scale_length * scale_length;
                vhalo * vhalo * denom.ln()
            }
            Halo::Triaxial { vhalo, scale_length, flatten_z, c1, c2, c3 } => {
                vhalo * vhalo * triaxial_denominator(pos, scale_length, flatten_z, c1, c2, c3).ln()
            }
        }
    }
}

fn floored_radius(pos: &NVec3) -> f64 {
    pos.norm().max(RADIUS_FLOOR)
}

fn nfw_mass_scale(vhalo: f64, scale_length: f64) -> f64 {
    vhalo * vhalo * scale_length / NFW_NORM
}

fn triaxial_denominator(pos: &NVec3, scale_length: f64, flatten_z: f64, c1: f64, c2: f64, c3: f64) -> f64 {
    scale_length * scale_length
        + c1 * pos.x * pos.x
        + c2 * pos.y * pos.y
        + c3 * pos.x * pos.y
        + pos.z * pos.z / (flatten_z * flatten_z)
}
