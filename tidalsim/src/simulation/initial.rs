//! Initial conditions for the dwarf-galaxy components
//!
//! Each [`DwarfComponent`] is sampled from its density profile in its own
//! frame, recentered on the sample's center of mass, and then boosted rigidly
//! to the component's galactocentric position and velocity. All draws come from
//! one caller-supplied RNG in a fixed order (component, body, draw), so a given
//! seed always reproduces the same body set.

use std::f64::consts::{PI, SQRT_2};
use std::str::FromStr;

use rand::Rng;

use crate::error::{SimError, SimResult};
use crate::simulation::coordinates::lbr_to_cartesian;
use crate::simulation::states::{Body, NVec3};

/// Upper bound of the Plummer cumulative mass fraction; truncates the infinite tail
const PLUMMER_MAX_FRACTION: f64 = 0.999;

/// Largest body count a run may sample, summed over all components
pub const MAX_BODIES: usize = 10_000_000;

/// Density profiles a dwarf component can be sampled from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwarfProfile {
    Plummer,
}

impl FromStr for DwarfProfile {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plummer" => Ok(DwarfProfile::Plummer),
            other => Err(SimError::config(format!("unsupported dwarf model type `{other}` (supported: plummer)"))),
        }
    }
}

/// A validated dwarf component with its center already in galactocentric Cartesian
#[derive(Debug, Clone)]
pub struct DwarfComponent {
    pub profile: DwarfProfile,
    pub mass: f64,
    pub nbody: usize,
    pub scale_radius: f64,
    pub cold: bool, // skip velocity sampling, bodies share the center velocity
    pub position: NVec3, // where the sampled cluster is centered
    pub velocity: NVec3,
}

impl DwarfComponent {
    /// Plummer softening length `a / (10 sqrt(N))`
    pub fn softening(&self) -> f64 {
        self.scale_radius / (10.0 * (self.nbody as f64).sqrt())
    }

    /// A hundredth of the crossing time scale `sqrt(4/3 pi a^3 / M)`
    pub fn timestep(&self) -> f64 {
        let a = self.scale_radius;
        0.01 * (4.0 / 3.0 * PI * a * a * a / self.mass).sqrt()
    }
}

/// Check the raw dwarf parameters before any sampling
pub fn validate_dwarf(index: usize, mass: f64, nbody: i64, scale_radius: f64) -> SimResult<usize> {
    if nbody <= 0 {
        return Err(SimError::config(format!("dwarf-model[{index}]: nbody must be positive, got {nbody}")));
    }
    if !(mass.is_finite() && mass > 0.0) {
        return Err(SimError::config(format!("dwarf-model[{index}]: mass must be positive, got {mass}")));
    }
    if !(scale_radius.is_finite() && scale_radius > 0.0) {
        return Err(SimError::config(format!(
            "dwarf-model[{index}]: scale-radius must be positive, got {scale_radius}"
        )));
    }
    match usize::try_from(nbody) {
        Ok(n) if n <= MAX_BODIES => Ok(n),
        _ => Err(SimError::config(format!(
            "dwarf-model[{index}]: nbody {nbody} exceeds the limit of {MAX_BODIES}"
        ))),
    }
}

/// Resolve configured initial conditions into galactocentric Cartesian
///
/// With `use_gal_c` the position is already `(x, y, z)`. Otherwise it is
/// heliocentric `(l, b, r)`, in degrees unless `angle_use_radians`. The
/// velocity is galactocentric Cartesian in both conventions.
pub fn resolve_center(
    position: [f64; 3],
    velocity: [f64; 3],
    use_gal_c: bool,
    angle_use_radians: bool,
    sun_gc_distance: f64,
) -> (NVec3, NVec3) {
    let pos = NVec3::from(position);
    let vel = NVec3::from(velocity);

    if use_gal_c {
        return (pos, vel);
    }

    let lbr = if angle_use_radians {
        pos
    } else {
        NVec3::new(pos.x.to_radians(), pos.y.to_radians(), pos.z)
    };
    (lbr_to_cartesian(&lbr, sun_gc_distance), vel)
}

/// Sample every component in order and concatenate the bodies
pub fn generate_bodies<R: Rng>(components: &[DwarfComponent], rng: &mut R) -> Vec<Body> {
    let total: usize = components.iter().map(|c| c.nbody).sum();
    let mut bodies = Vec::with_capacity(total);

    for (index, component) in components.iter().enumerate() {
        let mut sampled = match component.profile {
            DwarfProfile::Plummer => sample_plummer(component, index, rng),
        };
        place_cluster(&mut sampled, &component.position, &component.velocity);
        bodies.append(&mut sampled);
    }

    bodies
}

/// Draw `nbody` equal-mass bodies from a Plummer sphere centered on the origin
fn sample_plummer<R: Rng>(component: &DwarfComponent, index: usize, rng: &mut R) -> Vec<Body> {
    let rsc = component.scale_radius;
    let vsc = (component.mass / rsc).sqrt();
    let m = component.mass / component.nbody as f64;

    (0..component.nbody)
        .map(|_| {
            // invert the cumulative mass fraction M(<r)/M = r^3 / (1 + r^2)^(3/2)
            let u: f64 = rng.gen_range(0.0..PLUMMER_MAX_FRACTION);
            let r = 1.0 / (u.powf(-2.0 / 3.0) - 1.0).sqrt();
            let x = pick_shell(rng, rsc * r);

            let v = if component.cold {
                NVec3::zeros()
            } else {
                let q = plummer_speed_fraction(rng);
                let speed = q * SQRT_2 / (1.0 + r * r).powf(0.25);
                pick_shell(rng, vsc * speed)
            };

            Body { x, v, m, component: index }
        })
        .collect()
}

/// Von Neumann rejection for q = v / v_esc with density `q^2 (1 - q^2)^(7/2)`
fn plummer_speed_fraction<R: Rng>(rng: &mut R) -> f64 {
    loop {
        let x: f64 = rng.gen_range(0.0..1.0);
        let y: f64 = rng.gen_range(0.0..0.1);
        if y <= x * x * (1.0 - x * x).powf(3.5) {
            return x;
        }
    }
}

/// Uniformly distributed point on a sphere of the given radius
fn pick_shell<R: Rng>(rng: &mut R, radius: f64) -> NVec3 {
    loop {
        let v = NVec3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        let rsq = v.norm_squared();
        if rsq > 0.0 && rsq <= 1.0 {
            return v * (radius / rsq.sqrt());
        }
    }
}

/// Move the sample's own center of mass onto the origin, then onto `(pos, vel)`
fn place_cluster(bodies: &mut [Body], pos: &NVec3, vel: &NVec3) {
    if bodies.is_empty() {
        return;
    }
    let mass: f64 = bodies.iter().map(|b| b.m).sum();
    let cm_x = bodies.iter().fold(NVec3::zeros(), |acc, b| acc + b.x * b.m) / mass;
    let cm_v = bodies.iter().fold(NVec3::zeros(), |acc, b| acc + b.v * b.m) / mass;

    for b in bodies.iter_mut() {
        b.x += pos - cm_x;
        b.v += vel - cm_v;
    }
}
