//! Force / acceleration contributors for the n-body engine
//!
//! Defines the acceleration trait and its terms: direct Newtonian gravity,
//! the Barnes–Hut tree variant and the static galactic potential

use log::trace;
use rayon::prelude::*;

use crate::simulation::barnes_hut::{BarnesHutTree, WalkParams};
use crate::simulation::engine::Engine;
use crate::simulation::potential::Potential;
use crate::simulation::states::{NVec3, System};

/// Below this many bodies the potential term is evaluated on the calling thread
const PARALLEL_MIN_BODIES: usize = 256;

/// Collection of acceleration terms (self-gravity, background potential, etc.)
/// Each term implements [`Acceleration`] and their contributions are summed
/// into a single acceleration vector per body
#[derive(Default)]
pub struct AccelSet {
    terms: Vec<Box<dyn Acceleration + Send + Sync>>,
}

impl AccelSet {
    /// Create an empty acceleration set
    pub fn new() -> Self {
        Self {
            terms: Vec::new(),
        }
    }

    /// Add an acceleration term
    pub fn with(mut self, term: impl Acceleration + Send + Sync + 'static) -> Self {
        self.terms.push(Box::new(term));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Compute total accelerations at time `t` for all bodies in `sys`
    /// - `out[i]` will be set to the sum of contributions from all terms
    pub fn accumulate_accels(&self, t: f64, sys: &System, out: &mut [NVec3]) {
        // Zero buffer
        for a in out.iter_mut() {
            *a = NVec3::zeros();
        }
        // Iterate over all acceleration contributors
        for term in &self.terms {
            term.acceleration(t, sys, out);
        }
    }
}

/// Acceleration source operating on a [`System`]
/// Implementations add their contribution into `out[i]` for each body
pub trait Acceleration {
    fn acceleration(&self, t: f64, sys: &System, out: &mut [NVec3]);
}

/// Newtonian gravity with softening (direct n^2 sum)
pub struct NewtonianGravity {
    pub g: f64, // gravitational constant
    pub eps2: f64, // softening
}

impl Acceleration for NewtonianGravity {
    fn acceleration(&self, _t: f64, sys: &System, out: &mut [NVec3]) {
        let n = sys.bodies.len();
        if n == 0 { // No bodies, return
            return;
        }

        // Loop over each unordered pair (i, j) with i < j
        for i in 0..n {
            let bi = &sys.bodies[i];
            let xi = bi.x;
            let mi = bi.m;

            for j in (i + 1)..n {
                let bj = &sys.bodies[j];

                // r points from i to j: i is pulled along +r, j along -r
                let r = bj.x - xi;

                // softened squared distance |r|^2 + eps^2
                let d2 = r.dot(&r) + self.eps2;
                let inv_r = d2.sqrt().recip();
                let coef = self.g * inv_r * inv_r * inv_r;

                // equal and opposite
                out[i] += coef * bj.m * r;
                out[j] -= coef * mi * r;
            }
        }
    }
}

/// Newtonian gravity evaluated via a Barnes–Hut octree
/// Builds a fresh [`BarnesHutTree`] per call and walks it once per body,
/// in parallel; each worker writes only its own body's slot
pub struct NewtonianGravityBarnesHut {
    pub g: f64,
    pub eps2: f64,
    pub engine: Engine,
}

impl NewtonianGravityBarnesHut {
    fn walk_params(&self) -> WalkParams {
        WalkParams {
            g: self.g,
            eps2: self.eps2,
            theta: self.engine.theta,
            criterion: self.engine.criterion,
            use_quadrupole: self.engine.use_quadrupole,
        }
    }
}

impl Acceleration for NewtonianGravityBarnesHut {
    fn acceleration(&self, t: f64, sys: &System, out: &mut [NVec3]) {
        if sys.bodies.is_empty() {
            return;
        }

        let tree = BarnesHutTree::build(sys, &self.engine);
        trace!("t = {t:.6}: tree {:?}", tree.stats());

        let walk = self.walk_params();
        out.par_iter_mut().enumerate().for_each(|(i, a)| {
            *a += tree.force_on_body(i, sys, &walk);
        });
    }
}

/// Acceleration from the static galactic background
pub struct ExternalPotential {
    pub potential: Potential,
}

impl Acceleration for ExternalPotential {
    fn acceleration(&self, _t: f64, sys: &System, out: &mut [NVec3]) {
        if sys.bodies.len() < PARALLEL_MIN_BODIES {
            for (a, b) in out.iter_mut().zip(sys.bodies.iter()) {
                *a += self.potential.acceleration(&b.x);
            }
            return;
        }

        out.par_iter_mut().zip(sys.bodies.par_iter()).for_each(|(a, b)| {
            *a += self.potential.acceleration(&b.x);
        });
    }
}
