//! Core state types for the N-body simulation.
//!
//! - `Body`   one particle: position, velocity, mass and the dwarf component it came from
//! - `System` the full body set plus the current simulation time `t`
//!
//! Bodies are mutated in place by the integrator; mass never changes after
//! the initial conditions are generated.

use nalgebra::Vector3;
use serde::Serialize;

pub type NVec3 = Vector3<f64>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Body {
    pub x: NVec3, // position
    pub v: NVec3, // velocity
    pub m: f64, // mass
    pub component: usize, // index of the dwarf-model entry this body was sampled from
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct System {
    pub bodies: Vec<Body>, // collection of bodies
    pub t: f64, // time
}

impl System {
    pub fn new(bodies: Vec<Body>) -> Self {
        Self { bodies, t: 0.0 }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn total_mass(&self) -> f64 {
        self.bodies.iter().map(|b| b.m).sum()
    }

    /// Mass-weighted mean position, or the origin for a massless system
    pub fn center_of_mass(&self) -> NVec3 {
        let mass = self.total_mass();
        if mass <= 0.0 {
            return NVec3::zeros();
        }
        self.bodies.iter().fold(NVec3::zeros(), |acc, b| acc + b.x * b.m) / mass
    }

    /// Mass-weighted mean velocity
    pub fn center_of_mass_velocity(&self) -> NVec3 {
        let mass = self.total_mass();
        if mass <= 0.0 {
            return NVec3::zeros();
        }
        self.bodies.iter().fold(NVec3::zeros(), |acc, b| acc + b.v * b.m) / mass
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.bodies.iter().map(|b| 0.5 * b.m * b.v.norm_squared()).sum()
    }

    /// Index and quantity name of the first body carrying a non-finite value
    pub fn first_non_finite(&self) -> Option<(usize, &'static str)> {
        self.bodies.iter().enumerate().find_map(|(i, b)| {
            if !b.x.iter().all(|c| c.is_finite()) {
                Some((i, "position"))
            } else if !b.v.iter().all(|c| c.is_finite()) {
                Some((i, "velocity"))
            } else {
                None
            }
        })
    }
}
