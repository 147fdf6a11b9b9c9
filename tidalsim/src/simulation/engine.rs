//! Runtime tree-code settings
//!
//! Selects the opening criterion, accuracy parameter and quadrupole option
//! used by the Barnes–Hut force evaluation, plus the tree's leaf and depth limits

use std::fmt;
use std::str::FromStr;

use crate::error::SimError;

/// Cell admissibility test used while walking the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    /// Salmon & Warren (1993): accept a cell when the largest distance from its
    /// center of mass to a corner is below `theta` times the distance to the body
    Sw93,
}

impl FromStr for Criterion {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sw93" => Ok(Criterion::Sw93),
            _ => Err(SimError::UnsupportedCriterion(s.to_string())),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Sw93 => write!(f, "sw93"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    pub criterion: Criterion, // opening test
    pub theta: f64, // opening angle / accuracy parameter
    pub use_quadrupole: bool, // add quadrupole corrections for accepted cells
    pub leaf_capacity: usize, // max bodies in a leaf before it splits
    pub max_depth: usize, // depth at which leaves stop splitting regardless of capacity
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            criterion: Criterion::Sw93,
            theta: 1.0,
            use_quadrupole: true,
            leaf_capacity: 1,
            max_depth: 48,
        }
    }
}
