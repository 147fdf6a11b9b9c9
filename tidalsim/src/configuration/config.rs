//! Configuration types for loading simulation scenarios from parameter files.
//!
//! This module defines a thin, `serde`-deserializable representation of a
//! scenario parameter file. A scenario consists of:
//!
//! - [`ContextConfig`]    – tree settings, seed, durations, potential and dwarf models
//! - [`PotentialConfig`]  – the static galactic background (disk, spherical, halo)
//! - [`DwarfModelConfig`] – one entry per dwarf-galaxy component
//! - [`HistogramConfig`]  – binning of the final state (empty object => defaults)
//! - [`ScenarioFile`]     – top-level wrapper matching the file layout
//!
//! # File format
//! JSON is the native format; YAML files with the same keys are accepted too.
//!
//! ```json
//! {
//! "nbody-parameters-file": {
//!     "nbody-context": {
//!         "headline" : "orphan model 2",
//!         "criterion" : "sw93",
//!         "use-quadrupole-corrections" : true,
//!         "accuracy-parameter" : 1.0,
//!         "seed" : 0,
//!         "time-orbit" : 4,
//!         "time-evolve" : 3.945,
//!         "potential" : {
//!             "disk" : { "exponential" : { "mass" : 224933, "scale-length" : 4 } },
//!             "spherical" : { "sphere" : { "mass" : 67479.9, "r0-scale" : 0.6 } },
//!             "halo" : { "nfw" : { "vhalo" : 120, "scale-length" : 22.25 } }
//!         },
//!         "dwarf-model": [
//!             {
//!                 "type" : "plummer",
//!                 "mass" : 16,
//!                 "nbody" : 1000,
//!                 "scale-radius" : 0.2,
//!                 "initial-conditions": {
//!                     "useGalC" : false,
//!                     "angle-use-radians" : false,
//!                     "velocity" : [ -157, 78, 107 ],
//!                     "position" : [ 218, 53.5, 28.5 ]
//!                 }
//!             }
//!         ]
//!     },
//!     "histogram" : { }
//! }}
//! ```
//!
//! Nothing here is range-checked; the scenario builder validates the values
//! and maps them into the runtime types.

use serde::Deserialize;

/// Top-level wrapper matching the `"nbody-parameters-file"` object.
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioFile {
    #[serde(rename = "nbody-parameters-file")]
    pub parameters: ScenarioConfig,
}

/// A complete scenario: simulation context plus histogram settings.
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioConfig {
    #[serde(rename = "nbody-context")]
    pub context: ContextConfig,
    #[serde(default)]
    pub histogram: HistogramConfig,
}

/// Global simulation context
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ContextConfig {
    #[serde(default)]
    pub headline: Option<String>, // free-form description of the run
    pub criterion: String, // tree opening criterion, only "sw93"
    pub use_quadrupole_corrections: bool, // add the quadrupole term for accepted cells
    pub accuracy_parameter: f64, // opening angle theta
    pub seed: u64, // seed for initial-condition sampling
    #[serde(default)]
    pub time_orbit: f64, // duration of the reverse orbit of the dwarf center
    pub time_evolve: f64, // duration of the forward evolution with self-gravity
    pub potential: PotentialConfig,
    pub dwarf_model: Vec<DwarfModelConfig>,

    // Overrides for values otherwise derived from the dwarf models
    #[serde(default)]
    pub timestep: Option<f64>,
    #[serde(default)]
    pub orbit_timestep: Option<f64>,
    #[serde(default)]
    pub softening: Option<f64>, // eps, not squared

    #[serde(default = "default_sun_gc_distance")]
    pub sun_gc_distance: f64, // kpc
    #[serde(default = "default_leaf_capacity")]
    pub leaf_capacity: usize,
    #[serde(default = "default_max_tree_depth")]
    pub max_tree_depth: usize,
}

fn default_sun_gc_distance() -> f64 {
    8.0
}

fn default_leaf_capacity() -> usize {
    1
}

fn default_max_tree_depth() -> usize {
    48
}

/// The static background potential. All three components are required.
#[derive(Deserialize, Debug, Clone)]
pub struct PotentialConfig {
    pub disk: DiskConfig,
    pub spherical: SphericalConfig,
    pub halo: HaloConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub enum DiskConfig {
    #[serde(rename = "exponential")]
    Exponential {
        mass: f64,
        #[serde(rename = "scale-length")]
        scale_length: f64,
    },

    #[serde(rename = "miyamoto-nagai")]
    MiyamotoNagai {
        mass: f64,
        #[serde(rename = "scale-length")]
        scale_length: f64,
        #[serde(rename = "scale-height")]
        scale_height: f64,
    },
}

#[derive(Deserialize, Debug, Clone)]
pub enum SphericalConfig {
    #[serde(rename = "sphere")] // Hernquist-like bulge
    Sphere {
        mass: f64,
        #[serde(rename = "r0-scale")]
        r0_scale: f64,
    },
}

#[derive(Deserialize, Debug, Clone)]
pub enum HaloConfig {
    #[serde(rename = "nfw")]
    Nfw {
        vhalo: f64,
        #[serde(rename = "scale-length")]
        scale_length: f64,
    },

    #[serde(rename = "logarithmic")]
    Logarithmic {
        vhalo: f64,
        #[serde(rename = "scale-length")]
        scale_length: f64,
        #[serde(rename = "flatten-z")]
        flatten_z: f64,
    },

    #[serde(rename = "triaxial")]
    Triaxial {
        vhalo: f64,
        #[serde(rename = "scale-length")]
        scale_length: f64,
        #[serde(rename = "flatten-x")]
        flatten_x: f64,
        #[serde(rename = "flatten-y")]
        flatten_y: f64,
        #[serde(rename = "flatten-z")]
        flatten_z: f64,
        #[serde(rename = "triax-angle")]
        triax_angle: f64, // degrees
    },
}

/// One dwarf-galaxy component
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct DwarfModelConfig {
    #[serde(rename = "type")]
    pub profile: String, // density profile, only "plummer"
    pub mass: f64,
    pub nbody: i64,
    pub scale_radius: f64,
    #[serde(default)]
    pub cold: bool, // true - no intrinsic velocities, every body moves with the center
    pub initial_conditions: InitialConditionsConfig,
}

/// Present-day position and velocity of a dwarf component's center
#[derive(Deserialize, Debug, Clone)]
pub struct InitialConditionsConfig {
    #[serde(rename = "useGalC")]
    pub use_gal_c: bool, // true - position is galactocentric (x, y, z), false - heliocentric (l, b, r)
    #[serde(rename = "angle-use-radians", default)]
    pub angle_use_radians: bool, // units of l and b when `use_gal_c` is false
    pub position: [f64; 3],
    pub velocity: [f64; 3], // galactocentric Cartesian in both conventions
}

/// Binning of the final state along the stream longitude lambda
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", default)]
pub struct HistogramConfig {
    pub lambda_start: f64, // degrees
    pub lambda_end: f64, // degrees
    pub bin_size: f64, // degrees
    pub weighted: bool, // accumulate body mass instead of counts into the primary value
    pub phi: f64, // stream-frame Euler angles, degrees
    pub theta: f64,
    pub psi: f64,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        // Orphan stream frame (Newberg et al. 2010)
        Self {
            lambda_start: -50.0,
            lambda_end: 50.0,
            bin_size: 3.0,
            weighted: false,
            phi: 128.79,
            theta: 54.39,
            psi: 90.70,
        }
    }
}
