//! Build fully-initialized simulation scenarios from configuration
//!
//! Takes a [`ScenarioConfig`] (file-facing) and produces the runtime bundle
//! [`Scenario`] containing:
//! - tree settings (`Engine`)
//! - numerical parameters (`Parameters`), with timesteps and softening
//!   derived from the dwarf models unless overridden
//! - the background potential and the dwarf components
//! - the histogram binning scheme
//!
//! Every value is validated here, before any orbit integration or sampling.
//! [`Scenario::run`] then performs the reverse orbit, samples the bodies and
//! evolves them forward.

use log::{debug, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::configuration::config::{DiskConfig, HaloConfig, PotentialConfig, ScenarioConfig, SphericalConfig};
use crate::error::{SimError, SimResult};
use crate::simulation::engine::{Criterion, Engine};
use crate::simulation::forces::{AccelSet, ExternalPotential, NewtonianGravityBarnesHut};
use crate::simulation::histogram::{Histogram, HistogramSettings};
use crate::simulation::initial::{generate_bodies, resolve_center, validate_dwarf, DwarfComponent, DwarfProfile, MAX_BODIES};
use crate::simulation::integrator::{reverse_orbit, Leapfrog};
use crate::simulation::params::{Parameters, G};
use crate::simulation::potential::{Disk, Halo, Potential, Spherical};
use crate::simulation::states::System;

/// Validated runtime form of a scenario parameter file
#[derive(Debug, Clone)]
pub struct Scenario {
    pub headline: Option<String>,
    pub engine: Engine,
    pub parameters: Parameters,
    pub potential: Potential,
    pub components: Vec<DwarfComponent>, // centers at their present-day positions
    pub histogram: HistogramSettings,
}

/// Final state of a run and its histogram
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub system: System,
    pub histogram: Histogram,
}

impl Scenario {
    pub fn build_scenario(cfg: &ScenarioConfig) -> SimResult<Self> {
        let ctx = &cfg.context;

        // Engine (runtime) from the tree settings
        let criterion: Criterion = ctx.criterion.parse()?;
        non_negative("accuracy-parameter", ctx.accuracy_parameter)?;
        if ctx.leaf_capacity == 0 {
            return Err(SimError::config("leaf-capacity must be at least 1"));
        }
        if ctx.max_tree_depth == 0 {
            return Err(SimError::config("max-tree-depth must be at least 1"));
        }
        let engine = Engine {
            criterion,
            theta: ctx.accuracy_parameter,
            use_quadrupole: ctx.use_quadrupole_corrections,
            leaf_capacity: ctx.leaf_capacity,
            max_depth: ctx.max_tree_depth,
        };

        non_negative("time-orbit", ctx.time_orbit)?;
        non_negative("time-evolve", ctx.time_evolve)?;
        non_negative("sun-gc-distance", ctx.sun_gc_distance)?;

        let potential = potential_from_config(&ctx.potential);
        potential.validate()?;

        // Dwarf components: map `DwarfModelConfig` -> runtime `DwarfComponent`
        if ctx.dwarf_model.is_empty() {
            return Err(SimError::config("dwarf-model must contain at least one component"));
        }
        let components = ctx
            .dwarf_model
            .iter()
            .enumerate()
            .map(|(i, dm)| {
                let nbody = validate_dwarf(i, dm.mass, dm.nbody, dm.scale_radius)?;
                let profile: DwarfProfile = dm.profile.parse()?;

                let ic = &dm.initial_conditions;
                if !ic.position.iter().chain(ic.velocity.iter()).all(|c| c.is_finite()) {
                    return Err(SimError::config(format!(
                        "dwarf-model[{i}]: initial position and velocity must be finite"
                    )));
                }
                let (position, velocity) = resolve_center(
                    ic.position,
                    ic.velocity,
                    ic.use_gal_c,
                    ic.angle_use_radians,
                    ctx.sun_gc_distance,
                );

                Ok(DwarfComponent {
                    profile,
                    mass: dm.mass,
                    nbody,
                    scale_radius: dm.scale_radius,
                    cold: dm.cold,
                    position,
                    velocity,
                })
            })
            .collect::<SimResult<Vec<_>>>()?;

        let total_bodies: usize = components.iter().map(|c| c.nbody).sum();
        if total_bodies > MAX_BODIES {
            return Err(SimError::config(format!(
                "dwarf-model: {total_bodies} bodies in total exceeds the limit of {MAX_BODIES}"
            )));
        }

        // Parameters (runtime): derived from the dwarf models unless overridden
        let h0 = match ctx.timestep {
            Some(dt) => positive("timestep", dt)?,
            None => components.iter().map(|c| c.timestep()).fold(f64::INFINITY, f64::min),
        };
        let h_orbit = match ctx.orbit_timestep {
            Some(dt) => positive("orbit-timestep", dt)?,
            None => h0 / 10.0,
        };
        let eps = match ctx.softening {
            Some(eps) => non_negative("softening", eps)?,
            None => components.iter().map(|c| c.softening()).fold(f64::INFINITY, f64::min),
        };

        let parameters = Parameters {
            t_orbit: ctx.time_orbit,
            t_evolve: ctx.time_evolve,
            h0,
            h_orbit,
            seed: ctx.seed,
            eps2: eps * eps,
            g: G,
            sun_gc_distance: ctx.sun_gc_distance,
        };

        let histogram = HistogramSettings::from_config(&cfg.histogram)?;

        Ok(Self {
            headline: ctx.headline.clone(),
            engine,
            parameters,
            potential,
            components,
            histogram,
        })
    }

    /// Self-gravity through the tree plus the background potential
    pub fn forces(&self) -> AccelSet {
        AccelSet::new()
            .with(NewtonianGravityBarnesHut {
                g: self.parameters.g,
                eps2: self.parameters.eps2,
                engine: self.engine.clone(),
            })
            .with(ExternalPotential {
                potential: self.potential.clone(),
            })
    }

    /// Bodies at t = 0: each component's center is first integrated back
    /// through the potential for `t_orbit`, then the cluster is sampled there
    pub fn initial_system(&self) -> SimResult<System> {
        let mut components = self.components.clone();

        let orbit_steps = self.parameters.orbit_steps();
        if orbit_steps > 0 {
            for (i, c) in components.iter_mut().enumerate() {
                let (x, v) = reverse_orbit(&self.potential, c.position, c.velocity, self.parameters.h_orbit, orbit_steps)?;
                info!(
                    "dwarf-model[{i}]: reverse orbit over {orbit_steps} steps moved center from {:?} to {:?}",
                    c.position.as_slice(),
                    x.as_slice()
                );
                c.position = x;
                c.velocity = v;
            }
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.parameters.seed);
        Ok(System::new(generate_bodies(&components, &mut rng)))
    }

    /// Run the whole scenario and bin the final state
    pub fn run(&self) -> SimResult<RunOutput> {
        let p = &self.parameters;
        let steps = p.evolve_steps();

        info!("{}", self.headline.as_deref().unwrap_or("unnamed scenario"));
        info!(
            "criterion = {}, theta = {}, quadrupole = {}, dt = {:.6e}, orbit dt = {:.6e}, eps = {:.6e}",
            self.engine.criterion,
            self.engine.theta,
            self.engine.use_quadrupole,
            p.h0,
            p.h_orbit,
            p.eps2.sqrt()
        );

        let final_time = steps as f64 * p.h0;
        if (final_time - p.t_evolve).abs() > 1e-9 * p.t_evolve.max(1.0) {
            warn!("time-evolve {} is not a multiple of dt; evolving to t = {}", p.t_evolve, final_time);
        }

        let mut system = self.initial_system()?;
        info!("sampled {} bodies, total mass {}", system.len(), system.total_mass());
        debug!("initial kinetic energy {:.6e}, center of mass {:?}", system.kinetic_energy(), system.center_of_mass().as_slice());

        let forces = self.forces();
        let mut integrator = Leapfrog::new(&system, &forces, p.h0, "evolution")?;
        info!("evolving for {steps} steps");
        integrator.run(&mut system, &forces, steps)?;

        debug!("final kinetic energy {:.6e}, center of mass {:?}", system.kinetic_energy(), system.center_of_mass().as_slice());

        let histogram = Histogram::from_system(&system, &self.histogram, p.sun_gc_distance);
        info!(
            "finished at t = {:.5}: {} bodies binned, {} out of range",
            system.t,
            histogram.total_count(),
            histogram.out_of_range
        );

        Ok(RunOutput { system, histogram })
    }
}

fn potential_from_config(cfg: &PotentialConfig) -> Potential {
    let disk = match cfg.disk {
        DiskConfig::Exponential { mass, scale_length } => Disk::Exponential { mass, scale_length },
        DiskConfig::MiyamotoNagai { mass, scale_length, scale_height } => Disk::MiyamotoNagai {
            mass,
            scale_length,
            scale_height,
        },
    };

    let sphere = match cfg.spherical {
        SphericalConfig::Sphere { mass, r0_scale } => Spherical::Hernquist { mass, scale: r0_scale },
    };

    let halo = match cfg.halo {
        HaloConfig::Nfw { vhalo, scale_length } => Halo::Nfw { vhalo, scale_length },
        HaloConfig::Logarithmic { vhalo, scale_length, flatten_z } => Halo::Logarithmic {
            vhalo,
            scale_length,
            flatten_z,
        },
        HaloConfig::Triaxial { vhalo, scale_length, flatten_x, flatten_y, flatten_z, triax_angle } => {
            Halo::triaxial(vhalo, scale_length, flatten_x, flatten_y, flatten_z, triax_angle)
        }
    };

    Potential { disk, sphere, halo }
}

fn positive(name: &str, value: f64) -> SimResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SimError::config(format!("{name} must be positive, got {value}")))
    }
}

fn non_negative(name: &str, value: f64) -> SimResult<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(SimError::config(format!("{name} must be non-negative, got {value}")))
    }
}
