pub mod simulation;
pub mod configuration;
pub mod benchmark;
pub mod error;

pub use simulation::states::{Body, System, NVec3};
pub use simulation::forces::{Acceleration, AccelSet, NewtonianGravity, NewtonianGravityBarnesHut, ExternalPotential};
pub use simulation::integrator::{Leapfrog, reverse_orbit};
pub use simulation::scenario::{Scenario, RunOutput};
pub use simulation::histogram::{Histogram, HistogramBin, HistogramSettings};
pub use simulation::potential::{Potential, Disk, Spherical, Halo};

pub use configuration::config::{ScenarioFile, ScenarioConfig, ContextConfig, PotentialConfig, DwarfModelConfig, HistogramConfig};

pub use error::{SimError, SimResult};

pub use benchmark::benchmark::{bench_gravity, bench_theta};

/// Run one scenario end to end: validate, reverse-orbit, sample, evolve, bin
pub fn run(cfg: &ScenarioConfig) -> SimResult<RunOutput> {
    Scenario::build_scenario(cfg)?.run()
}

/// Accelerations (tree self-gravity plus background potential) on every body
/// of `state` under the settings of `cfg`
pub fn evaluate_forces(state: &System, cfg: &ScenarioConfig) -> SimResult<Vec<NVec3>> {
    let scenario = Scenario::build_scenario(cfg)?;
    let mut out = vec![NVec3::zeros(); state.bodies.len()];
    scenario.forces().accumulate_accels(state.t, state, &mut out);
    Ok(out)
}
