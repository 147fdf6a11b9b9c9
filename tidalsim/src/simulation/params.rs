//! Numerical and physical parameters for the simulation
//!
//! `Parameters` holds runtime settings:
//! - forward and reverse-orbit step sizes and durations,
//! - softening and gravitational constant (`eps2`, `G`),
//! - random seed and the Sun's galactocentric distance

/// Gravitational constant in simulation units (kpc, mass unit, time unit)
pub const G: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct Parameters {
    pub t_orbit: f64, // reverse-orbit duration
    pub t_evolve: f64, // forward evolution duration
    pub h0: f64, // forward step size
    pub h_orbit: f64, // reverse-orbit step size
    pub seed: u64, // deterministic seed
    pub eps2: f64, // softening squared
    pub g: f64, // gravitational constant
    pub sun_gc_distance: f64, // kpc
}

impl Parameters {
    /// Number of fixed steps of size `dt` needed to cover `duration`
    pub fn step_count(duration: f64, dt: f64) -> usize {
        if duration <= 0.0 || dt <= 0.0 {
            return 0;
        }
        let ratio = duration / dt;
        // tolerate round-off in durations that are exact multiples of dt
        (ratio * (1.0 - 1e-9)).ceil() as usize
    }

    pub fn evolve_steps(&self) -> usize {
        Self::step_count(self.t_evolve, self.h0)
    }

    pub fn orbit_steps(&self) -> usize {
        Self::step_count(self.t_orbit, self.h_orbit)
    }
}
