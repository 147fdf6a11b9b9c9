//! Fixed-step time integration for the N-body system
//!
//! Provides a kick–drift–kick leapfrog driven by an [`AccelSet`], and the
//! reverse orbit of a single tracer through the background potential that
//! fixes where a dwarf's orbit starts

use log::debug;

use crate::error::{SimError, SimResult};
use crate::simulation::forces::{AccelSet, ExternalPotential};
use crate::simulation::potential::Potential;
use crate::simulation::states::{Body, NVec3, System};

/// Kick–drift–kick leapfrog with one force evaluation per step.
///
/// The accelerations at the current positions are kept between steps, so
/// each step costs a single [`AccelSet::accumulate_accels`] call. A negative
/// `dt` integrates backwards in time.
pub struct Leapfrog {
    dt: f64,
    acc: Vec<NVec3>, // a_n at the current positions x_n
    steps_taken: usize,
    phase: &'static str, // label used in error reports
}

impl Leapfrog {
    /// Prime the integrator with the accelerations at the initial state
    pub fn new(sys: &System, forces: &AccelSet, dt: f64, phase: &'static str) -> SimResult<Self> {
        let mut acc = vec![NVec3::zeros(); sys.bodies.len()];
        forces.accumulate_accels(sys.t, sys, &mut acc);

        let integrator = Self { dt, acc, steps_taken: 0, phase };
        integrator.check_accels(&integrator.acc, sys.t, 0)?;
        Ok(integrator)
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    pub fn accelerations(&self) -> &[NVec3] {
        &self.acc
    }

    /// Advance `sys` by one step.
    ///
    /// The step is computed on a copy of the state and only committed when
    /// every position, acceleration and velocity is finite; on failure `sys`
    /// still holds the state at the start of the step.
    pub fn step(&mut self, sys: &mut System, forces: &AccelSet) -> SimResult<()> {
        let dt = self.dt; // time step dt
        let half_dt = 0.5 * dt; // half step dt/2
        let step = self.steps_taken + 1;

        let mut next = sys.clone();

        // Kick: v_n+1/2 = v_n + (dt/2) a_n
        // Drift: x_n+1 = x_n + dt v_n+1/2
        for (b, a) in next.bodies.iter_mut().zip(self.acc.iter()) {
            b.v += half_dt * *a;
            b.x += dt * b.v;
        }

        // advance time: t_n+1 = t_n + dt
        next.t += dt;

        if let Some((body, quantity)) = next.first_non_finite() {
            return Err(self.instability(step, next.t, body, quantity));
        }

        // a_n+1 from x_n+1 at time t_n+1
        let mut a_new = vec![NVec3::zeros(); next.bodies.len()];
        forces.accumulate_accels(next.t, &next, &mut a_new);
        self.check_accels(&a_new, next.t, step)?;

        // Second kick: v_n+1 = v_n+1/2 + (dt/2) a_n+1
        for (b, a) in next.bodies.iter_mut().zip(a_new.iter()) {
            b.v += half_dt * *a;
        }

        if let Some((body, quantity)) = next.first_non_finite() {
            return Err(self.instability(step, next.t, body, quantity));
        }

        *sys = next;
        self.acc = a_new;
        self.steps_taken = step;
        Ok(())
    }

    /// Take `steps` consecutive steps, stopping at the first failure
    pub fn run(&mut self, sys: &mut System, forces: &AccelSet, steps: usize) -> SimResult<()> {
        let report_every = (steps / 10).max(1);
        for k in 0..steps {
            self.step(sys, forces)?;
            if (k + 1) % report_every == 0 {
                debug!("{}: step {}/{} (t = {:.5})", self.phase, k + 1, steps, sys.t);
            }
        }
        Ok(())
    }

    fn check_accels(&self, acc: &[NVec3], t: f64, step: usize) -> SimResult<()> {
        match acc.iter().position(|a| !a.iter().all(|c| c.is_finite())) {
            Some(body) => Err(self.instability(step, t, body, "acceleration")),
            None => Ok(()),
        }
    }

    fn instability(&self, step: usize, time: f64, body: usize, quantity: &'static str) -> SimError {
        SimError::NumericalInstability {
            phase: self.phase,
            step,
            time,
            body,
            quantity,
        }
    }
}

/// Integrate a massless tracer backwards through the background potential.
///
/// Starting from the present-day `(pos, vel)`, takes `steps` leapfrog steps
/// of `-dt` and returns the phase-space point the tracer came from.
pub fn reverse_orbit(potential: &Potential, pos: NVec3, vel: NVec3, dt: f64, steps: usize) -> SimResult<(NVec3, NVec3)> {
    let mut tracer = System::new(vec![Body { x: pos, v: vel, m: 0.0, component: 0 }]);
    let forces = AccelSet::new().with(ExternalPotential {
        potential: potential.clone(),
    });

    let mut integrator = Leapfrog::new(&tracer, &forces, -dt, "reverse orbit")?;
    integrator.run(&mut tracer, &forces, steps)?;

    let body = &tracer.bodies[0];
    Ok((body.x, body.v))
}
