//! Timing and accuracy sweeps for the gravity terms
//!
//! - `bench_gravity`: direct n^2 sum vs Barnes–Hut, per force evaluation and
//!   per leapfrog step, over a range of N
//! - `bench_theta`: tree error against the direct sum as a function of theta,
//!   monopole-only vs quadrupole-corrected
//!
//! Output is CSV on stdout so it can be pasted straight into a spreadsheet.

use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::simulation::engine::Engine;
use crate::simulation::forces::{AccelSet, Acceleration, NewtonianGravity, NewtonianGravityBarnesHut};
use crate::simulation::initial::{generate_bodies, DwarfComponent, DwarfProfile};
use crate::simulation::integrator::Leapfrog;
use crate::simulation::states::{NVec3, System};

const G: f64 = 1.0;
const EPS2: f64 = 1e-4;

/// Helper to build a Plummer system of size `n`, seeded for repeatability
fn make_system(n: usize) -> System {
    let component = DwarfComponent {
        profile: DwarfProfile::Plummer,
        mass: 1.0,
        nbody: n,
        scale_radius: 1.0,
        cold: false,
        position: NVec3::zeros(),
        velocity: NVec3::zeros(),
    };
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    System::new(generate_bodies(&[component], &mut rng))
}

fn tree_gravity(theta: f64, use_quadrupole: bool) -> NewtonianGravityBarnesHut {
    NewtonianGravityBarnesHut {
        g: G,
        eps2: EPS2,
        engine: Engine {
            theta,
            use_quadrupole,
            ..Engine::default()
        },
    }
}

pub fn bench_gravity() {
    // Different system sizes to test
    let ns = [200, 400, 800, 1600, 3200, 6400];

    println!("N,direct_force_ms,bh_force_ms,direct_step_ms,bh_step_ms");

    for n in ns {
        let sys = make_system(n);
        let mut out = vec![NVec3::zeros(); n];

        // Set up gravity models
        let direct = NewtonianGravity { g: G, eps2: EPS2 };
        let bh = tree_gravity(0.7, true);

        // Warm up
        direct.acceleration(0.0, &sys, &mut out);
        bh.acceleration(0.0, &sys, &mut out);

        // Time direct
        let t0 = Instant::now();
        direct.acceleration(0.0, &sys, &mut out);
        let ms_direct = t0.elapsed().as_secs_f64() * 1000.0;

        // Time barnes-hut
        let t1 = Instant::now();
        bh.acceleration(0.0, &sys, &mut out);
        let ms_bh = t1.elapsed().as_secs_f64() * 1000.0;

        // Full leapfrog steps, averaged over a few steps for small n
        let steps = if n <= 800 { 5 } else { 1 };
        let ms_direct_step = time_steps(&sys, AccelSet::new().with(NewtonianGravity { g: G, eps2: EPS2 }), steps);
        let ms_bh_step = time_steps(&sys, AccelSet::new().with(tree_gravity(0.7, true)), steps);

        println!("{n},{ms_direct:.6},{ms_bh:.6},{ms_direct_step:.6},{ms_bh_step:.6}");
    }
}

/// Milliseconds per leapfrog step, or NaN if the integration fails
fn time_steps(template: &System, forces: AccelSet, steps: usize) -> f64 {
    let mut sys = template.clone();
    let Ok(mut integrator) = Leapfrog::new(&sys, &forces, 1e-3, "benchmark") else {
        return f64::NAN;
    };

    let t0 = Instant::now();
    if integrator.run(&mut sys, &forces, steps).is_err() {
        return f64::NAN;
    }
    t0.elapsed().as_secs_f64() * 1000.0 / steps as f64
}

/// RMS relative error of the tree accelerations against the direct sum
pub fn relative_rms_error(exact: &[NVec3], approx: &[NVec3]) -> f64 {
    if exact.is_empty() {
        return 0.0;
    }
    let sum: f64 = exact
        .iter()
        .zip(approx.iter())
        .map(|(e, a)| {
            let norm = e.norm();
            if norm > 0.0 { ((a - e).norm() / norm).powi(2) } else { 0.0 }
        })
        .sum();
    (sum / exact.len() as f64).sqrt()
}

pub fn bench_theta() {
    let n = 2000;
    let sys = make_system(n);

    let mut exact = vec![NVec3::zeros(); n];
    NewtonianGravity { g: G, eps2: EPS2 }.acceleration(0.0, &sys, &mut exact);

    println!("theta,mono_rms,quad_rms,mono_ms,quad_ms");

    for theta in [0.2, 0.4, 0.6, 0.8, 1.0, 1.2] {
        // (rms error, ms) for monopole-only, then quadrupole-corrected
        let [mono, quad] = [false, true].map(|use_quadrupole| {
            let mut out = vec![NVec3::zeros(); n];
            let t0 = Instant::now();
            tree_gravity(theta, use_quadrupole).acceleration(0.0, &sys, &mut out);
            let ms = t0.elapsed().as_secs_f64() * 1000.0;
            (relative_rms_error(&exact, &out), ms)
        });

        println!("{theta:.2},{:.6e},{:.6e},{:.6},{:.6}", mono.0, quad.0, mono.1, quad.1);
    }
}
