use tidalsim::benchmark::benchmark::relative_rms_error;
use tidalsim::simulation::barnes_hut::{BarnesHutTree, WalkParams};
use tidalsim::simulation::coordinates::{cartesian_to_lbr, lbr_to_cartesian, StreamFrame};
use tidalsim::simulation::engine::{Criterion, Engine};
use tidalsim::simulation::forces::{AccelSet, Acceleration, ExternalPotential, NewtonianGravity, NewtonianGravityBarnesHut};
use tidalsim::simulation::histogram::{Histogram, HistogramSettings, MAX_BINS};
use tidalsim::simulation::initial::{generate_bodies, resolve_center, DwarfComponent, DwarfProfile};
use tidalsim::simulation::integrator::{reverse_orbit, Leapfrog};
use tidalsim::simulation::params::Parameters;
use tidalsim::simulation::potential::{Disk, Halo, Potential, Spherical};
use tidalsim::simulation::states::{Body, NVec3, System};
use tidalsim::{HistogramConfig, SimError};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Build a simple 2-body System separated along x-axis
pub fn two_body_system(dist: f64, m1: f64, m2: f64) -> System {
    let b1 = Body {
        x: [-dist / 2.0, 0.0, 0.0].into(),
        v: [0.0, 0.0, 0.0].into(),
        m: m1,
        component: 0,
    };
    let b2 = Body {
        x: [dist / 2.0, 0.0, 0.0].into(),
        v: [0.0, 0.0, 0.0].into(),
        m: m2,
        component: 0,
    };
    System {
        bodies: vec![b1, b2],
        t: 0.0,
    }
}

/// Default physics parameters for tests
pub fn test_params() -> Parameters {
    Parameters {
        t_orbit: 0.0,
        t_evolve: 1.0,
        h0: 0.001,
        h_orbit: 0.0001,
        seed: 42,
        eps2: 0.0,
        g: 1.0,
        sun_gc_distance: 8.0,
    }
}

/// Build a gravity term + AccelSet
pub fn gravity_set(p: &Parameters) -> AccelSet {
    AccelSet::new().with(NewtonianGravity {
        g: p.g,
        eps2: p.eps2,
    })
}

/// Seeded Plummer sphere at the origin
pub fn plummer_system(n: usize, seed: u64) -> System {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    System::new(generate_bodies(&[plummer_component(n, false)], &mut rng))
}

pub fn plummer_component(n: usize, cold: bool) -> DwarfComponent {
    DwarfComponent {
        profile: DwarfProfile::Plummer,
        mass: 16.0,
        nbody: n,
        scale_radius: 0.2,
        cold,
        position: NVec3::zeros(),
        velocity: NVec3::zeros(),
    }
}

/// The Milky Way model of the orphan-stream scenarios
pub fn galaxy() -> Potential {
    Potential {
        disk: Disk::Exponential { mass: 224933.0, scale_length: 4.0 },
        sphere: Spherical::Hernquist { mass: 67479.9, scale: 0.6 },
        halo: Halo::Nfw { vhalo: 120.0, scale_length: 22.25 },
    }
}

pub fn walk(theta: f64, use_quadrupole: bool, eps2: f64) -> WalkParams {
    WalkParams {
        g: 1.0,
        eps2,
        theta,
        criterion: Criterion::Sw93,
        use_quadrupole,
    }
}

fn tree_accels(sys: &System, theta: f64, use_quadrupole: bool, eps2: f64) -> Vec<NVec3> {
    let term = NewtonianGravityBarnesHut {
        g: 1.0,
        eps2,
        engine: Engine { theta, use_quadrupole, ..Engine::default() },
    };
    let mut out = vec![NVec3::zeros(); sys.len()];
    term.acceleration(0.0, sys, &mut out);
    out
}

fn direct_accels(sys: &System, eps2: f64) -> Vec<NVec3> {
    let mut out = vec![NVec3::zeros(); sys.len()];
    NewtonianGravity { g: 1.0, eps2 }.acceleration(0.0, sys, &mut out);
    out
}

fn total_energy(sys: &System, g: f64) -> f64 {
    let mut pot = 0.0;
    for i in 0..sys.len() {
        for j in (i + 1)..sys.len() {
            let r = (sys.bodies[j].x - sys.bodies[i].x).norm();
            pot -= g * sys.bodies[i].m * sys.bodies[j].m / r;
        }
    }
    sys.kinetic_energy() + pot
}

// ==================================================================================
// Gravity tests
// ==================================================================================

#[test]
fn gravity_newton_third_law() {
    let sys = two_body_system(1.0, 2.0, 3.0);
    let p = test_params();
    let forces = gravity_set(&p);

    let mut acc = vec![Default::default(); 2];
    forces.accumulate_accels(sys.t, &sys, &mut acc);

    let a1 = acc[0];
    let a2 = acc[1];

    let net = a1 * sys.bodies[0].m + a2 * sys.bodies[1].m;

    assert!(net.norm() < 1e-12, "Net momentum not zero: {:?}", net);
}

#[test]
fn gravity_points_toward_other_body() {
    let sys = two_body_system(2.0, 1.0, 1.0);
    let p = test_params();
    let forces = gravity_set(&p);

    let mut acc = vec![Default::default(); 2];
    forces.accumulate_accels(sys.t, &sys, &mut acc);

    let dx = sys.bodies[1].x - sys.bodies[0].x;
    let a1 = acc[0];

    assert!(dx.norm() > 0.0);
    assert!(a1.dot(&dx) > 0.0, "Acceleration is not toward second body");
}

#[test]
fn gravity_inverse_square_law() {
    let sys_r = two_body_system(1.0, 1.0, 1.0);
    let sys_2r = two_body_system(2.0, 1.0, 1.0);
    let p = test_params();
    let forces = gravity_set(&p);

    let mut acc_r = vec![Default::default(); 2];
    let mut acc_2r = vec![Default::default(); 2];

    forces.accumulate_accels(sys_r.t, &sys_r, &mut acc_r);
    forces.accumulate_accels(sys_2r.t, &sys_2r, &mut acc_2r);

    let ratio = acc_r[0].norm() / acc_2r[0].norm();

    assert!((ratio - 4.0).abs() < 1e-3, "Expected ~4x, got {}", ratio);
}

#[test]
fn gravity_softening_prevents_blowup() {
    let mut p = test_params();
    p.eps2 = 0.1;

    let sys = two_body_system(1e-9, 1.0, 1.0);
    let forces = gravity_set(&p);

    let mut acc = vec![Default::default(); 2];
    forces.accumulate_accels(sys.t, &sys, &mut acc);

    assert!(acc[0].norm() < 1e9, "Softening failed; acceleration too large");
}

#[test]
fn accel_set_sums_terms_and_overwrites_buffer() {
    let sys = two_body_system(1.0, 1.0, 1.0);
    let p = test_params();

    let gravity_only = direct_accels(&sys, 0.0);
    let forces = gravity_set(&p).with(ExternalPotential { potential: galaxy() });

    // stale data in the buffer must not leak into the result
    let mut acc = vec![NVec3::repeat(1e6); 2];
    forces.accumulate_accels(sys.t, &sys, &mut acc);

    for (i, b) in sys.bodies.iter().enumerate() {
        let expected = gravity_only[i] + galaxy().acceleration(&b.x);
        assert!((acc[i] - expected).norm() < 1e-9 * expected.norm());
    }
}

// ==================================================================================
// Barnes-Hut tests
// ==================================================================================

#[test]
fn bh_theta_zero_matches_direct_sum() {
    let sys = plummer_system(300, 7);
    let eps2 = 1e-6;

    let exact = direct_accels(&sys, eps2);
    let tree = tree_accels(&sys, 0.0, true, eps2);

    let err = relative_rms_error(&exact, &tree);
    assert!(err < 1e-10, "theta = 0 should open every cell, rms error {err}");
}

#[test]
fn bh_error_shrinks_with_theta() {
    let sys = plummer_system(1000, 11);
    let eps2 = 1e-6;
    let exact = direct_accels(&sys, eps2);

    let coarse = relative_rms_error(&exact, &tree_accels(&sys, 1.0, true, eps2));
    let fine = relative_rms_error(&exact, &tree_accels(&sys, 0.3, true, eps2));

    assert!(fine < coarse, "theta 0.3 error {fine} not below theta 1.0 error {coarse}");
    assert!(fine < 1e-3, "theta 0.3 rms error too large: {fine}");
    assert!(coarse < 5e-2, "theta 1.0 rms error too large: {coarse}");
}

#[test]
fn bh_quadrupole_improves_accuracy() {
    // cigar-shaped cluster: cells carry a strong quadrupole along x
    let mut sys = plummer_system(1000, 3);
    for b in sys.bodies.iter_mut() {
        b.x.x *= 3.0;
    }
    let eps2 = 1e-6;
    let exact = direct_accels(&sys, eps2);

    let mono = relative_rms_error(&exact, &tree_accels(&sys, 0.7, false, eps2));
    let quad = relative_rms_error(&exact, &tree_accels(&sys, 0.7, true, eps2));

    assert!(quad < mono, "quadrupole error {quad} not below monopole error {mono}");
}

#[test]
fn bh_quadrupole_far_field_of_a_pair() {
    // two unit masses at x = +-0.5, probed far away on the x axis
    let sys = two_body_system(1.0, 1.0, 1.0);
    let tree = BarnesHutTree::build(&sys, &Engine::default());
    let probe = NVec3::new(10.0, 0.0, 0.0);

    let exact = -(1.0 / (9.5f64 * 9.5) + 1.0 / (10.5f64 * 10.5));
    let mono = tree.acceleration_at(&probe, &sys, &walk(1.0, false, 0.0));
    let quad = tree.acceleration_at(&probe, &sys, &walk(1.0, true, 0.0));

    // the root cell is accepted, so the monopole is exactly 2 / 10^2
    assert!((mono.x + 0.02).abs() < 1e-12, "monopole {:?}", mono);
    assert!((quad.x - exact).abs() < 1e-6, "quadrupole {} vs exact {}", quad.x, exact);
    assert!(quad.y.abs() < 1e-15 && quad.z.abs() < 1e-15);
}

#[test]
fn bh_root_aggregates_mass_and_com() {
    let sys = plummer_system(500, 5);
    let tree = BarnesHutTree::build(&sys, &Engine::default());
    let root = &tree.nodes[tree.root];

    assert!((root.mass - sys.total_mass()).abs() < 1e-9);
    assert!((root.com - sys.center_of_mass()).norm() < 1e-9);

    // sum m (3 d d^T - d^2 I) is traceless
    let scale = root.quad.amax();
    assert!(root.quad.trace().abs() < 1e-9 * scale.max(1.0));

    // every body lands in exactly one leaf
    let stats = tree.stats();
    assert_eq!(stats.bodies, 500);
    assert!(stats.leaves > 0 && stats.nodes >= stats.leaves);
}

#[test]
fn bh_root_cube_encloses_all_bodies() {
    let sys = plummer_system(200, 9);
    let tree = BarnesHutTree::build(&sys, &Engine::default());
    let root = &tree.nodes[tree.root];

    let extent = root.bbox_max - root.bbox_min;
    assert!((extent.x - root.size()).abs() < 1e-12);
    assert!((extent.y - root.size()).abs() < 1e-12);
    assert!((extent.z - root.size()).abs() < 1e-12);
    assert!(sys.bodies.iter().all(|b| root.contains(&b.x)));
}

#[test]
fn bh_coincident_bodies_terminate() {
    let bodies = (0..10)
        .map(|_| Body { x: NVec3::new(1.0, 2.0, 3.0), v: NVec3::zeros(), m: 1.0, component: 0 })
        .collect();
    let sys = System::new(bodies);

    let engine = Engine { max_depth: 12, ..Engine::default() };
    let tree = BarnesHutTree::build(&sys, &engine);
    let stats = tree.stats();

    assert_eq!(stats.bodies, 10);
    assert!(stats.depth <= 12);

    // softened self-interaction of coincident bodies is zero, not NaN
    let acc = tree_accels(&sys, 0.5, true, 1e-4);
    assert!(acc.iter().all(|a| a.iter().all(|c| c.is_finite())));
    assert!(acc.iter().all(|a| a.norm() < 1e-12));
}

#[test]
fn bh_leaf_capacity_keeps_accuracy() {
    let sys = plummer_system(400, 13);
    let eps2 = 1e-6;
    let exact = direct_accels(&sys, eps2);

    let term = NewtonianGravityBarnesHut {
        g: 1.0,
        eps2,
        engine: Engine { theta: 0.5, leaf_capacity: 8, ..Engine::default() },
    };
    let mut out = vec![NVec3::zeros(); sys.len()];
    term.acceleration(0.0, &sys, &mut out);

    let stats = BarnesHutTree::build(&sys, &term.engine).stats();
    assert_eq!(stats.bodies, 400);
    assert!(relative_rms_error(&exact, &out) < 1e-2);
}

#[test]
fn bh_body_inside_cell_opens_it() {
    // a huge theta would accept the root from its own COM, but the body is inside
    let sys = two_body_system(1.0, 1.0, 1.0);
    let tree = BarnesHutTree::build(&sys, &Engine::default());

    let a = tree.force_on_body(0, &sys, &walk(100.0, true, 0.0));
    assert!((a.x - 1.0).abs() < 1e-12, "expected the exact pull of the partner, got {:?}", a);
}

// ==================================================================================
// Potential tests
// ==================================================================================

fn all_potentials() -> Vec<Potential> {
    vec![
        galaxy(),
        Potential {
            disk: Disk::MiyamotoNagai { mass: 100000.0, scale_length: 6.5, scale_height: 0.26 },
            sphere: Spherical::Hernquist { mass: 34000.0, scale: 0.7 },
            halo: Halo::Logarithmic { vhalo: 73.0, scale_length: 12.0, flatten_z: 0.9 },
        },
        Potential {
            disk: Disk::MiyamotoNagai { mass: 100000.0, scale_length: 6.5, scale_height: 0.26 },
            sphere: Spherical::Hernquist { mass: 34000.0, scale: 0.7 },
            halo: Halo::triaxial(116.0, 16.0, 1.38, 1.0, 1.36, 97.0),
        },
    ]
}

#[test]
fn potential_finite_at_origin() {
    for pot in all_potentials() {
        let a = pot.acceleration(&NVec3::zeros());
        let phi = pot.potential(&NVec3::zeros());
        assert!(a.iter().all(|c| c.is_finite()), "{:?}: acceleration {:?}", pot, a);
        assert!(phi.is_finite(), "{:?}: potential {}", pot, phi);
    }
}

#[test]
fn potential_pulls_inward() {
    let points = [NVec3::new(8.0, 0.0, 0.5), NVec3::new(-20.0, 15.0, 30.0), NVec3::new(0.1, -0.2, 0.05)];
    for pot in all_potentials() {
        for p in &points {
            let a = pot.acceleration(p);
            assert!(a.dot(p) < 0.0, "{:?}: acceleration at {:?} points outward", pot, p);
        }
    }
}

#[test]
fn potential_gradient_matches_acceleration() {
    let h = 1e-4;
    let points = [NVec3::new(8.0, 1.0, 0.5), NVec3::new(-30.0, 12.0, 25.0), NVec3::new(0.5, -0.4, 0.3)];

    for pot in all_potentials() {
        for p in &points {
            let grad = NVec3::from_fn(|k, _| {
                let mut hi = *p;
                let mut lo = *p;
                hi[k] += h;
                lo[k] -= h;
                (pot.potential(&hi) - pot.potential(&lo)) / (2.0 * h)
            });
            let a = pot.acceleration(p);
            let rel = (a + grad).norm() / a.norm();
            assert!(rel < 1e-5, "{:?}: -grad Phi differs from acceleration at {:?} by {rel}", pot, p);
        }
    }
}

#[test]
fn potential_rejects_non_positive_parameters() {
    let mut pot = galaxy();
    pot.halo = Halo::Nfw { vhalo: 0.0, scale_length: 22.25 };
    assert!(matches!(pot.validate(), Err(SimError::Configuration(_))));

    let mut pot = galaxy();
    pot.disk = Disk::Exponential { mass: 224933.0, scale_length: f64::NAN };
    assert!(matches!(pot.validate(), Err(SimError::Configuration(_))));

    assert!(galaxy().validate().is_ok());
}

// ==================================================================================
// Coordinate tests
// ==================================================================================

#[test]
fn lbr_conversion_places_sun_on_negative_x() {
    // looking toward the galactic center from the Sun at 8 kpc
    let gc = lbr_to_cartesian(&NVec3::new(0.0, 0.0, 8.0), 8.0);
    assert!(gc.norm() < 1e-12);

    let side = lbr_to_cartesian(&NVec3::new(90f64.to_radians(), 0.0, 1.0), 8.0);
    assert!((side - NVec3::new(-8.0, 1.0, 0.0)).norm() < 1e-12);

    let pole = lbr_to_cartesian(&NVec3::new(0.0, 90f64.to_radians(), 2.0), 8.0);
    assert!((pole - NVec3::new(-8.0, 0.0, 2.0)).norm() < 1e-12);
}

#[test]
fn lbr_conversion_inverts() {
    let lbr = NVec3::new(218f64.to_radians() - std::f64::consts::TAU, 53.5f64.to_radians(), 28.5);
    let back = cartesian_to_lbr(&lbr_to_cartesian(&lbr, 8.0), 8.0);
    assert!((back - lbr).norm() < 1e-10, "{:?} vs {:?}", back, lbr);
}

#[test]
fn resolve_center_converts_degrees_only_when_heliocentric() {
    let (pos, vel) = resolve_center([218.0, 53.5, 28.5], [-157.0, 78.0, 107.0], false, false, 8.0);
    let expected = lbr_to_cartesian(&NVec3::new(218f64.to_radians(), 53.5f64.to_radians(), 28.5), 8.0);
    assert!((pos - expected).norm() < 1e-12);
    assert_eq!(vel, NVec3::new(-157.0, 78.0, 107.0));

    let (pos, _) = resolve_center([1.0, 2.0, 3.0], [0.0; 3], true, false, 8.0);
    assert_eq!(pos, NVec3::new(1.0, 2.0, 3.0));
}

#[test]
fn identity_stream_frame_is_galactic() {
    let frame = StreamFrame::new(0.0, 0.0, 0.0);
    let (lambda, beta) = frame.lambda_beta(30f64.to_radians(), 10f64.to_radians());
    assert!((lambda - 30.0).abs() < 1e-10);
    assert!((beta - 10.0).abs() < 1e-10);
}

// ==================================================================================
// Initial condition tests
// ==================================================================================

#[test]
fn plummer_sampling_is_reproducible() {
    let a = plummer_system(200, 99);
    let b = plummer_system(200, 99);
    let c = plummer_system(200, 100);

    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn plummer_sample_matches_component() {
    let mut component = plummer_component(250, false);
    component.position = NVec3::new(3.0, -4.0, 5.0);
    component.velocity = NVec3::new(-100.0, 20.0, 7.0);

    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let sys = System::new(generate_bodies(&[component.clone()], &mut rng));

    assert_eq!(sys.len(), 250);
    assert!((sys.total_mass() - 16.0).abs() < 1e-12);
    assert!((sys.center_of_mass() - component.position).norm() < 1e-9);
    assert!((sys.center_of_mass_velocity() - component.velocity).norm() < 1e-9);
    assert!(sys.bodies.iter().all(|b| (b.m - 16.0 / 250.0).abs() < 1e-15));
}

#[test]
fn cold_sample_moves_with_center() {
    let mut component = plummer_component(100, true);
    component.velocity = NVec3::new(1.0, 2.0, 3.0);

    let mut rng = ChaCha8Rng::seed_from_u64(4);
    let bodies = generate_bodies(&[component], &mut rng);

    assert!(bodies.iter().all(|b| (b.v - NVec3::new(1.0, 2.0, 3.0)).norm() < 1e-12));
}

#[test]
fn components_are_concatenated_in_order() {
    let first = plummer_component(30, false);
    let mut second = plummer_component(20, false);
    second.mass = 4.0;
    second.position = NVec3::new(10.0, 0.0, 0.0);

    let mut rng = ChaCha8Rng::seed_from_u64(8);
    let bodies = generate_bodies(&[first, second], &mut rng);

    assert_eq!(bodies.len(), 50);
    assert!(bodies[..30].iter().all(|b| b.component == 0));
    assert!(bodies[30..].iter().all(|b| b.component == 1 && (b.m - 0.2).abs() < 1e-15));
}

#[test]
fn derived_softening_and_timestep() {
    let component = plummer_component(1000, false);
    let eps = 0.2 / (10.0 * 1000f64.sqrt());
    let dt = 0.01 * (4.0 / 3.0 * std::f64::consts::PI * 0.008 / 16.0f64).sqrt();

    assert!((component.softening() - eps).abs() < 1e-15);
    assert!((component.timestep() - dt).abs() < 1e-15);
}

// ==================================================================================
// Integrator tests
// ==================================================================================

/// Term that turns every acceleration to NaN once `t` passes `t_fail`
struct FailAfter {
    t_fail: f64,
}

impl Acceleration for FailAfter {
    fn acceleration(&self, t: f64, _sys: &System, out: &mut [NVec3]) {
        if t > self.t_fail {
            for a in out.iter_mut() {
                *a = NVec3::repeat(f64::NAN);
            }
        }
    }
}

#[test]
fn leapfrog_conserves_two_body_energy() {
    // equal masses on a circular orbit, relative speed sqrt(2 G m / d)
    let mut sys = two_body_system(1.0, 1.0, 1.0);
    sys.bodies[0].v = NVec3::new(0.0, -0.5 * 2f64.sqrt(), 0.0);
    sys.bodies[1].v = NVec3::new(0.0, 0.5 * 2f64.sqrt(), 0.0);

    let p = test_params();
    let forces = gravity_set(&p);
    let e0 = total_energy(&sys, p.g);

    let mut integrator = Leapfrog::new(&sys, &forces, p.h0, "test").unwrap();
    integrator.run(&mut sys, &forces, 2000).unwrap();

    let e1 = total_energy(&sys, p.g);
    assert!(((e1 - e0) / e0).abs() < 1e-5, "energy drift {e0} -> {e1}");
    assert_eq!(integrator.steps_taken(), 2000);
    assert!((sys.t - 2.0).abs() < 1e-9);

    let separation = (sys.bodies[1].x - sys.bodies[0].x).norm();
    assert!((separation - 1.0).abs() < 1e-3, "orbit not circular: {separation}");
}

#[test]
fn leapfrog_conserves_mass_and_momentum() {
    let mut sys = plummer_system(100, 21);
    let mass0 = sys.total_mass();
    let forces = AccelSet::new().with(NewtonianGravity { g: 1.0, eps2: 1e-4 });

    let p0: NVec3 = sys.bodies.iter().map(|b| b.v * b.m).sum();

    let mut integrator = Leapfrog::new(&sys, &forces, 1e-4, "test").unwrap();
    integrator.run(&mut sys, &forces, 50).unwrap();

    let p1: NVec3 = sys.bodies.iter().map(|b| b.v * b.m).sum();
    assert_eq!(sys.total_mass(), mass0);
    assert!((p1 - p0).norm() < 1e-9, "momentum drift {:?}", p1 - p0);
}

#[test]
fn leapfrog_failed_step_leaves_state_untouched() {
    let mut sys = two_body_system(1.0, 1.0, 1.0);
    sys.bodies[0].v = NVec3::new(0.0, 0.1, 0.0);
    let forces = AccelSet::new().with(NewtonianGravity { g: 1.0, eps2: 0.01 }).with(FailAfter { t_fail: 0.55 });

    let mut integrator = Leapfrog::new(&sys, &forces, 0.1, "test").unwrap();
    integrator.run(&mut sys, &forces, 5).unwrap();
    let before = sys.clone();

    let err = integrator.step(&mut sys, &forces).unwrap_err();
    match err {
        SimError::NumericalInstability { phase, step, body, quantity, .. } => {
            assert_eq!(phase, "test");
            assert_eq!(step, 6);
            assert_eq!(body, 0);
            assert_eq!(quantity, "acceleration");
        }
        other => panic!("unexpected error {other:?}"),
    }

    assert_eq!(sys, before);
    assert_eq!(integrator.steps_taken(), 5);
}

#[test]
fn leapfrog_rejects_non_finite_initial_accelerations() {
    // coincident unsoftened bodies give 0 * inf
    let sys = two_body_system(0.0, 1.0, 1.0);
    let p = test_params();

    let result = Leapfrog::new(&sys, &gravity_set(&p), p.h0, "start");
    assert!(matches!(result, Err(SimError::NumericalInstability { step: 0, .. })));
}

#[test]
fn reverse_orbit_retraces_forward_orbit() {
    let potential = galaxy();
    let x0 = NVec3::new(-20.0, 5.0, 25.0);
    let v0 = NVec3::new(-157.0, 78.0, 107.0);
    let dt = 1e-4;
    let steps = 2000;

    let mut tracer = System::new(vec![Body { x: x0, v: v0, m: 0.0, component: 0 }]);
    let forces = AccelSet::new().with(ExternalPotential { potential: potential.clone() });
    let mut integrator = Leapfrog::new(&tracer, &forces, dt, "forward").unwrap();
    integrator.run(&mut tracer, &forces, steps).unwrap();

    let moved = tracer.bodies[0].x;
    assert!((moved - x0).norm() > 1.0);

    let (x, v) = reverse_orbit(&potential, moved, tracer.bodies[0].v, dt, steps).unwrap();
    assert!((x - x0).norm() < 1e-8, "position {:?} vs {:?}", x, x0);
    assert!((v - v0).norm() < 1e-8, "velocity {:?} vs {:?}", v, v0);
}

#[test]
fn step_count_covers_duration() {
    assert_eq!(Parameters::step_count(1.0, 0.1), 10);
    assert_eq!(Parameters::step_count(1.05, 0.1), 11);
    assert_eq!(Parameters::step_count(0.0, 0.1), 0);

    let mut p = test_params();
    p.t_evolve = 3.945;
    p.h0 = 0.001;
    assert_eq!(p.evolve_steps(), 3945);
}

// ==================================================================================
// Histogram tests
// ==================================================================================

fn galactic_histogram() -> HistogramSettings {
    HistogramSettings::from_config(&HistogramConfig { phi: 0.0, theta: 0.0, psi: 0.0, ..HistogramConfig::default() }).unwrap()
}

/// Body seen from the Sun at galactic longitude `l` degrees in the plane
fn body_at_longitude(l: f64, m: f64) -> Body {
    let x = lbr_to_cartesian(&NVec3::new(l.to_radians(), 0.0, 5.0), 8.0);
    Body { x, v: NVec3::zeros(), m, component: 0 }
}

#[test]
fn default_histogram_has_34_bins() {
    let settings = HistogramSettings::from_config(&HistogramConfig::default()).unwrap();
    assert_eq!(settings.bin_count(), 34);

    assert_eq!(settings.bin_index(-50.0), Some(0));
    assert_eq!(settings.bin_index(-47.5), Some(0));
    assert_eq!(settings.bin_index(-47.0), Some(1));
    assert_eq!(settings.bin_index(50.0), Some(33));
    assert_eq!(settings.bin_index(50.1), None);
    assert_eq!(settings.bin_index(-50.1), None);
    assert_eq!(settings.bin_index(f64::NAN), None);
}

#[test]
fn histogram_counts_and_weights_bodies() {
    let settings = galactic_histogram();
    let sys = System::new(vec![
        body_at_longitude(10.0, 1.0),
        body_at_longitude(11.0, 2.0),
        body_at_longitude(-30.5, 3.0),
        body_at_longitude(120.0, 4.0),
    ]);

    let hist = Histogram::from_system(&sys, &settings, 8.0);
    assert_eq!(hist.bins.len(), 34);
    assert_eq!(hist.total_count(), 3);
    assert_eq!(hist.out_of_range, 1);

    // (10 + 50) / 3 = 20, (-30.5 + 50) / 3 = 6.5
    assert_eq!(hist.bins[20].count, 2);
    assert!((hist.bins[20].mass - 3.0).abs() < 1e-12);
    assert_eq!(hist.bins[6].count, 1);
    assert!((hist.total_mass() - 6.0).abs() < 1e-12);

    let last = hist.bins.last().unwrap();
    assert!((last.lambda_hi - 50.0).abs() < 1e-12);
}

#[test]
fn histogram_normalization_sums_to_one() {
    let settings = galactic_histogram();
    let sys = System::new((0..40).map(|k| body_at_longitude(-40.0 + 2.0 * k as f64, 1.0 + k as f64)).collect());
    let hist = Histogram::from_system(&sys, &settings, 8.0);

    let total: f64 = hist.normalized().iter().map(|(_, f, _)| f).sum();
    assert!((total - 1.0).abs() < 1e-12);

    for ((_, fraction, error), bin) in hist.normalized().iter().zip(hist.bins.iter()) {
        if bin.count > 0 {
            assert!((error - fraction / (bin.count as f64).sqrt()).abs() < 1e-15);
        } else {
            assert_eq!(*fraction, 0.0);
        }
    }

    let mut weighted = settings.clone();
    weighted.weighted = true;
    let hist = Histogram::from_system(&sys, &weighted, 8.0);
    let total: f64 = hist.normalized().iter().map(|(_, f, _)| f).sum();
    assert!((total - 1.0).abs() < 1e-12);
}

#[test]
fn empty_histogram_normalizes_to_zero() {
    let hist = Histogram::from_system(&System::default(), &galactic_histogram(), 8.0);
    assert_eq!(hist.total_count(), 0);
    assert!(hist.normalized().iter().all(|(_, f, e)| *f == 0.0 && *e == 0.0));
}

#[test]
fn histogram_rejects_bad_ranges() {
    let cfg = HistogramConfig { lambda_end: -60.0, ..HistogramConfig::default() };
    assert!(matches!(HistogramSettings::from_config(&cfg), Err(SimError::Configuration(_))));

    let cfg = HistogramConfig { bin_size: 0.0, ..HistogramConfig::default() };
    assert!(matches!(HistogramSettings::from_config(&cfg), Err(SimError::Configuration(_))));
}

#[test]
fn histogram_rejects_unbounded_bin_counts() {
    // positive but far too small: would need more than usize::MAX bins
    let cfg = HistogramConfig { bin_size: 1e-300, ..HistogramConfig::default() };
    assert!(matches!(HistogramSettings::from_config(&cfg), Err(SimError::Configuration(_))));

    let cfg = HistogramConfig { bin_size: 100.0 / (MAX_BINS as f64 * 2.0), ..HistogramConfig::default() };
    assert!(matches!(HistogramSettings::from_config(&cfg), Err(SimError::Configuration(_))));

    // a fine but bounded scheme still builds and bins
    let cfg = HistogramConfig { bin_size: 1e-3, ..HistogramConfig::default() };
    let settings = HistogramSettings::from_config(&cfg).unwrap();
    assert!((settings.bin_count() as i64 - 100_000).abs() <= 1);

    let hist = Histogram::from_system(&System::new(vec![body_at_longitude(10.0, 1.0)]), &settings, 8.0);
    assert_eq!(hist.bins.len(), settings.bin_count());
    assert_eq!(hist.total_count(), 1);
}

#[test]
fn histogram_single_bin_when_span_below_bin_size() {
    let cfg = HistogramConfig { lambda_start: 0.0, lambda_end: 1.0, bin_size: 5.0, ..HistogramConfig::default() };
    let settings = HistogramSettings::from_config(&cfg).unwrap();
    assert_eq!(settings.bin_count(), 1);
    assert_eq!(settings.bin_index(1.0), Some(0));
}
