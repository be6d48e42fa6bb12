// Statistical and numerical contracts of the collision machinery.

use approx::assert_relative_eq;
use nalgebra::Vector3;

use pic_mcc::constants::{EV_TO_J, E_MASS};
use pic_mcc::{
    isotropic, CollChannel, Collision, CollisionKind, CrossSection, Engine, EventLog, EngineRng,
    Particle,
};

#[test]
fn isotropic_scatter_has_unbiased_components_and_exact_speed() {
    let mut rng = EngineRng::new(424242);
    let n = 1_000_000usize;
    let mut mean = Vector3::zeros();
    for _ in 0..n {
        let v = isotropic(1.0, &mut rng);
        assert!((v.norm() - 1.0).abs() < 1e-12);
        mean += v;
    }
    mean /= n as f64;
    // per-component deviation: sigma = sqrt(1/3), allow 5 sigma / sqrt(N)
    let bound = 5.0 * (1.0f64 / 3.0).sqrt() / (n as f64).sqrt();
    for axis in 0..3 {
        assert!(
            mean[axis].abs() < bound,
            "axis {} mean {} exceeds {}",
            axis,
            mean[axis],
            bound
        );
    }
}

#[test]
fn null_collision_rate_converges_to_sigma_v_n() {
    // a loss-free excitation keeps the speed exactly constant, so the
    // measured event rate must converge to sigma * v * n_bg
    let sigma = 1e-20;
    let n_bg = 1e21;
    let channel = CollChannel {
        coll: Collision::new(CollisionKind::Excite, 0.0, E_MASS, 1e-4),
        sigma: CrossSection::constant(sigma, 100.0),
        is_event: true,
    };
    let mut engine = Engine::initialize(E_MASS, vec![channel], 512, 100.0, n_bg, 256, 99);
    engine.set_accel(|_| Vector3::zeros());

    let energy_ev = 10.0;
    let v0 = (2.0 * energy_ev * EV_TO_J / E_MASS).sqrt();
    let n_parts = 100usize;
    let mut seeder = EngineRng::new(5);
    for _ in 0..n_parts {
        engine.add_part(Particle::new(
            Vector3::zeros(),
            isotropic(v0, &mut seeder),
            Vector3::zeros(),
            1.0,
        ));
    }

    let nu = sigma * v0 * n_bg;
    let expected = 10_000.0;
    let dt = expected / (n_parts as f64 * nu);
    let mut log = EventLog::new();
    engine.advance(dt, &mut log);

    assert_eq!(engine.n_sim_part(), n_parts, "loss-free excitation keeps the count");
    for p in engine.particles() {
        assert_relative_eq!(p.speed(), v0, max_relative = 1e-12);
    }
    let measured = log.n_stored() as f64;
    let tolerance = 5.0 * expected.sqrt();
    assert!(
        (measured - expected).abs() < tolerance,
        "measured {} events, expected {} +- {}",
        measured,
        expected,
        tolerance
    );
}

#[test]
fn verlet_advance_is_time_reversible_without_forces() {
    let channel = CollChannel {
        coll: Collision::new(CollisionKind::Attach, 0.0, E_MASS, 1e-4),
        sigma: CrossSection::constant(0.0, 100.0),
        is_event: false,
    };
    let mut engine = Engine::initialize(E_MASS, vec![channel], 64, 100.0, 1e20, 16, 1);
    engine.set_accel(|_| Vector3::zeros());

    let mut seeder = EngineRng::new(8);
    let mut initial = Vec::new();
    for _ in 0..10 {
        let p = Particle::new(
            Vector3::new(seeder.random(), seeder.random(), seeder.random()),
            isotropic(1.0 + seeder.random(), &mut seeder),
            Vector3::zeros(),
            1.0,
        );
        initial.push(p);
        engine.add_part(p);
    }

    let mut log = EventLog::new();
    let steps = 10;
    for _ in 0..steps {
        engine.advance(0.1, &mut log);
    }
    // flip velocities and fly back
    let flipped: Vec<Particle> = engine
        .particles()
        .iter()
        .map(|p| {
            let mut q = *p;
            q.v = -q.v;
            q
        })
        .collect();
    let mut engine2 = Engine::initialize(
        E_MASS,
        vec![CollChannel {
            coll: Collision::new(CollisionKind::Attach, 0.0, E_MASS, 1e-4),
            sigma: CrossSection::constant(0.0, 100.0),
            is_event: false,
        }],
        64,
        100.0,
        1e20,
        16,
        1,
    );
    engine2.set_accel(|_| Vector3::zeros());
    for p in flipped {
        engine2.add_part(p);
    }
    for _ in 0..steps {
        engine2.advance(0.1, &mut log);
    }

    for (p, p0) in engine2.particles().iter().zip(initial.iter()) {
        for axis in 0..3 {
            assert_relative_eq!(p.x[axis], p0.x[axis], max_relative = 1e-12, epsilon = 1e-12);
            assert_relative_eq!(-p.v[axis], p0.v[axis], max_relative = 1e-12, epsilon = 1e-12);
        }
    }
}

#[test]
fn collision_kinds_conserve_simulation_charge() {
    // elastic and excitation keep the count, ionization adds one,
    // attachment removes one
    let run = |kind: CollisionKind, en_loss_ev: f64| -> usize {
        let channel = CollChannel {
            coll: Collision::new(kind, en_loss_ev * EV_TO_J, E_MASS, 1e-4),
            sigma: CrossSection::constant(1e-19, 100.0),
            is_event: false,
        };
        let mut engine = Engine::initialize(E_MASS, vec![channel], 256, 100.0, 1e21, 1024, 77);
        engine.set_accel(|_| Vector3::zeros());
        let v0 = (2.0 * 50.0 * EV_TO_J / E_MASS).sqrt();
        engine.add_part(Particle::new(
            Vector3::zeros(),
            Vector3::new(v0, 0.0, 0.0),
            Vector3::zeros(),
            1.0,
        ));
        let rate = 1e-19 * v0 * 1e21;
        let mut log = EventLog::new();
        // about ten collisions expected
        engine.advance(10.0 / rate, &mut log);
        engine.n_sim_part()
    };

    assert_eq!(run(CollisionKind::Elastic, 0.0), 1);
    assert_eq!(run(CollisionKind::Excite, 1.0), 1);
    assert!(run(CollisionKind::Ionize, 1.0) > 1);
    assert_eq!(run(CollisionKind::Attach, 0.0), 0);
}
