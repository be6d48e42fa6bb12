// Electron swarm drifting through a uniform field with attachment losses.
//
// A few thousand electrons start at the left end of a centimetre gap and
// are pulled right by a constant acceleration while an attaching background
// eats the swarm. Run with `cargo run --example drift_tube`.

use nalgebra::Vector3;

use pic_mcc::constants::{EV_TO_J, E_MASS};
use pic_mcc::{
    isotropic, CollChannel, Collision, CollisionKind, CrossSection, Engine, EventKind, EventLog,
    EngineRng, Particle,
};

fn main() {
    println!(">> drift_tube: starting");

    let channels = vec![
        CollChannel {
            coll: Collision::new(CollisionKind::Elastic, 0.0, E_MASS, 1.4e-5),
            sigma: CrossSection::constant(5e-20, 200.0),
            is_event: false,
        },
        CollChannel {
            coll: Collision::new(CollisionKind::Attach, 0.0, E_MASS, 1.4e-5),
            sigma: CrossSection::constant(5e-23, 200.0),
            is_event: true,
        },
    ];
    let mut engine = Engine::initialize(E_MASS, channels, 1024, 200.0, 1e22, 100_000, 2024);

    // constant pull along x, domain exit at the far electrode
    engine.set_accel(|_| Vector3::new(5e13, 0.0, 0.0));
    engine.set_outside_check(|p| i32::from(p.x.x > 0.01));

    let mut seeder = EngineRng::new(7);
    let v0 = (2.0 * 1.0 * EV_TO_J / E_MASS).sqrt();
    for _ in 0..5000 {
        engine.add_part(Particle::new(
            Vector3::new(1e-4 * seeder.random(), 0.0, 0.0),
            isotropic(v0, &mut seeder),
            Vector3::new(5e13, 0.0, 0.0),
            1e6,
        ));
    }

    let mut log = EventLog::new();
    let frame_dt = 2e-8;
    for frame in 1..=10 {
        engine.advance_parallel(frame_dt, &mut log);
        println!(
            "frame {:2}: N_sim = {:6}, N_real = {:.3e}, <E> = {:6.2} eV, events = {}",
            frame,
            engine.n_sim_part(),
            engine.n_real_part(),
            engine.get_mean_energy() / EV_TO_J,
            log.n_stored(),
        );
    }

    let attached = log
        .iter()
        .filter(|e| e.kind == EventKind::Collision(CollisionKind::Attach))
        .count();
    let went_out = log
        .iter()
        .filter(|e| matches!(e.kind, EventKind::WentOut(_)))
        .count();
    println!(">> drift_tube: {} attachments, {} reached the electrode", attached, went_out);

    // energy histogram of the survivors
    let centers: Vec<f64> = (0..20).map(|i| (i as f64 + 0.5) * 10.0).collect();
    let spectrum = engine.histogram(
        |p| p.kinetic_energy(E_MASS) / EV_TO_J,
        None,
        &centers,
    );
    println!(">> energy spectrum (10 eV bins): {:?}", spectrum);
}
