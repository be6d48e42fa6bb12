// Work-shared advance: fork-join data parallelism per substep.

use std::sync::Mutex;

use crate::constants::ADVANCE_BUF_SIZE;
use crate::engine::Engine;
use crate::events::{Event, EventLog};
use crate::particle::Particle;
use crate::rng::{EngineRng, RngPool};
use crate::step::{Advanced, StepCtx};

/// Shared handle on the particle array for one work-shared round.
///
/// Soundness rests on disjoint writes: a worker touches only the slots of
/// its own chunk of `[n_lo, n_hi)` plus slot ranges it reserved under the
/// bookkeeping lock, and reserved ranges start at or above `n_hi`.
struct SharedParts {
    ptr: *mut Particle,
    cap: usize,
}

unsafe impl Send for SharedParts {}
unsafe impl Sync for SharedParts {}

/// State mutated only inside the critical section: the live count for slot
/// reservation, the clean list, and the event log.
struct Bookkeeping<'a> {
    n_part: usize,
    clean: &'a mut Vec<usize>,
    log: &'a mut EventLog,
}

impl Engine {
    /// Work-shared `advance` with identical per-substep semantics.
    ///
    /// The inner particle loop is statically chunked over the rayon pool:
    /// chunk `t` always belongs to worker `t` and collides with worker `t`'s
    /// generator stream, so a run is bit-reproducible for a fixed worker
    /// count (up to event ordering across threads). Worker 0's generator
    /// state is committed back afterwards, advancing the engine's seed
    /// sequence across calls.
    pub fn advance_parallel(&mut self, dt: f64, log: &mut EventLog) {
        self.check_advance_config(dt);
        let n_threads = rayon::current_num_threads().max(1);
        let (n_steps, dt_step) = self.limit_advance_dt(dt);
        let mut pool = RngPool::init_parallel(n_threads, &mut self.rng);

        for _ in 0..n_steps {
            for p in self.parts[..self.n_part].iter_mut() {
                if p.is_alive() {
                    p.t_left = dt_step;
                }
            }

            // Births reserved past n_hi extend the range; repeat until the
            // population stops growing.
            let mut n_lo = 0usize;
            loop {
                let n_hi = self.n_part;
                if n_lo >= n_hi {
                    break;
                }
                self.advance_range_shared(n_lo, n_hi, &mut pool, log);
                n_lo = n_hi;
            }

            self.after_mover(dt_step);
            self.clean_up();
        }
        pool.commit(&mut self.rng);
    }

    /// One work-shared round over `[n_lo, n_hi)`.
    fn advance_range_shared(
        &mut self,
        n_lo: usize,
        n_hi: usize,
        pool: &mut RngPool,
        log: &mut EventLog,
    ) {
        let Engine {
            parts,
            n_part,
            clean,
            colls,
            coll_is_event,
            table,
            mover,
            dt_max,
            qm,
            bfield,
            accel,
            outside,
            ..
        } = self;

        let shared = SharedParts {
            ptr: parts.as_mut_ptr(),
            cap: parts.len(),
        };
        let ctrl = Mutex::new(Bookkeeping {
            n_part: *n_part,
            clean,
            log,
        });
        let ctx = StepCtx {
            table,
            colls,
            coll_is_event,
            mover: *mover,
            dt_max: *dt_max,
            qm: *qm,
            bfield: *bfield,
            accel: accel.as_deref(),
            outside: outside.as_deref(),
        };

        let n_workers = pool.rngs.len();
        let chunk = (n_hi - n_lo).div_ceil(n_workers);
        rayon::scope(|s| {
            for (t, rng) in pool.rngs.iter_mut().enumerate() {
                let lo = n_lo + t * chunk;
                let hi = (lo + chunk).min(n_hi);
                if lo >= hi {
                    continue;
                }
                let shared = &shared;
                let ctrl = &ctrl;
                let ctx = &ctx;
                s.spawn(move |_| worker(ctx, shared, ctrl, lo, hi, rng));
            }
        });

        *n_part = ctrl.into_inner().unwrap().n_part;
    }
}

fn worker(
    ctx: &StepCtx<'_>,
    shared: &SharedParts,
    ctrl: &Mutex<Bookkeeping<'_>>,
    lo: usize,
    hi: usize,
    rng: &mut EngineRng,
) {
    let mut births: Vec<Particle> = Vec::with_capacity(ADVANCE_BUF_SIZE);
    let mut removals: Vec<usize> = Vec::with_capacity(ADVANCE_BUF_SIZE);
    let mut events: Vec<Event> = Vec::with_capacity(ADVANCE_BUF_SIZE);
    let mut scratch = vec![0.0; ctx.colls.len()];

    for n in lo..hi {
        // SAFETY: `n` lies in this worker's chunk; no other worker reads or
        // writes it during the round.
        let mut p = unsafe { shared.ptr.add(n).read() };
        if !p.is_alive() {
            continue;
        }
        let outcome = ctx.move_and_collide(&mut p, rng, &mut births, &mut events, &mut scratch);
        unsafe { shared.ptr.add(n).write(p) };
        if outcome == Advanced::Died {
            removals.push(n);
        }

        if births.len() >= ADVANCE_BUF_SIZE / 2
            || removals.len() >= ADVANCE_BUF_SIZE / 2
            || events.len() >= ADVANCE_BUF_SIZE / 2
        {
            flush(shared, ctrl, &mut births, &mut removals, &mut events);
        }
    }
    flush(shared, ctrl, &mut births, &mut removals, &mut events);
}

/// Drain the private buffers: reserve array and log space under the lock,
/// copy the birth payloads into the reserved slots outside it.
fn flush(
    shared: &SharedParts,
    ctrl: &Mutex<Bookkeeping<'_>>,
    births: &mut Vec<Particle>,
    removals: &mut Vec<usize>,
    events: &mut Vec<Event>,
) {
    if births.is_empty() && removals.is_empty() && events.is_empty() {
        return;
    }
    let start;
    {
        let mut bk = ctrl.lock().unwrap();
        start = bk.n_part;
        let end = start + births.len();
        if end > shared.cap {
            panic!(
                "particle capacity exhausted: need {} slots of {}",
                end, shared.cap
            );
        }
        bk.n_part = end;
        bk.clean.append(removals);
        for e in events.drain(..) {
            bk.log.push(e);
        }
    }
    for (offset, b) in births.drain(..).enumerate() {
        // SAFETY: slots [start, start + len) were reserved above and no
        // other worker will touch them before the end-of-round barrier.
        unsafe { shared.ptr.add(start + offset).write(b) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{Collision, CollisionKind};
    use crate::constants::{EV_TO_J, E_MASS};
    use crate::cross_section::CrossSection;
    use crate::engine::CollChannel;
    use nalgebra::Vector3;

    fn elastic_engine(seed: u64) -> Engine {
        let channel = CollChannel {
            coll: Collision::new(CollisionKind::Elastic, 0.0, E_MASS, 1e-4),
            sigma: CrossSection::constant(1e-20, 100.0),
            is_event: false,
        };
        let mut engine = Engine::initialize(E_MASS, vec![channel], 256, 100.0, 1e21, 4096, seed);
        engine.set_accel(|_| Vector3::zeros());
        let mut seeder = EngineRng::new(seed ^ 0xABCD);
        for i in 0..500 {
            let v0 = (2.0 * 10.0 * EV_TO_J / E_MASS).sqrt();
            let mut p = Particle::new(
                Vector3::new(seeder.random(), seeder.random(), seeder.random()),
                crate::collision::isotropic(v0, &mut seeder),
                Vector3::zeros(),
                1.0,
            );
            p.id = i;
            engine.add_part(p);
        }
        engine
    }

    #[test]
    fn test_parallel_preserves_population_without_births() {
        let mut engine = elastic_engine(11);
        let mut log = EventLog::new();
        let dt = 5.0 * engine.rate_table().inv_max_rate();
        engine.advance_parallel(dt, &mut log);
        assert_eq!(engine.n_sim_part(), 500);
        assert!(engine.particles().iter().all(|p| p.is_alive()));
    }

    #[test]
    fn test_parallel_repeatable_for_fixed_pool() {
        // Elastic-only: no births, so slot assignment never races and two
        // identical runs agree bitwise.
        let run = || {
            let mut engine = elastic_engine(23);
            let mut log = EventLog::new();
            let dt = 5.0 * engine.rate_table().inv_max_rate();
            engine.advance_parallel(dt, &mut log);
            engine.particles().to_vec()
        };
        let a = run();
        let b = run();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parallel_advances_seed_sequence() {
        let mut engine = elastic_engine(31);
        let before = engine.rng.clone();
        let mut log = EventLog::new();
        engine.advance_parallel(engine.rate_table().inv_max_rate(), &mut log);
        assert_ne!(engine.rng, before);
    }

    #[test]
    fn test_parallel_ionization_grows_population() {
        let channel = CollChannel {
            coll: Collision::new(CollisionKind::Ionize, 1.0 * EV_TO_J, E_MASS, 1e-4),
            sigma: CrossSection::constant(1e-20, 100.0),
            is_event: false,
        };
        let mut engine = Engine::initialize(E_MASS, vec![channel], 256, 100.0, 1e21, 100_000, 5);
        engine.set_accel(|_| Vector3::zeros());
        let v0 = (2.0 * 50.0 * EV_TO_J / E_MASS).sqrt();
        for _ in 0..10 {
            engine.add_part(Particle::new(
                Vector3::zeros(),
                Vector3::new(v0, 0.0, 0.0),
                Vector3::zeros(),
                1.0,
            ));
        }
        let mut log = EventLog::new();
        let rate0 = 1e-20 * v0 * 1e21;
        engine.advance_parallel(2.0 / rate0, &mut log);
        assert!(
            engine.n_sim_part() > 10,
            "ionization should add particles, got {}",
            engine.n_sim_part()
        );
        assert!(engine.particles().iter().all(|p| p.is_alive()));
    }
}
