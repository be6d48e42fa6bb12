// The per-particle substep driver and the serial advance loop.

use nalgebra::Vector3;

use crate::collision::{collide, Collision, Scatter};
use crate::constants::ADVANCE_BUF_SIZE;
use crate::engine::{AccelFn, Engine, OutsideFn};
use crate::events::{Event, EventKind, EventLog};
use crate::mover::{boris_step, verlet_step, Mover};
use crate::particle::Particle;
use crate::rate_table::RateTable;
use crate::rng::EngineRng;

/// Outcome of advancing one particle through its remaining substep time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Advanced {
    Alive,
    Died,
}

/// Borrowed view of everything `move_and_collide` needs. The serial and
/// parallel drivers share it; particle storage stays outside so each caller
/// owns the slot it is working on.
pub(crate) struct StepCtx<'a> {
    pub table: &'a RateTable,
    pub colls: &'a [Collision],
    pub coll_is_event: &'a [bool],
    pub mover: Mover,
    pub dt_max: f64,
    pub qm: f64,
    pub bfield: Vector3<f64>,
    pub accel: Option<&'a AccelFn>,
    pub outside: Option<&'a OutsideFn>,
}

impl<'a> StepCtx<'a> {
    fn step(&self, p: &mut Particle, dt: f64) {
        match self.mover {
            Mover::Verlet => verlet_step(p, dt),
            Mover::Boris => boris_step(p, dt, self.qm, self.bfield),
        }
    }

    fn outside_code(&self, p: &Particle) -> i32 {
        match self.outside {
            Some(f) => f(p),
            None => 0,
        }
    }

    /// Advance one particle through its remaining `t_left`, interleaving
    /// ballistic flight with null-collision sampling.
    ///
    /// Candidate collision times come from the exponential envelope; times
    /// past `t_left` end the substep, and a single flight never exceeds
    /// `dt_max`. Secondaries inherit the parent's leftover time and go to
    /// `births`; recorded events go to `events`. `scratch` must hold one
    /// slot per collision channel.
    pub fn move_and_collide(
        &self,
        p: &mut Particle,
        rng: &mut EngineRng,
        births: &mut Vec<Particle>,
        events: &mut Vec<Event>,
        scratch: &mut [f64],
    ) -> Advanced {
        loop {
            let mut tau = self.table.sample_coll_time(rng.random());
            if tau > p.t_left {
                break;
            }
            while tau > self.dt_max {
                self.step(p, self.dt_max);
                tau -= self.dt_max;
            }
            self.step(p, tau);

            let code = self.outside_code(p);
            if code > 0 {
                events.push(Event {
                    part: *p,
                    coll_index: 0,
                    kind: EventKind::WentOut(code),
                });
                p.kill();
                return Advanced::Died;
            }

            if let Some(k) = self.table.coll_index(p.speed(), rng.random(), scratch) {
                if self.coll_is_event[k] {
                    events.push(Event {
                        part: *p,
                        coll_index: k,
                        kind: EventKind::Collision(self.colls[k].kind),
                    });
                }
                match collide(p, &self.colls[k], rng) {
                    Scatter::Absorbed => {
                        p.kill();
                        return Advanced::Died;
                    }
                    Scatter::One(out) => *p = out,
                    Scatter::Two(out, sec) => {
                        *p = out;
                        if births.len() == ADVANCE_BUF_SIZE {
                            panic!(
                                "advance birth buffer overflowed ({} slots); \
                                 time-step subdivision out of step with the buffer bound",
                                ADVANCE_BUF_SIZE
                            );
                        }
                        births.push(sec);
                    }
                }
            }
        }

        // finish the substep ballistically
        self.step(p, p.t_left);
        let code = self.outside_code(p);
        if code > 0 {
            events.push(Event {
                part: *p,
                coll_index: 0,
                kind: EventKind::WentOut(code),
            });
            p.kill();
            return Advanced::Died;
        }
        Advanced::Alive
    }
}

impl Engine {
    /// Split `dt` into substeps so the expected collisions per particle per
    /// substep stay below a quarter of the fan-out buffer, which keeps
    /// births from overflowing it.
    pub fn limit_advance_dt(&self, dt: f64) -> (usize, f64) {
        let budget = 0.25 * self.table.inv_max_rate() * ADVANCE_BUF_SIZE as f64;
        let n_steps = if budget.is_finite() {
            ((dt / budget).ceil() as usize).max(1)
        } else {
            1
        };
        (n_steps, dt / n_steps as f64)
    }

    pub(crate) fn check_advance_config(&self, dt: f64) {
        if dt < 0.0 {
            panic!("advance: negative time step {}", dt);
        }
        if self.mover == Mover::Verlet && self.accel.is_none() {
            panic!("advance: the Verlet mover requires an acceleration callback");
        }
    }

    /// Advance the whole population by `dt`, appending recorded events to
    /// `log`.
    ///
    /// Within a substep the loop re-reads `n_part`, so particles born from
    /// ionization are themselves advanced through their inherited leftover
    /// time before the substep ends. Each substep finishes with the
    /// after-mover correction and a compaction pass, so the live prefix
    /// invariant holds between substeps.
    pub fn advance(&mut self, dt: f64, log: &mut EventLog) {
        self.check_advance_config(dt);
        let (n_steps, dt_step) = self.limit_advance_dt(dt);
        let mut rng = self.rng.clone();
        let mut births: Vec<Particle> = Vec::with_capacity(ADVANCE_BUF_SIZE);
        let mut events: Vec<Event> = Vec::new();
        let mut scratch = vec![0.0; self.colls.len()];

        for _ in 0..n_steps {
            for p in self.parts[..self.n_part].iter_mut() {
                if p.is_alive() {
                    p.t_left = dt_step;
                }
            }

            let mut n = 0;
            while n < self.n_part {
                if !self.parts[n].is_alive() {
                    n += 1;
                    continue;
                }
                let ctx = StepCtx {
                    table: &self.table,
                    colls: &self.colls,
                    coll_is_event: &self.coll_is_event,
                    mover: self.mover,
                    dt_max: self.dt_max,
                    qm: self.qm,
                    bfield: self.bfield,
                    accel: self.accel.as_deref(),
                    outside: self.outside.as_deref(),
                };
                let mut p = self.parts[n];
                let outcome = ctx.move_and_collide(&mut p, &mut rng, &mut births, &mut events, &mut scratch);
                self.parts[n] = p;
                if outcome == Advanced::Died {
                    self.clean.push(n);
                }
                for b in births.drain(..) {
                    self.check_space(self.n_part + 1);
                    self.parts[self.n_part] = b;
                    self.n_part += 1;
                }
                for e in events.drain(..) {
                    log.push(e);
                }
                n += 1;
            }

            self.after_mover(dt_step);
            self.clean_up();
        }
        self.rng = rng;
    }

    /// Between-substep hook of the configured mover: the Verlet velocity
    /// correction from the refreshed accelerations, or nothing for Boris.
    pub(crate) fn after_mover(&mut self, dt: f64) {
        match self.mover {
            Mover::Verlet => {
                let accel = self
                    .accel
                    .as_deref()
                    .expect("after_mover: the Verlet corrector requires an acceleration callback");
                for p in self.parts[..self.n_part].iter_mut() {
                    if !p.is_alive() {
                        continue;
                    }
                    let a_new = accel(p);
                    p.v += 0.5 * (a_new - p.a) * dt;
                    p.a = a_new;
                }
            }
            Mover::Boris => {}
        }
    }
}
