// The engine: particle storage, collision configuration, lifecycle.

use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use nalgebra::Vector3;

use crate::collision::Collision;
use crate::cross_section::CrossSection;
use crate::mover::Mover;
use crate::particle::Particle;
use crate::rate_table::RateTable;
use crate::rng::EngineRng;

/// Acceleration callback: must not depend on mutable engine state.
pub type AccelFn = dyn Fn(&Particle) -> Vector3<f64> + Send + Sync;
/// Out-of-domain predicate: a positive return marks the particle as gone,
/// with the value recorded as the reason code.
pub type OutsideFn = dyn Fn(&Particle) -> i32 + Send + Sync;

/// One collision channel as configured by the caller: the descriptor, its
/// cross section, and whether collisions of this channel are recorded in
/// the event log.
#[derive(Debug, Clone)]
pub struct CollChannel {
    pub coll: Collision,
    pub sigma: CrossSection,
    pub is_event: bool,
}

/// A population of weighted simulation particles advancing under external
/// accelerations with stochastic collisions against a neutral background.
///
/// The particle array has fixed capacity; the live population is the prefix
/// `[0, n_part)` between substeps. Slots marked dead are compacted by
/// `clean_up`, which back-fills from the tail and preserves no particular
/// order. Capacity exhaustion is fatal: the caller pre-sizes.
pub struct Engine {
    pub(crate) parts: Vec<Particle>,
    pub(crate) n_part: usize,
    pub(crate) colls: Vec<Collision>,
    pub(crate) coll_is_event: Vec<bool>,
    pub(crate) table: RateTable,
    /// Indices pending compaction.
    pub(crate) clean: Vec<usize>,
    /// Particle rest mass [kg]
    pub mass: f64,
    /// Charge-to-mass ratio for the Boris rotation [C/kg]
    pub qm: f64,
    /// Constant magnetic field for the Boris mover [T]
    pub bfield: Vector3<f64>,
    /// Upper bound on a single mover step [s]
    pub dt_max: f64,
    pub(crate) mover: Mover,
    pub(crate) accel: Option<Box<AccelFn>>,
    pub(crate) outside: Option<Box<OutsideFn>>,
    pub(crate) rng: EngineRng,
}

impl Engine {
    /// An engine with capacity for `n_max` particles and no collision
    /// channels yet (all motion is ballistic until `set_coll_rates`).
    pub fn new(mass: f64, n_max: usize, seed: u64) -> Self {
        if mass <= 0.0 {
            panic!("Engine::new: particle mass must be positive, got {}", mass);
        }
        if n_max == 0 {
            panic!("Engine::new: capacity must be at least one particle");
        }
        Self {
            parts: vec![Particle::placeholder(); n_max],
            n_part: 0,
            colls: Vec::new(),
            coll_is_event: Vec::new(),
            table: RateTable::empty(),
            clean: Vec::new(),
            mass,
            qm: 0.0,
            bfield: Vector3::zeros(),
            dt_max: f64::INFINITY,
            mover: Mover::Verlet,
            accel: None,
            outside: None,
            rng: EngineRng::new(seed),
        }
    }

    /// Build a fully configured engine in one call: collision channels,
    /// rate table, capacity, seeded generator.
    #[allow(clippy::too_many_arguments)]
    pub fn initialize(
        mass: f64,
        channels: Vec<CollChannel>,
        table_size: usize,
        e_max_ev: f64,
        n_bg: f64,
        n_max: usize,
        seed: u64,
    ) -> Self {
        let mut engine = Self::new(mass, n_max, seed);
        engine.set_coll_rates(channels, table_size, e_max_ev, n_bg);
        engine
    }

    /// Rebuild the cumulative rate table from the given channels. The
    /// background density is folded into the stored rates here.
    pub fn set_coll_rates(
        &mut self,
        channels: Vec<CollChannel>,
        table_size: usize,
        e_max_ev: f64,
        n_bg: f64,
    ) {
        if channels.is_empty() {
            panic!("set_coll_rates: empty cross-section list");
        }
        let sections: Vec<CrossSection> = channels.iter().map(|c| c.sigma.clone()).collect();
        self.table = RateTable::build(self.mass, &sections, table_size, e_max_ev, n_bg);
        self.colls = channels.iter().map(|c| c.coll).collect();
        self.coll_is_event = channels.iter().map(|c| c.is_event).collect();
    }

    pub fn set_mover(&mut self, mover: Mover) {
        self.mover = mover;
    }

    pub fn set_accel<F>(&mut self, f: F)
    where
        F: Fn(&Particle) -> Vector3<f64> + Send + Sync + 'static,
    {
        self.accel = Some(Box::new(f));
    }

    pub fn set_outside_check<F>(&mut self, f: F)
    where
        F: Fn(&Particle) -> i32 + Send + Sync + 'static,
    {
        self.outside = Some(Box::new(f));
    }

    pub fn capacity(&self) -> usize {
        self.parts.len()
    }

    /// Number of live simulation particles.
    pub fn n_sim_part(&self) -> usize {
        self.n_part
    }

    /// The populated prefix of the particle array. Between substeps every
    /// slot in it is live.
    pub fn particles(&self) -> &[Particle] {
        &self.parts[..self.n_part]
    }

    pub fn rate_table(&self) -> &RateTable {
        &self.table
    }

    pub fn collisions(&self) -> &[Collision] {
        &self.colls
    }

    /// Append a particle and return its slot. Fatal on capacity exhaustion.
    pub fn add_part(&mut self, p: Particle) -> usize {
        self.check_space(self.n_part + 1);
        let slot = self.n_part;
        self.parts[slot] = p;
        self.n_part += 1;
        slot
    }

    /// Mark slot `i` dead and queue it for compaction. Callers must not
    /// double-mark a slot.
    pub fn remove_part(&mut self, i: usize) {
        debug_assert!(i < self.n_part, "remove_part past the live prefix");
        self.parts[i].kill();
        self.clean.push(i);
    }

    /// Fatal unless the array can hold `n_req` particles.
    pub fn check_space(&self, n_req: usize) {
        if n_req > self.parts.len() {
            panic!(
                "particle capacity exhausted: need {} slots of {}",
                n_req,
                self.parts.len()
            );
        }
    }

    /// Compact the live prefix by back-filling removed slots from the tail.
    ///
    /// The pending indices are processed highest-first so the result depends
    /// only on the set of removed slots, not on the order threads enqueued
    /// them.
    pub fn clean_up(&mut self) {
        self.clean.sort_unstable();
        while let Some(i) = self.clean.pop() {
            if i >= self.n_part || self.parts[i].is_alive() {
                continue;
            }
            let mut j = self.n_part;
            let mut found = false;
            while j > i + 1 {
                j -= 1;
                if self.parts[j].is_alive() {
                    self.parts[i] = self.parts[j];
                    self.n_part = j;
                    found = true;
                    break;
                }
            }
            if !found {
                self.n_part = self.n_part.min(i);
            }
        }
    }

    /// Take the last live particle off the tail (used by load sharing; no
    /// compaction needed afterwards).
    pub(crate) fn pop_tail(&mut self) -> Option<Particle> {
        if self.n_part == 0 {
            return None;
        }
        self.n_part -= 1;
        Some(self.parts[self.n_part])
    }

    /// Write the parameters file (capacity, channel count, mass, envelope
    /// rate, channel descriptors, event flags) and the rate-table file.
    pub fn to_file(
        &self,
        params_path: impl AsRef<Path>,
        table_path: impl AsRef<Path>,
    ) -> Result<(), Box<dyn Error>> {
        let mut file = BufWriter::new(File::create(params_path)?);
        bincode::serialize_into(&mut file, &(self.parts.len() as u64))?;
        bincode::serialize_into(&mut file, &(self.colls.len() as u64))?;
        bincode::serialize_into(&mut file, &self.mass)?;
        bincode::serialize_into(&mut file, &self.table.max_rate())?;
        bincode::serialize_into(&mut file, &self.colls)?;
        bincode::serialize_into(&mut file, &self.coll_is_event)?;
        self.table.to_file(table_path)?;
        Ok(())
    }

    /// Rebuild an engine from files written by `to_file`. Callbacks and
    /// particles are not persisted; the caller re-attaches and re-seeds.
    pub fn init_from_file(
        params_path: impl AsRef<Path>,
        table_path: impl AsRef<Path>,
        seed: u64,
    ) -> Result<Self, Box<dyn Error>> {
        let mut file = BufReader::new(File::open(params_path)?);
        let n_max: u64 = bincode::deserialize_from(&mut file)?;
        let n_colls: u64 = bincode::deserialize_from(&mut file)?;
        let mass: f64 = bincode::deserialize_from(&mut file)?;
        let max_rate: f64 = bincode::deserialize_from(&mut file)?;
        let colls: Vec<Collision> = bincode::deserialize_from(&mut file)?;
        let coll_is_event: Vec<bool> = bincode::deserialize_from(&mut file)?;

        if colls.len() != n_colls as usize {
            return Err(format!(
                "parameters file inconsistent: header says {} channels, found {}",
                n_colls,
                colls.len()
            )
            .into());
        }
        let table = RateTable::from_file(table_path)?;
        if table.n_colls() != colls.len() {
            return Err(format!(
                "rate table has {} channels but parameters file has {}",
                table.n_colls(),
                colls.len()
            )
            .into());
        }
        if table.max_rate() != max_rate {
            return Err("rate table does not match the parameters file".into());
        }

        let mut engine = Engine::new(mass, n_max as usize, seed);
        engine.colls = colls;
        engine.coll_is_event = coll_is_event;
        engine.table = table;
        Ok(engine)
    }
}
