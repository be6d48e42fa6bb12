// Cumulative collision-rate lookup table and the null-collision sampler.

use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::EV_TO_J;
use crate::cross_section::CrossSection;

/// 2-D lookup of cumulative collision rates indexed by particle speed.
///
/// Rows are uniformly spaced speeds on [0, v_max]; cell (i, j) stores the
/// running sum over channels k <= j of nu_k(v_i) = sigma_k(E(v_i)) * v_i *
/// n_bg, with the background density folded in at build time. Rows are
/// monotone non-decreasing across the channel index, and the table maximum
/// of the last column is the envelope rate used by the sampler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateTable {
    rates: Vec<f64>, // n_rows * n_colls, row-major, cumulative in the channel index
    n_rows: usize,
    n_colls: usize,
    v_max: f64,
    dv: f64,
    max_rate: f64,
    inv_max_rate: f64,
}

impl RateTable {
    /// A table with no channels; every sampled collision time is infinite.
    pub(crate) fn empty() -> Self {
        Self {
            rates: Vec::new(),
            n_rows: 0,
            n_colls: 0,
            v_max: 0.0,
            dv: 1.0,
            max_rate: 0.0,
            inv_max_rate: f64::INFINITY,
        }
    }

    /// Build the table for a particle of `mass` colliding against a
    /// background of density `n_bg`, covering energies up to `e_max_ev`.
    pub fn build(
        mass: f64,
        sections: &[CrossSection],
        n_rows: usize,
        e_max_ev: f64,
        n_bg: f64,
    ) -> Self {
        if sections.is_empty() {
            panic!("RateTable::build: empty cross-section list");
        }
        if n_rows < 2 {
            panic!("RateTable::build: need at least two velocity rows, got {}", n_rows);
        }
        if mass <= 0.0 || e_max_ev <= 0.0 {
            panic!(
                "RateTable::build: mass and max energy must be positive (mass={}, e_max_ev={})",
                mass, e_max_ev
            );
        }

        let v_max = (2.0 * e_max_ev * EV_TO_J / mass).sqrt();
        let dv = v_max / (n_rows - 1) as f64;
        let n_colls = sections.len();
        let mut rates = vec![0.0; n_rows * n_colls];
        let mut max_rate = 0.0f64;

        for i in 0..n_rows {
            let v = i as f64 * dv;
            let e_ev = 0.5 * mass * v * v / EV_TO_J;
            let mut cum = 0.0;
            for (j, cs) in sections.iter().enumerate() {
                cum += cs.at(e_ev) * v * n_bg;
                rates[i * n_colls + j] = cum;
            }
            max_rate = max_rate.max(cum);
        }

        let inv_max_rate = if max_rate > 0.0 {
            1.0 / max_rate
        } else {
            f64::INFINITY
        };

        Self {
            rates,
            n_rows,
            n_colls,
            v_max,
            dv,
            max_rate,
            inv_max_rate,
        }
    }

    pub fn n_colls(&self) -> usize {
        self.n_colls
    }

    pub fn max_rate(&self) -> f64 {
        self.max_rate
    }

    pub fn inv_max_rate(&self) -> f64 {
        self.inv_max_rate
    }

    /// Interpolate all cumulative channel rates at speed `v` into `out`.
    /// Speeds beyond the table clamp to the last row.
    pub fn rates_at(&self, v: f64, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.n_colls);
        debug_assert!(self.n_rows >= 2, "rates_at on an empty table");
        let u = (v / self.dv).clamp(0.0, (self.n_rows - 1) as f64);
        let i0 = (u as usize).min(self.n_rows - 2);
        let frac = u - i0 as f64;
        let lo = &self.rates[i0 * self.n_colls..(i0 + 1) * self.n_colls];
        let hi = &self.rates[(i0 + 1) * self.n_colls..(i0 + 2) * self.n_colls];
        for j in 0..self.n_colls {
            out[j] = lo[j] + frac * (hi[j] - lo[j]);
        }
    }

    /// Draw the next candidate collision time from the exponential envelope
    /// distribution with rate `max_rate`. `u` must lie in [0, 1).
    pub fn sample_coll_time(&self, u: f64) -> f64 {
        if self.max_rate == 0.0 {
            return f64::INFINITY;
        }
        -(1.0 - u).ln() * self.inv_max_rate
    }

    /// Pick the colliding channel at speed `v`, or `None` for a null
    /// collision (the particle flies on unperturbed).
    ///
    /// The channel is the smallest index whose cumulative rate exceeds
    /// `u * max_rate`; the search is linear for a handful of channels and a
    /// binary partition otherwise, with identical (deterministic) results.
    /// `scratch` must hold `n_colls` slots.
    pub fn coll_index(&self, v: f64, u: f64, scratch: &mut [f64]) -> Option<usize> {
        self.rates_at(v, scratch);
        let r = u * self.max_rate;
        if self.n_colls < 8 {
            scratch.iter().position(|&c| c > r)
        } else {
            let k = scratch.partition_point(|&c| c <= r);
            if k < self.n_colls {
                Some(k)
            } else {
                None
            }
        }
    }

    /// Write the table to its own binary file.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn Error>> {
        let mut file = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut file, self)?;
        Ok(())
    }

    /// Read a table previously written by `to_file`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let mut file = BufReader::new(File::open(path)?);
        let table: RateTable = bincode::deserialize_from(&mut file)?;
        Ok(table)
    }
}
