// Weight rebalancing: merge under-weighted particles with their nearest
// phase-space neighbor, split over-weighted ones in place.

use std::cmp::Ordering;

use crate::engine::Engine;
use crate::kdtree::{KdTree, KD_MAX_DIM};
use crate::particle::Particle;
use crate::rng::EngineRng;

/// Particles below `1/1.5` of their target weight are merge candidates;
/// particles above `1.5` of it are split candidates.
const RATIO_SMALL: f64 = 1.0 / 1.5;
const RATIO_LARGE: f64 = 1.5;

pub type MergeFn = dyn Fn(&Particle, &Particle, &mut EngineRng) -> Particle;
pub type SplitFn = dyn Fn(&Particle, f64, &mut EngineRng) -> (Particle, Particle);

/// Rebalancing configuration: which position axes matter for neighbor
/// search, how velocity is weighted against position, the target weight,
/// and the merge/split kernels.
pub struct RebalanceSpec<'a> {
    /// Position axes included in the search key.
    pub x_mask: [bool; 3],
    /// Scale applied to the velocity lanes of the search key.
    pub v_fac: f64,
    /// Use the speed as a single key lane instead of the velocity vector.
    pub use_v_norm: bool,
    /// Merges farther apart than this in key space are skipped.
    pub max_merge_distance: f64,
    pub w_target: &'a dyn Fn(&Particle) -> f64,
    pub merge_fn: &'a MergeFn,
    pub split_fn: &'a SplitFn,
}

/// Default merge: keep one parent's kinematics with probability
/// `w_a / (w_a + w_b)`, carry the summed weight.
pub fn merge_part_rxv(a: &Particle, b: &Particle, rng: &mut EngineRng) -> Particle {
    let w = a.w + b.w;
    let mut out = if rng.random() < a.w / w { *a } else { *b };
    out.w = w;
    out
}

/// Default split: halve the weight and duplicate.
pub fn split_half(p: &Particle, _ratio: f64, _rng: &mut EngineRng) -> (Particle, Particle) {
    let mut out = *p;
    out.w = 0.5 * p.w;
    (out, out)
}

fn kd_ndim(spec: &RebalanceSpec) -> usize {
    let x_dims = spec.x_mask.iter().filter(|&&m| m).count();
    x_dims + if spec.use_v_norm { 1 } else { 3 }
}

fn kd_key(p: &Particle, spec: &RebalanceSpec) -> [f64; KD_MAX_DIM] {
    let mut key = [0.0; KD_MAX_DIM];
    let mut lane = 0;
    for axis in 0..3 {
        if spec.x_mask[axis] {
            key[lane] = p.x[axis];
            lane += 1;
        }
    }
    if spec.use_v_norm {
        key[lane] = spec.v_fac * p.v.norm();
    } else {
        for axis in 0..3 {
            key[lane] = spec.v_fac * p.v[axis];
            lane += 1;
        }
    }
    key
}

impl Engine {
    /// Rebalance the whole live population, then compact.
    pub fn merge_and_split(&mut self, spec: &RebalanceSpec) {
        if self.n_part == 0 {
            return;
        }
        let hi = self.n_part - 1;
        self.merge_and_split_range(0, hi, spec);
        self.clean_up();
    }

    /// Rebalance the inclusive slot interval `[i0, i1]`.
    ///
    /// Merged-away slots go on a local free stack and are recycled by the
    /// splits of the same pass; whatever remains freed is queued for the
    /// next compaction. Splits beyond the free slots append to the array,
    /// which may hit the capacity check.
    pub fn merge_and_split_range(&mut self, i0: usize, i1: usize, spec: &RebalanceSpec) {
        if i0 > i1 || i1 >= self.n_part {
            panic!(
                "merge_and_split_range: bad interval [{}, {}] for {} live particles",
                i0, i1, self.n_part
            );
        }
        let mut rng = self.rng.clone();

        // weight-to-target ratios over the interval
        let mut merge_c: Vec<(usize, f64)> = Vec::new();
        let mut split_c: Vec<(usize, f64)> = Vec::new();
        for i in i0..=i1 {
            let p = &self.parts[i];
            if !p.is_alive() {
                continue;
            }
            let wt = (spec.w_target)(p);
            if wt <= 0.0 {
                continue;
            }
            let ratio = p.w / wt;
            if ratio <= RATIO_SMALL {
                merge_c.push((i, ratio));
            } else if ratio >= RATIO_LARGE {
                split_c.push((i, ratio));
            }
        }

        let mut free_ixs: Vec<usize> = Vec::new();

        if merge_c.len() > 1 {
            // lightest ratios first; slot index breaks ties deterministically
            merge_c.sort_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            });
            let keys: Vec<[f64; KD_MAX_DIM]> = merge_c
                .iter()
                .map(|&(i, _)| kd_key(&self.parts[i], spec))
                .collect();
            let tree = KdTree::build(keys, kd_ndim(spec));
            let max_d2 = spec.max_merge_distance * spec.max_merge_distance;
            let mut merged = vec![false; merge_c.len()];

            for ci in 0..merge_c.len() {
                if merged[ci] {
                    continue;
                }
                let query = *tree.key(ci);
                let Some((cj, d2)) = tree.nearest(&query, ci) else {
                    continue;
                };
                if merged[cj] || d2 > max_d2 {
                    continue;
                }
                let (i, _) = merge_c[ci];
                let (j, _) = merge_c[cj];
                let merged_part = (spec.merge_fn)(&self.parts[i], &self.parts[j], &mut rng);
                self.parts[i] = merged_part;
                self.parts[j].kill();
                free_ixs.push(j);
                merged[ci] = true;
                merged[cj] = true;
            }
        }

        // heaviest ratios first
        split_c.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        for &(i, ratio) in &split_c {
            let (first, second) = (spec.split_fn)(&self.parts[i], ratio, &mut rng);
            self.parts[i] = first;
            if let Some(slot) = free_ixs.pop() {
                self.parts[slot] = second;
            } else {
                self.add_part(second);
            }
        }

        // leftover freed slots stay dead until the next compaction
        self.clean.extend(free_ixs);
        self.rng = rng;
    }
}
