// Internal k-d tree for merge-candidate pairing.
//
// Built once per rebalancing pass over the candidate set and thrown away.
// Keys are fixed-width with the first `ndim` lanes in use (up to three
// masked position axes plus scaled velocity axes or the speed).

/// Widest supported key: three position axes plus three velocity axes.
pub(crate) const KD_MAX_DIM: usize = 6;

pub(crate) struct KdTree {
    keys: Vec<[f64; KD_MAX_DIM]>,
    /// Point ids arranged by recursive median split: the median of a
    /// subrange is that subtree's root.
    order: Vec<u32>,
    ndim: usize,
}

impl KdTree {
    pub fn build(keys: Vec<[f64; KD_MAX_DIM]>, ndim: usize) -> Self {
        assert!(ndim >= 1 && ndim <= KD_MAX_DIM, "KdTree: bad dimension {}", ndim);
        let order: Vec<u32> = (0..keys.len() as u32).collect();
        let mut tree = Self { keys, order, ndim };
        let len = tree.order.len();
        tree.split(0, len, 0);
        tree
    }

    pub fn key(&self, i: usize) -> &[f64; KD_MAX_DIM] {
        &self.keys[i]
    }

    fn split(&mut self, lo: usize, hi: usize, depth: usize) {
        if hi - lo <= 1 {
            return;
        }
        let axis = depth % self.ndim;
        let mid = (lo + hi) / 2;
        {
            let keys = &self.keys;
            self.order[lo..hi].select_nth_unstable_by(mid - lo, |&a, &b| {
                keys[a as usize][axis]
                    .partial_cmp(&keys[b as usize][axis])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        self.split(lo, mid, depth + 1);
        self.split(mid + 1, hi, depth + 1);
    }

    /// Id and squared distance of the nearest point to `query`, excluding
    /// the point with id `exclude`. `None` when no other point exists.
    pub fn nearest(&self, query: &[f64; KD_MAX_DIM], exclude: usize) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        self.search(0, self.order.len(), 0, query, exclude, &mut best);
        best
    }

    fn dist2(&self, id: usize, query: &[f64; KD_MAX_DIM]) -> f64 {
        (0..self.ndim)
            .map(|d| (self.keys[id][d] - query[d]).powi(2))
            .sum()
    }

    fn search(
        &self,
        lo: usize,
        hi: usize,
        depth: usize,
        query: &[f64; KD_MAX_DIM],
        exclude: usize,
        best: &mut Option<(usize, f64)>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = (lo + hi) / 2;
        let id = self.order[mid] as usize;
        if id != exclude {
            let d2 = self.dist2(id, query);
            if best.map_or(true, |(_, bd)| d2 < bd) {
                *best = Some((id, d2));
            }
        }
        if hi - lo == 1 {
            return;
        }
        let axis = depth % self.ndim;
        let delta = query[axis] - self.keys[id][axis];
        let (near, far) = if delta < 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };
        self.search(near.0, near.1, depth + 1, query, exclude, best);
        // the far half can only win if the splitting plane is closer than
        // the best match so far
        if best.map_or(true, |(_, bd)| delta * delta < bd) {
            self.search(far.0, far.1, depth + 1, query, exclude, best);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::EngineRng;

    fn key2(x: f64, y: f64) -> [f64; KD_MAX_DIM] {
        let mut k = [0.0; KD_MAX_DIM];
        k[0] = x;
        k[1] = y;
        k
    }

    fn brute_nearest(
        keys: &[[f64; KD_MAX_DIM]],
        ndim: usize,
        query: &[f64; KD_MAX_DIM],
        exclude: usize,
    ) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, k) in keys.iter().enumerate() {
            if i == exclude {
                continue;
            }
            let d2: f64 = (0..ndim).map(|d| (k[d] - query[d]).powi(2)).sum();
            if best.map_or(true, |(_, bd)| d2 < bd) {
                best = Some((i, d2));
            }
        }
        best
    }

    #[test]
    fn test_nearest_small_grid() {
        let keys = vec![key2(0.0, 0.0), key2(1.0, 0.0), key2(0.0, 1.0), key2(5.0, 5.0)];
        let tree = KdTree::build(keys, 2);
        let (id, d2) = tree.nearest(&key2(0.9, 0.1), usize::MAX).unwrap();
        assert_eq!(id, 1);
        assert!((d2 - (0.01 + 0.01)).abs() < 1e-12);
    }

    #[test]
    fn test_nearest_excludes_self() {
        let keys = vec![key2(0.0, 0.0), key2(1.0, 0.0)];
        let tree = KdTree::build(keys, 2);
        let (id, _) = tree.nearest(&key2(0.0, 0.0), 0).unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_single_point_has_no_neighbor() {
        let tree = KdTree::build(vec![key2(0.0, 0.0)], 2);
        assert!(tree.nearest(&key2(0.0, 0.0), 0).is_none());
    }

    #[test]
    fn test_matches_brute_force() {
        let mut rng = EngineRng::new(99);
        for ndim in [1usize, 2, 3, 6] {
            let keys: Vec<[f64; KD_MAX_DIM]> = (0..200)
                .map(|_| {
                    let mut k = [0.0; KD_MAX_DIM];
                    for lane in k.iter_mut().take(ndim) {
                        *lane = rng.random();
                    }
                    k
                })
                .collect();
            let tree = KdTree::build(keys.clone(), ndim);
            for probe in 0..50 {
                let query = keys[probe];
                let got = tree.nearest(&query, probe);
                let want = brute_nearest(&keys, ndim, &query, probe);
                let (gi, gd) = got.unwrap();
                let (_, wd) = want.unwrap();
                assert!(
                    (gd - wd).abs() < 1e-12,
                    "ndim={} probe={} tree found {} at {}, brute force {}",
                    ndim,
                    probe,
                    gi,
                    gd,
                    wd
                );
            }
        }
    }
}
