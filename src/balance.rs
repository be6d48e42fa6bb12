// Load balancing across a pool of engines.

use crate::engine::Engine;
use crate::particle::Particle;

/// Even out particle counts by moving tail blocks from the most-loaded
/// engine to the least-loaded, until `max - min < n_engines`.
///
/// Transfers are pure block copies off the donor's tail, so neither side
/// needs a compaction pass afterwards.
pub fn share(engines: &mut [Engine]) {
    let n = engines.len();
    if n < 2 {
        return;
    }
    loop {
        let counts: Vec<usize> = engines.iter().map(|e| e.n_sim_part()).collect();
        let total: usize = counts.iter().sum();
        let (i_max, &n_max) = counts.iter().enumerate().max_by_key(|&(_, &c)| c).unwrap();
        let (i_min, &n_min) = counts.iter().enumerate().min_by_key(|&(_, &c)| c).unwrap();
        if n_max - n_min < n {
            break;
        }
        let n_avg = (total + n - 1) / n;
        let k = (n_max - n_avg).min(n_avg - n_min);
        transfer(engines, i_max, i_min, k);
    }
}

/// Move `k` particles from the tail of `engines[from]` onto `engines[to]`.
fn transfer(engines: &mut [Engine], from: usize, to: usize, k: usize) {
    debug_assert_ne!(from, to);
    let (src, dst) = if from < to {
        let (head, tail) = engines.split_at_mut(to);
        (&mut head[from], &mut tail[0])
    } else {
        let (head, tail) = engines.split_at_mut(from);
        (&mut tail[0], &mut head[to])
    };
    dst.check_space(dst.n_sim_part() + k);
    for _ in 0..k {
        let p = src
            .pop_tail()
            .expect("share: donor ran out of particles mid-transfer");
        dst.add_part(p);
    }
}

/// Redistribute particles so every bin of `binner` lives on exactly one
/// engine.
///
/// Bins are assigned to owners by sweeping them in order and greedy-filling
/// each owner to roughly the average load; out-of-place particles are then
/// staged per destination, delivered, and every engine is compacted.
pub fn reorder_by_bins<B>(engines: &mut [Engine], n_bins: usize, binner: B)
where
    B: Fn(&Particle) -> usize,
{
    let n = engines.len();
    if n == 0 || n_bins == 0 {
        return;
    }

    let mut bin_total = vec![0usize; n_bins];
    let mut total = 0usize;
    for engine in engines.iter() {
        for p in engine.particles().iter().filter(|p| p.is_alive()) {
            let bin = binner(p);
            assert!(
                bin < n_bins,
                "reorder_by_bins: bin id {} out of range 0..{}",
                bin,
                n_bins
            );
            bin_total[bin] += 1;
            total += 1;
        }
    }

    let n_avg = (total + n - 1) / n;
    let mut owner_of = vec![0usize; n_bins];
    let mut owner = 0usize;
    let mut filled = 0usize;
    for bin in 0..n_bins {
        owner_of[bin] = owner;
        filled += bin_total[bin];
        if filled >= n_avg && owner + 1 < n {
            owner += 1;
            filled = 0;
        }
    }

    let mut outbound: Vec<Vec<Particle>> = vec![Vec::new(); n];
    for (e_ix, engine) in engines.iter_mut().enumerate() {
        for i in 0..engine.n_sim_part() {
            let p = engine.particles()[i];
            if !p.is_alive() {
                continue;
            }
            let dst = owner_of[binner(&p)];
            if dst != e_ix {
                outbound[dst].push(p);
                engine.remove_part(i);
            }
        }
    }
    for (dst, parts) in outbound.into_iter().enumerate() {
        for p in parts {
            engines[dst].add_part(p);
        }
    }
    for engine in engines.iter_mut() {
        engine.clean_up();
    }
}
