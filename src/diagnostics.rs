// Weighted reductions and binning over the live population.

use nalgebra::Vector3;

use crate::engine::Engine;
use crate::particle::Particle;

impl Engine {
    /// Weighted sum of `f` over the live population: sum of `w * f(p)`.
    pub fn compute_scalar_sum<F>(&self, f: F) -> f64
    where
        F: Fn(&Particle) -> f64,
    {
        self.parts[..self.n_part]
            .iter()
            .filter(|p| p.is_alive())
            .map(|p| p.w * f(p))
            .sum()
    }

    /// Weighted vector sum of `f` over the live population.
    pub fn compute_vector_sum<F>(&self, f: F) -> Vector3<f64>
    where
        F: Fn(&Particle) -> Vector3<f64>,
    {
        self.parts[..self.n_part]
            .iter()
            .filter(|p| p.is_alive())
            .fold(Vector3::zeros(), |acc, p| acc + p.w * f(p))
    }

    /// Number of physical particles represented (total weight).
    pub fn n_real_part(&self) -> f64 {
        self.compute_scalar_sum(|_| 1.0)
    }

    /// Weight-averaged kinetic energy [J]; zero for an empty population.
    pub fn get_mean_energy(&self) -> f64 {
        let total_w = self.n_real_part();
        if total_w <= 0.0 {
            return 0.0;
        }
        self.compute_scalar_sum(|p| p.kinetic_energy(self.mass)) / total_w
    }

    /// Weighted histogram of `value` over bin centers `x_bins`.
    ///
    /// A particle lands in the bin whose center is nearest along the value
    /// axis: binning is by binary search over the midpoints between
    /// adjacent centers, so the ends catch everything beyond them.
    pub fn histogram<V>(
        &self,
        value: V,
        filter: Option<&dyn Fn(&Particle) -> bool>,
        x_bins: &[f64],
    ) -> Vec<f64>
    where
        V: Fn(&Particle) -> f64,
    {
        if x_bins.is_empty() {
            return Vec::new();
        }
        let mids: Vec<f64> = x_bins.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        let mut y_bins = vec![0.0; x_bins.len()];
        for p in self.parts[..self.n_part].iter().filter(|p| p.is_alive()) {
            if let Some(keep) = filter {
                if !keep(p) {
                    continue;
                }
            }
            let v = value(p);
            let bin = mids.partition_point(|&m| m <= v);
            y_bins[bin] += p.w;
        }
        y_bins
    }
}
