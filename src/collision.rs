// Collision kernels for the Monte-Carlo-Collision step.

use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::constants::K_BOLTZMANN;
use crate::particle::Particle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionKind {
    Elastic,
    Excite,
    Ionize,
    Attach,
}

/// One collision channel against the neutral background gas. Immutable
/// after initialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    pub kind: CollisionKind,
    /// Energy lost by the incident particle [J]
    pub en_loss: f64,
    /// Incident particle mass [kg]
    pub part_mass: f64,
    /// Mass ratio incident / background
    pub rel_mass: f64,
    /// Background gas temperature [K]; 0 keeps the gas cold.
    pub bg_temp: f64,
}

impl Collision {
    pub fn new(kind: CollisionKind, en_loss: f64, part_mass: f64, rel_mass: f64) -> Self {
        Self {
            kind,
            en_loss,
            part_mass,
            rel_mass,
            bg_temp: 0.0,
        }
    }

    /// Same channel against a Maxwellian background at `bg_temp` [K].
    pub fn with_background_temp(mut self, bg_temp: f64) -> Self {
        self.bg_temp = bg_temp;
        self
    }
}

/// What a collision kernel produced: nothing (the parent is absorbed), the
/// scattered survivor, or the survivor plus a secondary.
#[derive(Debug, Clone, Copy)]
pub enum Scatter {
    Absorbed,
    One(Particle),
    Two(Particle, Particle),
}

/// Uniform direction on the sphere scaled to `speed`, by the Marsaglia disk
/// method: reject (r1, r2) from the unit square until they land inside the
/// unit disk, then lift onto the sphere.
pub fn isotropic<R: Rng + ?Sized>(speed: f64, rng: &mut R) -> Vector3<f64> {
    loop {
        let r1 = 2.0 * rng.gen::<f64>() - 1.0;
        let r2 = 2.0 * rng.gen::<f64>() - 1.0;
        let s = r1 * r1 + r2 * r2;
        if s <= 1.0 {
            let f = (1.0 - s).sqrt();
            return Vector3::new(2.0 * r1 * f, 2.0 * r2 * f, 1.0 - 2.0 * s) * speed;
        }
    }
}

/// Background atom velocity: zero for a cold gas, Maxwellian when the
/// channel carries a background temperature.
fn background_velocity<R: Rng + ?Sized>(coll: &Collision, rng: &mut R) -> Vector3<f64> {
    if coll.bg_temp <= 0.0 {
        return Vector3::zeros();
    }
    let bg_mass = coll.part_mass / coll.rel_mass;
    let vth = (K_BOLTZMANN * coll.bg_temp / bg_mass).sqrt();
    let normal = Normal::new(0.0, vth).unwrap();
    Vector3::new(normal.sample(rng), normal.sample(rng), normal.sample(rng))
}

/// Apply the channel's kernel to one incident particle.
///
/// Energy accounting: excitation subtracts `en_loss` from the kinetic
/// energy, floored at zero; ionization splits the post-loss energy equally
/// between the incident particle and the secondary. Secondaries clone the
/// parent's position, weight, tags and leftover substep time.
pub fn collide<R: Rng + ?Sized>(p: &Particle, coll: &Collision, rng: &mut R) -> Scatter {
    match coll.kind {
        CollisionKind::Elastic => {
            let bg_v = background_velocity(coll, rng);
            let com_v = (coll.rel_mass * p.v + bg_v) / (1.0 + coll.rel_mass);
            let rel_speed = (p.v - com_v).norm();
            let mut out = *p;
            out.v = com_v + isotropic(rel_speed, rng);
            Scatter::One(out)
        }
        CollisionKind::Excite => {
            let ke = (p.kinetic_energy(coll.part_mass) - coll.en_loss).max(0.0);
            let speed = (2.0 * ke / coll.part_mass).sqrt();
            let mut out = *p;
            out.v = isotropic(speed, rng);
            Scatter::One(out)
        }
        CollisionKind::Ionize => {
            let ke = (p.kinetic_energy(coll.part_mass) - coll.en_loss).max(0.0);
            let speed = (ke / coll.part_mass).sqrt();
            let mut out = *p;
            out.v = isotropic(speed, rng);
            let mut sec = *p;
            sec.v = isotropic(speed, rng);
            Scatter::Two(out, sec)
        }
        CollisionKind::Attach => Scatter::Absorbed,
    }
}

// =====================
//        TESTS
// =====================
