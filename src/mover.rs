use nalgebra::Vector3;

use crate::particle::Particle;

/// Integrator choice, fixed at configuration time. Verlet handles purely
/// electric forces through the acceleration callback; Boris adds the
/// rotation for a constant magnetic field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mover {
    #[default]
    Verlet,
    Boris,
}

/// Position-Verlet kick/drift. The acceleration stored on the particle is
/// corrected between substeps by the Verlet after-mover.
pub(crate) fn verlet_step(p: &mut Particle, dt: f64) {
    p.x += p.v * dt + 0.5 * p.a * dt * dt;
    p.v += p.a * dt;
    p.t_left -= dt;
}

/// Boris push: electric half-kick, magnetic rotation in t-vector form,
/// second half-kick, then the position drift. `qm` is the charge-to-mass
/// ratio; the particle's stored acceleration holds the electric part.
pub(crate) fn boris_step(p: &mut Particle, dt: f64, qm: f64, bfield: Vector3<f64>) {
    let half = 0.5 * dt;
    p.v += p.a * half;
    let t = bfield * (qm * half);
    let s = t * (2.0 / (1.0 + t.norm_squared()));
    let v_prime = p.v + p.v.cross(&t);
    p.v += v_prime.cross(&s);
    p.v += p.a * half;
    p.x += p.v * dt;
    p.t_left -= dt;
}
