use nalgebra::Vector3;

use crate::constants::DEAD;

/// One weighted simulation particle. Each simulation particle stands in for
/// `w` physical particles sharing the same kinematic state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Position [m]
    pub x: Vector3<f64>,
    /// Velocity [m/s]
    pub v: Vector3<f64>,
    /// Acceleration [m/s^2]
    pub a: Vector3<f64>,
    /// Weight: number of physical particles represented. `DEAD` marks a
    /// removed slot.
    pub w: f64,
    /// Time left to advance within the current substep [s]
    pub t_left: f64,
    /// Opaque tag reserved for the caller
    pub id: i64,
    /// Opaque species tag reserved for the caller
    pub ptype: i32,
}

impl Particle {
    pub fn new(x: Vector3<f64>, v: Vector3<f64>, a: Vector3<f64>, w: f64) -> Self {
        Self {
            x,
            v,
            a,
            w,
            t_left: 0.0,
            id: 0,
            ptype: 0,
        }
    }

    /// Dead filler for unused array slots.
    pub(crate) fn placeholder() -> Self {
        Self {
            x: Vector3::zeros(),
            v: Vector3::zeros(),
            a: Vector3::zeros(),
            w: DEAD,
            t_left: 0.0,
            id: 0,
            ptype: 0,
        }
    }

    pub fn speed(&self) -> f64 {
        self.v.norm()
    }

    /// Kinetic energy for the given rest mass [J]
    pub fn kinetic_energy(&self, mass: f64) -> f64 {
        0.5 * mass * self.v.norm_squared()
    }

    pub fn is_alive(&self) -> bool {
        self.w > 0.0
    }

    /// Mark the particle as pending removal.
    pub fn kill(&mut self) {
        self.w = DEAD;
    }
}
