// Physical constants and engine-wide limits.

/// Elementary charge [C]
pub const E_CHARGE: f64 = 1.60217662e-19;
/// eV <-> Joule conversion factor
pub const EV_TO_J: f64 = E_CHARGE;
/// Electron rest mass [kg]
pub const E_MASS: f64 = 9.10938356e-31;
/// Boltzmann's constant [J/K]
pub const K_BOLTZMANN: f64 = 1.38064852e-23;

/// Weight sentinel marking a particle slot as removed. Slots at or below
/// this weight are never used in physics computations.
pub const DEAD: f64 = -1e100;

/// Capacity of the fan-out buffers used while advancing (births, removals,
/// events per thread). `limit_advance_dt` caps the expected collisions per
/// particle per substep at a quarter of this value; the two must move
/// together.
pub const ADVANCE_BUF_SIZE: usize = 1000;
