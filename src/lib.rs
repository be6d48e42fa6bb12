//! Particle-in-Cell / Monte-Carlo-Collision particle engine.
//!
//! The engine advances a population of weighted simulation particles under
//! externally supplied accelerations, interleaving ballistic motion with
//! stochastic collisions against a neutral background gas. Collisions use
//! the null-collision method over a velocity-indexed cumulative rate table,
//! producing elastic, excitation, ionization and attachment events.
//!
//! Field solving, geometry and cross-section file parsing live outside the
//! crate; they plug in through the acceleration and out-of-domain callbacks
//! and the tabulated [`CrossSection`] inputs.

mod balance;
mod collision;
pub mod constants;
mod cross_section;
mod diagnostics;
mod engine;
mod events;
mod kdtree;
mod merge_split;
mod mover;
mod parallel;
mod particle;
mod rate_table;
mod rng;
mod step;

pub use balance::{reorder_by_bins, share};
pub use collision::{collide, isotropic, Collision, CollisionKind, Scatter};
pub use cross_section::CrossSection;
pub use engine::{AccelFn, CollChannel, Engine, OutsideFn};
pub use events::{Event, EventKind, EventLog};
pub use merge_split::{merge_part_rxv, split_half, MergeFn, RebalanceSpec, SplitFn};
pub use mover::Mover;
pub use particle::Particle;
pub use rate_table::RateTable;
pub use rng::{EngineRng, RngPool};
