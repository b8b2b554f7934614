//! Algorithms shared across the workspace
//!
//! Currently deterministic seeding helpers for rayon-parallel work.

pub mod parallel;

pub use parallel::{derive_seed, map_seeded, seeded_rng};
