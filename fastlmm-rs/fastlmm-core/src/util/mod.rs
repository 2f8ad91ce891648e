//! Numerical helpers shared across the crate.

pub mod flat;
pub mod mingrid;
