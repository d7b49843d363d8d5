//! Core deterministic primitives.

pub mod rng;

pub use rng::{derive_session_seed, DeterministicRng};
