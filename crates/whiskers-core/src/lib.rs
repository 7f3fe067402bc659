//! Whiskers Core: shared presenter abstractions.
//!
//! This crate defines the types every other presenter crate agrees on: the
//! clock and RNG seams, the error taxonomy, the JSON message envelope used on
//! the publish/subscribe channel, and the side-channel signal contract. It
//! contains no I/O.

pub mod clock;
pub mod envelope;
pub mod error;
pub mod features;
pub mod rng;
pub mod signal;
