//! Domain types for the story context.

pub mod chapter;
pub mod notifications;
pub mod state;
pub mod stats;
