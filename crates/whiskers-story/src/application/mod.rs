//! Application layer for the story context.

pub mod engine;
