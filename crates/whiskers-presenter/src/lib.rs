//! Whiskers presenter runtime.
//!
//! Wires the story engine, the transport channel and the side channels into
//! one presenter loop. `app` is the control dispatcher, `runtime` the loop
//! that feeds it, and `routes` the optional development status server.

pub mod app;
pub mod command;
pub mod config;
pub mod content;
pub mod error;
pub mod routes;
pub mod runtime;
pub mod state;
pub mod viewport;
