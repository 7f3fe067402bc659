//! Whiskers presenter: story content, game state and the chapter state
//! machine.
//!
//! `domain` holds the immutable story book, the mutable game state and the
//! outbound notification vocabulary; `application` holds the story engine
//! that ties them together.

pub mod application;
pub mod domain;
