//! Shared test doubles and fixtures for the Whiskers presenter.

mod broker;
mod clock;
mod rng;
mod story;

pub use broker::{FailingBroker, SilentBroker};
pub use clock::{FixedClock, fixed_clock};
pub use rng::{MockRng, SequenceRng};
pub use story::SAMPLE_STORY_JSON;
