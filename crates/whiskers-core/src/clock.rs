//! Clock abstraction for deterministic timestamps.

use chrono::{DateTime, SecondsFormat, Utc};

/// Abstraction over wall-clock time.
///
/// Every timestamp the presenter writes (chapter visits, choice records,
/// outbound envelopes) is taken from a `Clock` so tests can pin it.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Formats a timestamp the way the orchestrator expects it on the wire:
/// RFC 3339 with millisecond precision and a `Z` suffix.
#[must_use]
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
