//! JSON message envelope exchanged with the orchestrator.
//!
//! Every message on the channel, in either direction, is a JSON object with
//! a string `type`, a string `timestamp` and any number of type-specific
//! fields. Inbound payloads that do not meet that shape are rejected here,
//! before any routing happens.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::clock::{Clock, iso_timestamp};
use crate::error::TransportError;

const TYPE_FIELD: &str = "type";
const TIMESTAMP_FIELD: &str = "timestamp";

/// A decoded or to-be-encoded channel message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The message type discriminator.
    pub message_type: String,
    /// ISO-8601 timestamp; outbound messages are stamped on send if absent.
    pub timestamp: Option<String>,
    /// Type-specific fields, excluding `type` and `timestamp`.
    pub fields: Map<String, Value>,
}

impl Envelope {
    /// Creates an envelope with no timestamp and no fields.
    #[must_use]
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            timestamp: None,
            fields: Map::new(),
        }
    }

    /// Adds a type-specific field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Sets an explicit timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    /// Builds an envelope from a serialized object whose `type` key carries
    /// the discriminator. Any `timestamp` key already present is kept.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::MalformedMessage` if the value is not an
    /// object with a string `type`.
    pub fn from_tagged(value: Value) -> Result<Self, TransportError> {
        let Value::Object(mut fields) = value else {
            return Err(TransportError::MalformedMessage(
                "message is not a JSON object".to_owned(),
            ));
        };
        let message_type = match fields.remove(TYPE_FIELD) {
            Some(Value::String(kind)) => kind,
            _ => {
                return Err(TransportError::MalformedMessage(
                    "message has no string `type`".to_owned(),
                ));
            }
        };
        let timestamp = match fields.remove(TIMESTAMP_FIELD) {
            Some(Value::String(ts)) => Some(ts),
            _ => None,
        };
        Ok(Self {
            message_type,
            timestamp,
            fields,
        })
    }

    /// Decodes and validates an inbound payload.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::MalformedMessage` if the payload is not JSON,
    /// not an object, or lacks a string `type` or string `timestamp`.
    pub fn decode(payload: &[u8]) -> Result<Self, TransportError> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| TransportError::MalformedMessage(format!("invalid JSON: {e}")))?;
        if !matches!(value.get(TIMESTAMP_FIELD), Some(Value::String(_))) {
            return Err(TransportError::MalformedMessage(
                "message has no string `timestamp`".to_owned(),
            ));
        }
        Self::from_tagged(value)
    }

    /// Encodes the envelope as a JSON byte payload.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        // A map of string keys to JSON values always serializes.
        serde_json::to_vec(self).expect("envelope serialization is infallible")
    }

    /// Stamps the envelope with the current time unless it already carries a
    /// timestamp.
    pub fn stamp(&mut self, clock: &dyn Clock) {
        if self.timestamp.is_none() {
            self.timestamp = Some(iso_timestamp(clock.now()));
        }
    }

    /// Returns a type-specific field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.fields.len() + 1 + usize::from(self.timestamp.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(TYPE_FIELD, &self.message_type)?;
        if let Some(timestamp) = &self.timestamp {
            map.serialize_entry(TIMESTAMP_FIELD, timestamp)?;
        }
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
