//! Per-aggregate event registry.
//!
//! Maps the event type half of a stored topic to a decoder producing the
//! aggregate's event type. Each aggregate builds its registry once, usually in
//! a `LazyLock`, and hands it out from [`Aggregate::event_registry`].
//!
//! [`Aggregate::event_registry`]: crate::aggregate::Aggregate::event_registry

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;

use crate::error::DomainError;
use crate::record::EventRecord;

type Decoder<E> =
    Box<dyn Fn(u64, serde_json::Value) -> Result<E, serde_json::Error> + Send + Sync>;

/// Decoders for the closed set of events one aggregate type accepts.
pub struct EventRegistry<E> {
    aggregate_type: &'static str,
    decoders: HashMap<&'static str, Decoder<E>>,
}

impl<E> EventRegistry<E> {
    /// Creates an empty registry for `aggregate_type`.
    #[must_use]
    pub fn new(aggregate_type: &'static str) -> Self {
        Self {
            aggregate_type,
            decoders: HashMap::new(),
        }
    }

    /// Registers `event_type`, whose stored state deserializes into `P`;
    /// `build` wraps the payload and its version into the event type.
    ///
    /// Unknown fields in the stored state (such as `version`) are ignored by
    /// the payload decoder unless `P` opts out.
    #[must_use]
    pub fn register<P, F>(mut self, event_type: &'static str, build: F) -> Self
    where
        P: DeserializeOwned,
        F: Fn(u64, P) -> E + Send + Sync + 'static,
    {
        self.decoders.insert(
            event_type,
            Box::new(move |version, state| {
                let payload: P = serde_json::from_value(state)?;
                Ok(build(version, payload))
            }),
        );
        self
    }

    /// Whether `event_type` has a decoder.
    #[must_use]
    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    /// Decodes a stored event row.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventTopic` if the topic is outside this
    /// aggregate's namespace or names an unregistered event, and
    /// `DomainError::Serialization` if the state does not fit the payload.
    pub fn decode(&self, record: &EventRecord) -> Result<E, DomainError> {
        let event_type = record
            .topic
            .strip_prefix(self.aggregate_type)
            .and_then(|rest| rest.strip_prefix('.'))
            .ok_or_else(|| DomainError::UnknownEventTopic(record.topic.clone()))?;

        let decoder = self
            .decoders
            .get(event_type)
            .ok_or_else(|| DomainError::UnknownEventTopic(record.topic.clone()))?;

        decoder(record.originator_version, record.state.clone()).map_err(|e| {
            DomainError::Serialization(format!(
                "failed to decode {} at version {}: {e}",
                record.topic, record.originator_version
            ))
        })
    }
}

impl<E> fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut event_types: Vec<_> = self.decoders.keys().collect();
        event_types.sort();
        f.debug_struct("EventRegistry")
            .field("aggregate_type", &self.aggregate_type)
            .field("event_types", &event_types)
            .finish()
    }
}
