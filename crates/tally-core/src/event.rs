//! Domain event abstractions.

use serde::Serialize;

use crate::error::DomainError;

/// Name of the field every serialized event carries its version in.
pub const VERSION_FIELD: &str = "version";

/// Trait that all domain events implement.
///
/// Each aggregate owns a closed set of events, usually an envelope struct
/// holding the version plus an enum of payload variants.
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// The aggregate this event mutates.
    type Aggregate;

    /// Returns the event type name (the second half of the stored topic).
    fn event_type(&self) -> &'static str;

    /// The aggregate version this event was issued against.
    fn version(&self) -> u64;

    /// Serializes every event field, `version` included.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload cannot be encoded.
    fn to_payload(&self) -> Result<serde_json::Value, DomainError>;

    /// Mutates the aggregate. Does not touch the aggregate's version.
    fn apply(&self, aggregate: &mut Self::Aggregate);
}

/// Serializes a payload struct and stamps the event version into it.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if the payload does not serialize to
/// a JSON object.
pub fn payload_with_version<P: Serialize>(
    payload: &P,
    version: u64,
) -> Result<serde_json::Value, DomainError> {
    let mut value = serde_json::to_value(payload)?;
    let Some(fields) = value.as_object_mut() else {
        return Err(DomainError::Serialization(
            "event payload must serialize to a JSON object".into(),
        ));
    };
    fields.insert(VERSION_FIELD.to_owned(), version.into());
    Ok(value)
}
