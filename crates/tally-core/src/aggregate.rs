//! Aggregate root abstraction.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::event::DomainEvent;
use crate::registry::EventRegistry;

/// Trait for aggregate roots whose state is a fold over their event history.
///
/// The serialized form of an aggregate is its snapshot payload, so `id` and
/// `version` must round-trip through `Serialize`/`Deserialize`.
pub trait Aggregate: Serialize + DeserializeOwned + Send + Sync + std::fmt::Debug {
    /// Name used for snapshot topics and as the event topic namespace.
    const AGGREGATE_TYPE: &'static str;

    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent<Aggregate = Self> + 'static;

    /// A bare aggregate: only `id` set, version 0, every other field default.
    fn new(id: u64) -> Self;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> u64;

    /// Returns the current version (number of events applied).
    fn version(&self) -> u64;

    /// Overwrites the version. Only [`Aggregate::apply`] should call this.
    fn set_version(&mut self, version: u64);

    /// The decoders for every event this aggregate can replay.
    fn event_registry() -> &'static EventRegistry<Self::Event>;

    /// Applies an event and advances the version by exactly one.
    fn apply(&mut self, event: &Self::Event) {
        event.apply(self);
        self.set_version(self.version() + 1);
    }

    /// Topic under which `event` is stored.
    fn event_topic(event: &Self::Event) -> String {
        format!("{}.{}", Self::AGGREGATE_TYPE, event.event_type())
    }

    /// Prefix shared by every event topic of this aggregate.
    fn event_topic_prefix() -> String {
        format!("{}.", Self::AGGREGATE_TYPE)
    }
}
