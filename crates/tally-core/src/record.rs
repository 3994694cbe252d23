//! Durable record types and the query shape stores must understand.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;

/// Longest topic a store is required to hold.
pub const MAX_TOPIC_LEN: usize = 50;

/// Distinguishes event log rows from snapshot rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// One persisted state transition.
    Event,
    /// A full aggregate-state capture.
    Snapshot,
}

impl RecordKind {
    /// Storage code for the kind column.
    #[must_use]
    pub fn code(self) -> i16 {
        match self {
            Self::Event => 1,
            Self::Snapshot => 2,
        }
    }

    /// Parses a storage code back into a kind.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` for codes no kind maps to.
    pub fn from_code(code: i16) -> Result<Self, DomainError> {
        match code {
            1 => Ok(Self::Event),
            2 => Ok(Self::Snapshot),
            other => Err(DomainError::Infrastructure(format!(
                "unknown record kind code {other}"
            ))),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event => f.write_str("event"),
            Self::Snapshot => f.write_str("snapshot"),
        }
    }
}

/// A row as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Unique row identifier.
    pub record_id: Uuid,
    /// Event or snapshot.
    pub kind: RecordKind,
    /// `"<AggregateType>.<EventType>"` for events, `"<AggregateType>"` for snapshots.
    pub topic: String,
    /// The aggregate this row belongs to.
    pub originator_id: u64,
    /// For events, the version the aggregate was at when the event was
    /// triggered; for snapshots, the version captured.
    pub originator_version: u64,
    /// Serialized event fields or full aggregate state.
    pub state: serde_json::Value,
    /// Assigned by the store at insertion.
    pub timestamp: DateTime<Utc>,
}

/// A row to be appended. The store assigns the identifier and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    /// Event or snapshot.
    pub kind: RecordKind,
    /// Namespaced topic.
    pub topic: String,
    /// Owning aggregate.
    pub originator_id: u64,
    /// Version slot this row claims.
    pub originator_version: u64,
    /// Serialized payload.
    pub state: serde_json::Value,
}

impl NewRecord {
    /// Checks constraints every store enforces before touching storage.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when the topic is empty or longer
    /// than [`MAX_TOPIC_LEN`].
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.topic.is_empty() {
            return Err(DomainError::Validation("record topic must not be empty".into()));
        }
        if self.topic.chars().count() > MAX_TOPIC_LEN {
            return Err(DomainError::Validation(format!(
                "record topic {:?} exceeds {MAX_TOPIC_LEN} characters",
                self.topic
            )));
        }
        Ok(())
    }
}

/// How the topic column is matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicFilter {
    /// Topic equals the value.
    Exact(String),
    /// Topic starts with the value.
    Prefix(String),
}

impl TopicFilter {
    fn matches(&self, topic: &str) -> bool {
        match self {
            Self::Exact(value) => topic == value,
            Self::Prefix(value) => topic.starts_with(value.as_str()),
        }
    }
}

/// A per-originator clause of a batch event query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingBound {
    /// The aggregate this clause selects.
    pub originator_id: u64,
    /// When set, only rows at this version or later are selected.
    pub from_version: Option<u64>,
}

/// Which originators a query selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginatorFilter {
    /// A single aggregate.
    One(u64),
    /// Set membership.
    Any(BTreeSet<u64>),
    /// A disjunction of per-originator clauses.
    Trailing(Vec<TrailingBound>),
}

impl OriginatorFilter {
    fn matches(&self, record: &EventRecord) -> bool {
        match self {
            Self::One(id) => record.originator_id == *id,
            Self::Any(ids) => ids.contains(&record.originator_id),
            Self::Trailing(bounds) => bounds.iter().any(|bound| {
                bound.originator_id == record.originator_id
                    && bound
                        .from_version
                        .is_none_or(|version| record.originator_version >= version)
            }),
        }
    }

    /// Returns `true` when the filter cannot select any row.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(_) => false,
            Self::Any(ids) => ids.is_empty(),
            Self::Trailing(bounds) => bounds.is_empty(),
        }
    }
}

/// Result ordering over `(originator_id, originator_version)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordOrder {
    /// Oldest first.
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

/// A filter over the record log.
///
/// All set conditions are conjoined; the originator filter may itself be a
/// disjunction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    /// Row kind.
    pub kind: RecordKind,
    /// Topic match.
    pub topic: TopicFilter,
    /// Originator selection.
    pub originators: OriginatorFilter,
    /// `originator_version < value`.
    pub version_lt: Option<u64>,
    /// `originator_version <= value`.
    pub version_lte: Option<u64>,
    /// `originator_version >= value`.
    pub version_gte: Option<u64>,
    /// `timestamp <= value`.
    pub timestamp_lte: Option<DateTime<Utc>>,
    /// Result ordering.
    pub order: RecordOrder,
    /// Maximum number of rows returned.
    pub limit: Option<u32>,
}

impl RecordQuery {
    /// Event rows whose topic starts with `topic_prefix`.
    #[must_use]
    pub fn events(topic_prefix: impl Into<String>, originators: OriginatorFilter) -> Self {
        Self::new(
            RecordKind::Event,
            TopicFilter::Prefix(topic_prefix.into()),
            originators,
        )
    }

    /// Snapshot rows whose topic is exactly `topic`.
    #[must_use]
    pub fn snapshots(topic: impl Into<String>, originators: OriginatorFilter) -> Self {
        Self::new(
            RecordKind::Snapshot,
            TopicFilter::Exact(topic.into()),
            originators,
        )
    }

    fn new(kind: RecordKind, topic: TopicFilter, originators: OriginatorFilter) -> Self {
        Self {
            kind,
            topic,
            originators,
            version_lt: None,
            version_lte: None,
            version_gte: None,
            timestamp_lte: None,
            order: RecordOrder::Ascending,
            limit: None,
        }
    }

    /// Restricts to `originator_version < version`.
    #[must_use]
    pub fn version_below(mut self, version: u64) -> Self {
        self.version_lt = Some(version);
        self
    }

    /// Restricts to `originator_version <= version`.
    #[must_use]
    pub fn version_at_most(mut self, version: u64) -> Self {
        self.version_lte = Some(version);
        self
    }

    /// Restricts to `originator_version >= version`.
    #[must_use]
    pub fn version_from(mut self, version: u64) -> Self {
        self.version_gte = Some(version);
        self
    }

    /// Restricts to `timestamp <= at`.
    #[must_use]
    pub fn recorded_until(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp_lte = Some(at);
        self
    }

    /// Orders newest first.
    #[must_use]
    pub fn newest_first(mut self) -> Self {
        self.order = RecordOrder::Descending;
        self
    }

    /// Caps the number of rows returned.
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluates every condition except ordering and limit against one row.
    #[must_use]
    pub fn matches(&self, record: &EventRecord) -> bool {
        record.kind == self.kind
            && self.topic.matches(&record.topic)
            && self.originators.matches(record)
            && self.version_lt.is_none_or(|v| record.originator_version < v)
            && self.version_lte.is_none_or(|v| record.originator_version <= v)
            && self.version_gte.is_none_or(|v| record.originator_version >= v)
            && self.timestamp_lte.is_none_or(|at| record.timestamp <= at)
    }

    /// Runs the query over rows held in memory: filter, order, then limit.
    pub fn select<'a>(&self, records: impl IntoIterator<Item = &'a EventRecord>) -> Vec<EventRecord> {
        let mut selected: Vec<EventRecord> = records
            .into_iter()
            .filter(|record| self.matches(record))
            .cloned()
            .collect();
        selected.sort_by_key(|record| (record.originator_id, record.originator_version));
        if self.order == RecordOrder::Descending {
            selected.reverse();
        }
        if let Some(limit) = self.limit {
            selected.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        selected
    }
}
