//! `PostgreSQL` implementation of the `RecordStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use tally_core::error::DomainError;
use tally_core::record::{
    EventRecord, NewRecord, OriginatorFilter, RecordKind, RecordOrder, RecordQuery, TopicFilter,
};
use tally_core::store::{RecordStore, UnitOfWork};

const SELECT_COLUMNS: &str = "SELECT record_id, kind, topic, originator_id, originator_version, \
     state, recorded_at FROM event_records WHERE kind = ";

/// PostgreSQL-backed record store.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Creates a new `PgRecordStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Row shape of `event_records`.
#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    record_id: Uuid,
    kind: i16,
    topic: String,
    originator_id: i64,
    originator_version: i64,
    state: serde_json::Value,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for EventRecord {
    type Error = DomainError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            record_id: row.record_id,
            kind: RecordKind::from_code(row.kind)?,
            topic: row.topic,
            originator_id: from_bigint(row.originator_id)?,
            originator_version: from_bigint(row.originator_version)?,
            state: row.state,
            timestamp: row.recorded_at,
        })
    }
}

fn to_bigint(value: u64) -> Result<i64, DomainError> {
    i64::try_from(value)
        .map_err(|_| DomainError::Validation(format!("{value} does not fit in a BIGINT column")))
}

fn from_bigint(value: i64) -> Result<u64, DomainError> {
    u64::try_from(value)
        .map_err(|_| DomainError::Infrastructure(format!("negative value {value} in event_records")))
}

fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}

/// A unit of work wrapping one database transaction.
///
/// Dropping an uncommitted unit rolls the transaction back.
#[derive(Debug)]
pub struct PgUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgUnitOfWork {
    /// Opens a transaction on `pool`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if no connection can be acquired.
    pub async fn begin(pool: &PgPool) -> Result<Self, DomainError> {
        let tx = pool.begin().await.map_err(infrastructure)?;
        Ok(Self { tx: Some(tx) })
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    #[instrument(skip(self, record), fields(kind = %record.kind, topic = %record.topic, originator_id = record.originator_id, originator_version = record.originator_version))]
    async fn append(&mut self, record: NewRecord) -> Result<EventRecord, DomainError> {
        let tx = self.tx.as_mut().ok_or(DomainError::TransactionRequired)?;
        record.validate()?;

        let row = sqlx::query_as::<_, RecordRow>(
            r"
            INSERT INTO event_records (record_id, kind, topic, originator_id, originator_version, state)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING record_id, kind, topic, originator_id, originator_version, state, recorded_at
            ",
        )
        .bind(Uuid::now_v7())
        .bind(record.kind.code())
        .bind(&record.topic)
        .bind(to_bigint(record.originator_id)?)
        .bind(to_bigint(record.originator_version)?)
        .bind(&record.state)
        .fetch_one(&mut **tx)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                warn!("record slot already taken");
                DomainError::DuplicateRecord {
                    kind: record.kind,
                    originator_id: record.originator_id,
                    originator_version: record.originator_version,
                }
            }
            other => infrastructure(other),
        })?;

        EventRecord::try_from(row)
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        let tx = self.tx.take().ok_or(DomainError::TransactionRequired)?;
        tx.commit().await.map_err(infrastructure)
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(infrastructure),
            None => Ok(()),
        }
    }
}

/// Translates a `RecordQuery` into SQL. Every value is bound, never inlined.
fn build_query(query: &RecordQuery) -> Result<QueryBuilder<'static, Postgres>, DomainError> {
    let mut builder = QueryBuilder::<Postgres>::new(SELECT_COLUMNS);
    builder.push_bind(query.kind.code());

    match &query.topic {
        TopicFilter::Exact(topic) => {
            builder.push(" AND topic = ").push_bind(topic.clone());
        }
        TopicFilter::Prefix(prefix) => {
            builder
                .push(" AND starts_with(topic, ")
                .push_bind(prefix.clone())
                .push(")");
        }
    }

    match &query.originators {
        OriginatorFilter::One(id) => {
            builder.push(" AND originator_id = ").push_bind(to_bigint(*id)?);
        }
        OriginatorFilter::Any(ids) => {
            let ids = ids
                .iter()
                .map(|id| to_bigint(*id))
                .collect::<Result<Vec<_>, _>>()?;
            builder.push(" AND originator_id = ANY(").push_bind(ids).push(")");
        }
        OriginatorFilter::Trailing(bounds) => {
            builder.push(" AND (");
            for (index, bound) in bounds.iter().enumerate() {
                if index > 0 {
                    builder.push(" OR ");
                }
                builder
                    .push("(originator_id = ")
                    .push_bind(to_bigint(bound.originator_id)?);
                if let Some(version) = bound.from_version {
                    builder
                        .push(" AND originator_version >= ")
                        .push_bind(to_bigint(version)?);
                }
                builder.push(")");
            }
            builder.push(")");
        }
    }

    if let Some(version) = query.version_lt {
        builder
            .push(" AND originator_version < ")
            .push_bind(to_bigint(version)?);
    }
    if let Some(version) = query.version_lte {
        builder
            .push(" AND originator_version <= ")
            .push_bind(to_bigint(version)?);
    }
    if let Some(version) = query.version_gte {
        builder
            .push(" AND originator_version >= ")
            .push_bind(to_bigint(version)?);
    }
    if let Some(at) = query.timestamp_lte {
        builder.push(" AND recorded_at <= ").push_bind(at);
    }

    match query.order {
        RecordOrder::Ascending => {
            builder.push(" ORDER BY originator_id ASC, originator_version ASC");
        }
        RecordOrder::Descending => {
            builder.push(" ORDER BY originator_id DESC, originator_version DESC");
        }
    }

    if let Some(limit) = query.limit {
        builder.push(" LIMIT ").push_bind(i64::from(limit));
    }

    Ok(builder)
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>, DomainError> {
        Ok(Box::new(PgUnitOfWork::begin(&self.pool).await?))
    }

    #[instrument(skip(self, query), fields(kind = %query.kind))]
    async fn query(&self, query: &RecordQuery) -> Result<Vec<EventRecord>, DomainError> {
        if query.originators.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = build_query(query)?;
        let rows = builder
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
        debug!(rows = rows.len(), "query returned");

        rows.into_iter().map(EventRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::TimeZone;
    use sqlx::Execute;
    use tally_core::record::TrailingBound;

    use super::*;

    #[test]
    fn test_single_aggregate_query_sql() {
        let query = RecordQuery::snapshots("Order", OriginatorFilter::One(7))
            .version_at_most(3)
            .newest_first()
            .limit(1);

        let mut builder = build_query(&query).unwrap();
        let sql = builder.build().sql().to_owned();

        assert_eq!(
            sql,
            "SELECT record_id, kind, topic, originator_id, originator_version, state, \
             recorded_at FROM event_records WHERE kind = $1 AND topic = $2 \
             AND originator_id = $3 AND originator_version <= $4 \
             ORDER BY originator_id DESC, originator_version DESC LIMIT $5"
        );
    }

    #[test]
    fn test_set_membership_uses_any() {
        let query = RecordQuery::snapshots("Order", OriginatorFilter::Any(BTreeSet::from([1, 2])));

        let mut builder = build_query(&query).unwrap();
        let sql = builder.build().sql().to_owned();

        assert!(sql.contains("AND originator_id = ANY($3)"));
    }

    #[test]
    fn test_trailing_bounds_build_one_disjunction() {
        let until = Utc.with_ymd_and_hms(2026, 3, 4, 11, 0, 0).unwrap();
        let query = RecordQuery::events(
            "Order.",
            OriginatorFilter::Trailing(vec![
                TrailingBound {
                    originator_id: 1,
                    from_version: None,
                },
                TrailingBound {
                    originator_id: 2,
                    from_version: Some(4),
                },
            ]),
        )
        .recorded_until(until);

        let mut builder = build_query(&query).unwrap();
        let sql = builder.build().sql().to_owned();

        assert!(sql.contains("AND starts_with(topic, $2)"));
        assert!(sql.contains(
            "AND ((originator_id = $3) OR (originator_id = $4 AND originator_version >= $5))"
        ));
        assert!(sql.contains("AND recorded_at <= $6"));
        assert!(sql.ends_with("ORDER BY originator_id ASC, originator_version ASC"));
    }

    #[test]
    fn test_versions_beyond_bigint_are_rejected() {
        let query = RecordQuery::events("Order.", OriginatorFilter::One(u64::MAX));

        assert!(matches!(build_query(&query), Err(DomainError::Validation(_))));
    }
}
