use std::str::FromStr;

use async_trait::async_trait;
use mockall::automock;
use sqlx::{PgPool, Postgres, Row};
use thiserror::Error;

use super::TelemetryRecord;

/// How to resolve an existing row for the same block height. Overwrite corrects stale
/// data on recomputation; IgnoreIfPresent makes historical re-runs a no-op.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    #[default]
    Overwrite,
    IgnoreIfPresent,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "ignore-if-present" => Ok(ConflictPolicy::IgnoreIfPresent),
            other => Err(format!("unknown conflict policy {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    Skipped,
}

#[derive(Debug, Error)]
#[error("emissions store failure")]
pub struct StorageError(#[from] sqlx::Error);

#[automock]
#[async_trait]
pub trait EmissionsStore {
    /// Upsert a record keyed by block height in a single atomic statement.
    async fn write(
        &self,
        record: &TelemetryRecord,
        policy: ConflictPolicy,
    ) -> Result<WriteOutcome, StorageError>;
    async fn record_at(&self, block_height: i64) -> Result<Option<TelemetryRecord>, StorageError>;
}

pub struct EmissionsStorePostgres {
    db_pool: PgPool,
}

impl EmissionsStorePostgres {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl EmissionsStore for EmissionsStorePostgres {
    async fn write(
        &self,
        record: &TelemetryRecord,
        policy: ConflictPolicy,
    ) -> Result<WriteOutcome, StorageError> {
        match policy {
            ConflictPolicy::Overwrite => {
                // xmax = 0 distinguishes a fresh insert from a conflict update.
                let row = sqlx::query(
                    "
                    INSERT INTO emissions (
                        block_height, block_timestamp, block_date_time,
                        prev_block_height, prev_block_timestamp,
                        interval_seconds, money_supply, block_reward
                    )
                    VALUES ($1, $2, to_timestamp($2::double precision), $3, $4, $5, $6, $7)
                    ON CONFLICT (block_height) DO UPDATE SET
                        block_timestamp = excluded.block_timestamp,
                        block_date_time = excluded.block_date_time,
                        prev_block_height = excluded.prev_block_height,
                        prev_block_timestamp = excluded.prev_block_timestamp,
                        interval_seconds = excluded.interval_seconds,
                        money_supply = excluded.money_supply,
                        block_reward = excluded.block_reward
                    RETURNING (xmax = 0) AS inserted
                    ",
                )
                .bind(record.block_height)
                .bind(record.block_timestamp)
                .bind(record.prev_block_height)
                .bind(record.prev_block_timestamp)
                .bind(record.interval_seconds)
                .bind(record.money_supply)
                .bind(record.block_reward)
                .fetch_one(&self.db_pool)
                .await?;

                let inserted: bool = row.try_get("inserted")?;
                if inserted {
                    Ok(WriteOutcome::Inserted)
                } else {
                    Ok(WriteOutcome::Updated)
                }
            }
            ConflictPolicy::IgnoreIfPresent => {
                let result = sqlx::query(
                    "
                    INSERT INTO emissions (
                        block_height, block_timestamp, block_date_time,
                        prev_block_height, prev_block_timestamp,
                        interval_seconds, money_supply, block_reward
                    )
                    VALUES ($1, $2, to_timestamp($2::double precision), $3, $4, $5, $6, $7)
                    ON CONFLICT (block_height) DO NOTHING
                    ",
                )
                .bind(record.block_height)
                .bind(record.block_timestamp)
                .bind(record.prev_block_height)
                .bind(record.prev_block_timestamp)
                .bind(record.interval_seconds)
                .bind(record.money_supply)
                .bind(record.block_reward)
                .execute(&self.db_pool)
                .await?;

                if result.rows_affected() == 0 {
                    Ok(WriteOutcome::Skipped)
                } else {
                    Ok(WriteOutcome::Inserted)
                }
            }
        }
    }

    async fn record_at(&self, block_height: i64) -> Result<Option<TelemetryRecord>, StorageError> {
        let record = sqlx::query_as::<Postgres, TelemetryRecord>(
            "
            SELECT
                block_height, block_timestamp, prev_block_height,
                prev_block_timestamp, interval_seconds, money_supply, block_reward
            FROM
                emissions
            WHERE
                block_height = $1
            ",
        )
        .bind(block_height)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use test_context::test_context;

    use crate::db::tests::TestDb;

    use super::*;

    fn record_at_height(height: i64) -> TelemetryRecord {
        TelemetryRecord {
            block_height: height,
            block_timestamp: 1_700_000_100,
            prev_block_height: height - 1,
            prev_block_timestamp: 1_700_000_000,
            interval_seconds: 100,
            money_supply: Some(dec!(21000000.123)),
            block_reward: Some(dec!(2.6)),
        }
    }

    #[test_context(TestDb)]
    #[tokio::test]
    async fn ignore_if_present_is_idempotent_test(test_db: &TestDb) {
        let store = EmissionsStorePostgres::new(test_db.pool.clone());
        let record = record_at_height(1000);

        let first = store
            .write(&record, ConflictPolicy::IgnoreIfPresent)
            .await
            .unwrap();
        assert_eq!(first, WriteOutcome::Inserted);

        let mut rerun = record.clone();
        rerun.block_reward = Some(dec!(9.9));
        let second = store
            .write(&rerun, ConflictPolicy::IgnoreIfPresent)
            .await
            .unwrap();
        assert_eq!(second, WriteOutcome::Skipped);

        // The stored row is the one the first write produced.
        let stored = store.record_at(1000).await.unwrap().unwrap();
        assert_eq!(stored, record);
    }

    #[test_context(TestDb)]
    #[tokio::test]
    async fn overwrite_replaces_every_field_test(test_db: &TestDb) {
        let store = EmissionsStorePostgres::new(test_db.pool.clone());

        let record_a = record_at_height(1000);
        let record_b = TelemetryRecord {
            block_height: 1000,
            block_timestamp: 1_700_000_200,
            prev_block_height: 999,
            prev_block_timestamp: 1_700_000_050,
            interval_seconds: 150,
            money_supply: None,
            block_reward: Some(dec!(5.0)),
        };

        let first = store
            .write(&record_a, ConflictPolicy::Overwrite)
            .await
            .unwrap();
        assert_eq!(first, WriteOutcome::Inserted);

        let second = store
            .write(&record_b, ConflictPolicy::Overwrite)
            .await
            .unwrap();
        assert_eq!(second, WriteOutcome::Updated);

        let stored = store.record_at(1000).await.unwrap().unwrap();
        assert_eq!(stored, record_b);
    }

    #[test_context(TestDb)]
    #[tokio::test]
    async fn absent_economics_are_stored_as_null_test(test_db: &TestDb) {
        let store = EmissionsStorePostgres::new(test_db.pool.clone());

        let mut record = record_at_height(1000);
        record.money_supply = None;
        record.block_reward = None;

        store
            .write(&record, ConflictPolicy::Overwrite)
            .await
            .unwrap();

        let stored = store.record_at(1000).await.unwrap().unwrap();
        assert_eq!(stored.money_supply, None);
        assert_eq!(stored.block_reward, None);
        assert_eq!(stored.interval_seconds, 100);
    }

    #[test_context(TestDb)]
    #[tokio::test]
    async fn record_at_missing_height_test(test_db: &TestDb) {
        let store = EmissionsStorePostgres::new(test_db.pool.clone());
        assert_eq!(store.record_at(42).await.unwrap(), None);
    }

    #[test]
    fn conflict_policy_from_str_test() {
        assert_eq!(
            ConflictPolicy::from_str("overwrite").unwrap(),
            ConflictPolicy::Overwrite
        );
        assert_eq!(
            ConflictPolicy::from_str("IGNORE-IF-PRESENT").unwrap(),
            ConflictPolicy::IgnoreIfPresent
        );
        assert!(ConflictPolicy::from_str("merge").is_err());
    }
}
