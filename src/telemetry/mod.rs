mod assemble;
mod store;

use std::ops::RangeInclusive;
use std::time::Duration;

use chrono::DateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub use assemble::assemble;
pub use assemble::AssembleError;
pub use assemble::EconomicsPolicy;

pub use store::ConflictPolicy;
pub use store::EmissionsStore;
pub use store::EmissionsStorePostgres;
pub use store::MockEmissionsStore;
pub use store::StorageError;
pub use store::WriteOutcome;

use crate::explorer_api::{ExplorerApi, ExplorerError};

/// One row of per-block economic telemetry, keyed by block height. Immutable once
/// assembled; only a conflict-resolution overwrite replaces it.
#[derive(Clone, Debug, FromRow, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub block_height: i64,
    pub block_timestamp: i64,
    pub prev_block_height: i64,
    pub prev_block_timestamp: i64,
    pub interval_seconds: i32,
    pub money_supply: Option<Decimal>,
    pub block_reward: Option<Decimal>,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to resolve current chain height")]
    Height(#[source] ExplorerError),
    #[error("failed to assemble telemetry for block {height}")]
    Assemble {
        height: i64,
        #[source]
        source: AssembleError,
    },
    #[error("failed to persist telemetry for block {height}")]
    Store {
        height: i64,
        #[source]
        source: StorageError,
    },
}

/// What a finished polling cycle produced. A record with absent economic fields is
/// still worth persisting, but callers may want to alert on it.
#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    Complete {
        record: TelemetryRecord,
        write: WriteOutcome,
    },
    PartialEconomics {
        record: TelemetryRecord,
        write: WriteOutcome,
    },
}

/// Run one polling cycle: resolve the current chain height, assemble its telemetry
/// record, and persist it. Intended to be invoked repeatedly by an external scheduler.
pub async fn track_emissions(
    api: &impl ExplorerApi,
    store: &impl EmissionsStore,
    conflict_policy: ConflictPolicy,
    economics_policy: EconomicsPolicy,
) -> Result<CycleOutcome, CycleError> {
    let height = api.current_height().await.map_err(CycleError::Height)?;

    info!(height, "tracking emissions for current block");

    let record = assemble(api, height, economics_policy)
        .await
        .map_err(|source| CycleError::Assemble { height, source })?;

    let write = store
        .write(&record, conflict_policy)
        .await
        .map_err(|source| CycleError::Store { height, source })?;

    let block_time = DateTime::from_timestamp(record.block_timestamp, 0)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| record.block_timestamp.to_string());

    if record.money_supply.is_some() && record.block_reward.is_some() {
        info!(
            height,
            %block_time,
            interval_seconds = record.interval_seconds,
            ?write,
            "stored full telemetry record"
        );
        Ok(CycleOutcome::Complete { record, write })
    } else {
        warn!(
            height,
            %block_time,
            money_supply_absent = record.money_supply.is_none(),
            block_reward_absent = record.block_reward.is_none(),
            ?write,
            "stored telemetry record with absent economic fields"
        );
        Ok(CycleOutcome::PartialEconomics { record, write })
    }
}

/// Ingest a range of historical heights. Already-ingested heights are skipped, so the
/// run is safe to re-start from the beginning.
pub async fn backfill_emissions(
    api: &impl ExplorerApi,
    store: &impl EmissionsStore,
    heights: RangeInclusive<i64>,
) -> Result<(), CycleError> {
    for height in heights {
        let existing = store
            .record_at(height)
            .await
            .map_err(|source| CycleError::Store { height, source })?;
        if existing.is_some() {
            debug!(height, "height already ingested, skipping");
            continue;
        }

        let record = assemble(api, height, EconomicsPolicy::AllowAbsent)
            .await
            .map_err(|source| CycleError::Assemble { height, source })?;

        // IgnoreIfPresent keeps concurrent backfills from clobbering each other.
        let outcome = store
            .write(&record, ConflictPolicy::IgnoreIfPresent)
            .await
            .map_err(|source| CycleError::Store { height, source })?;

        info!(height, ?outcome, "backfilled telemetry record");

        // add small delay to avoid rate limiting
        sleep(Duration::from_millis(10)).await;
    }

    Ok(())
}
