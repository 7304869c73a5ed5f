use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

use crate::block_reward::{self, RewardError};
use crate::explorer_api::{BlockRef, ExplorerApi, ExplorerError};

use super::TelemetryRecord;

/// What to do when both money supply and block reward fail to resolve. The
/// positional/time fields of a record are valid on their own, so the default is to
/// persist them with absent economic fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EconomicsPolicy {
    #[default]
    AllowAbsent,
    Require,
}

impl FromStr for EconomicsPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "allow-absent" => Ok(EconomicsPolicy::AllowAbsent),
            "require" => Ok(EconomicsPolicy::Require),
            other => Err(format!("unknown economics policy {other}")),
        }
    }
}

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("block {0} has no predecessor")]
    GenesisBoundary(i64),
    #[error(
        "interval between block {height} and its predecessor is invalid: \
         {current} - {previous} = {interval}s"
    )]
    InvalidInterval {
        height: i64,
        current: i64,
        previous: i64,
        interval: i64,
    },
    #[error("no economic data available for block {height}")]
    EconomicsUnavailable { height: i64 },
    #[error(transparent)]
    Explorer(#[from] ExplorerError),
}

/// Assemble one telemetry record for `target_height` from fresh explorer lookups.
///
/// Hash and body resolution for the target block and its predecessor are hard
/// dependencies. Money supply and block reward are attempted independently and left
/// absent on failure, subject to `economics_policy`.
pub async fn assemble(
    api: &impl ExplorerApi,
    target_height: i64,
    economics_policy: EconomicsPolicy,
) -> Result<TelemetryRecord, AssembleError> {
    if target_height < 1 {
        return Err(AssembleError::GenesisBoundary(target_height));
    }

    let current = BlockRef {
        height: target_height,
        hash: api.hash_at(target_height).await?,
    };
    let previous = BlockRef {
        height: target_height - 1,
        hash: api.hash_at(target_height - 1).await?,
    };

    let current_body = api.block_body(&current.hash).await?;
    let previous_body = api.block_body(&previous.hash).await?;

    let interval = current_body.time - previous_body.time;
    // A negative interval signals a clock or reorg anomaly. Storing it would corrupt
    // every downstream rate computation.
    if interval < 0 || interval > i64::from(i32::MAX) {
        return Err(AssembleError::InvalidInterval {
            height: target_height,
            current: current_body.time,
            previous: previous_body.time,
            interval,
        });
    }

    let money_supply = match api.money_supply().await {
        Ok(supply) => Some(supply),
        Err(err) => {
            warn!(height = target_height, %err, "failed to fetch money supply");
            None
        }
    };

    let block_reward = match block_reward::resolve_reward(api, &current).await {
        Ok(estimate) => Some(estimate.total_value),
        Err(err @ RewardError::NoTransactions { .. }) => {
            warn!(height = target_height, %err, "block body is missing its coinbase");
            None
        }
        Err(err) => {
            warn!(height = target_height, %err, "failed to resolve block reward");
            None
        }
    };

    if money_supply.is_none()
        && block_reward.is_none()
        && economics_policy == EconomicsPolicy::Require
    {
        return Err(AssembleError::EconomicsUnavailable {
            height: target_height,
        });
    }

    Ok(TelemetryRecord {
        block_height: current.height,
        block_timestamp: current_body.time,
        prev_block_height: previous.height,
        prev_block_timestamp: previous_body.time,
        interval_seconds: interval as i32,
        money_supply,
        block_reward,
    })
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use rust_decimal_macros::dec;

    use crate::explorer_api::{BlockSummary, Lookup, MockExplorerApi, RawTransaction, TxOutput};

    use super::*;

    fn mock_blocks(api: &mut MockExplorerApi, current_time: i64, previous_time: i64) {
        api.expect_hash_at()
            .with(eq(1000))
            .returning(|_| Ok("A".to_string()));
        api.expect_hash_at()
            .with(eq(999))
            .returning(|_| Ok("B".to_string()));
        api.expect_block_body()
            .with(eq("A"))
            .returning(move |_| {
                Ok(BlockSummary {
                    time: current_time,
                    tx: vec!["coinbase-txid".to_string()],
                })
            });
        api.expect_block_body()
            .with(eq("B"))
            .returning(move |_| {
                Ok(BlockSummary {
                    time: previous_time,
                    tx: vec!["older-coinbase-txid".to_string()],
                })
            });
    }

    fn mock_economics_ok(api: &mut MockExplorerApi) {
        api.expect_money_supply().returning(|| Ok(dec!(100.0)));
        api.expect_raw_transaction().returning(|_| {
            Ok(RawTransaction {
                vout: vec![TxOutput {
                    value: Some(dec!(5.0)),
                }],
            })
        });
    }

    fn mock_economics_failing(api: &mut MockExplorerApi) {
        api.expect_money_supply().returning(|| {
            Err(ExplorerError::NotFound {
                lookup: Lookup::MoneySupply,
            })
        });
        api.expect_raw_transaction().returning(|txid| {
            Err(ExplorerError::NotFound {
                lookup: Lookup::RawTransaction {
                    txid: txid.to_string(),
                },
            })
        });
    }

    #[tokio::test]
    async fn assemble_computes_interval_test() {
        let mut api = MockExplorerApi::new();
        mock_blocks(&mut api, 1_700_000_100, 1_700_000_000);
        mock_economics_ok(&mut api);

        let record = assemble(&api, 1000, EconomicsPolicy::AllowAbsent)
            .await
            .unwrap();
        assert_eq!(record.block_height, 1000);
        assert_eq!(record.prev_block_height, 999);
        assert_eq!(record.interval_seconds, 100);
        assert_eq!(record.block_timestamp, 1_700_000_100);
        assert_eq!(record.prev_block_timestamp, 1_700_000_000);
    }

    #[tokio::test]
    async fn genesis_has_no_predecessor_test() {
        let api = MockExplorerApi::new();
        let err = assemble(&api, 0, EconomicsPolicy::AllowAbsent)
            .await
            .unwrap_err();
        assert!(matches!(err, AssembleError::GenesisBoundary(0)));
    }

    #[tokio::test]
    async fn negative_interval_is_rejected_test() {
        let mut api = MockExplorerApi::new();
        mock_blocks(&mut api, 1_700_000_000, 1_700_000_100);

        let err = assemble(&api, 1000, EconomicsPolicy::AllowAbsent)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AssembleError::InvalidInterval { interval: -100, .. }
        ));
    }

    #[tokio::test]
    async fn hash_resolution_failure_is_fatal_test() {
        let mut api = MockExplorerApi::new();
        api.expect_hash_at().with(eq(1000)).returning(|height| {
            Err(ExplorerError::NotFound {
                lookup: Lookup::BlockHash { height },
            })
        });

        let err = assemble(&api, 1000, EconomicsPolicy::AllowAbsent)
            .await
            .unwrap_err();
        assert!(matches!(err, AssembleError::Explorer(_)));
    }

    #[tokio::test]
    async fn both_economics_failing_is_soft_by_default_test() {
        let mut api = MockExplorerApi::new();
        mock_blocks(&mut api, 1_700_000_100, 1_700_000_000);
        mock_economics_failing(&mut api);

        let record = assemble(&api, 1000, EconomicsPolicy::AllowAbsent)
            .await
            .unwrap();
        assert_eq!(record.money_supply, None);
        assert_eq!(record.block_reward, None);
        assert_eq!(record.interval_seconds, 100);
    }

    #[tokio::test]
    async fn both_economics_failing_aborts_under_require_test() {
        let mut api = MockExplorerApi::new();
        mock_blocks(&mut api, 1_700_000_100, 1_700_000_000);
        mock_economics_failing(&mut api);

        let err = assemble(&api, 1000, EconomicsPolicy::Require)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AssembleError::EconomicsUnavailable { height: 1000 }
        ));
    }

    #[test]
    fn economics_policy_from_str_test() {
        assert_eq!(
            EconomicsPolicy::from_str("allow-absent").unwrap(),
            EconomicsPolicy::AllowAbsent
        );
        assert_eq!(
            EconomicsPolicy::from_str("REQUIRE").unwrap(),
            EconomicsPolicy::Require
        );
        assert!(EconomicsPolicy::from_str("sometimes").is_err());
    }
}
