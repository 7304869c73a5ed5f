mod client;

use rust_decimal::Decimal;
use serde::Deserialize;

pub use client::ExplorerApi;
pub use client::ExplorerApiHttp;
pub use client::ExplorerError;
pub use client::Lookup;
pub use client::MockExplorerApi;

/// A block pinned by both height and hash. The hash is only ever produced by a trusted
/// lookup by height.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRef {
    pub height: i64,
    pub hash: String,
}

/// The fields of a block body the pipeline cares about. The first txid is the coinbase.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct BlockSummary {
    pub time: i64,
    pub tx: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TxOutput {
    // Data-only outputs carry no monetary value.
    pub value: Option<Decimal>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RawTransaction {
    pub vout: Vec<TxOutput>,
}
