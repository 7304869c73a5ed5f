use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use format_url::FormatUrl;
use mockall::automock;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::env::ENV_CONFIG;

use super::{BlockSummary, RawTransaction};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Which explorer lookup failed, including the key that was requested.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    BlockCount,
    BlockHash { height: i64 },
    Block { hash: String },
    RawTransaction { txid: String },
    MoneySupply,
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::BlockCount => write!(f, "block count"),
            Lookup::BlockHash { height } => write!(f, "hash of block {height}"),
            Lookup::Block { hash } => write!(f, "body of block {hash}"),
            Lookup::RawTransaction { txid } => write!(f, "raw transaction {txid}"),
            Lookup::MoneySupply => write!(f, "money supply"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("failed to reach explorer fetching {lookup}")]
    Transport {
        lookup: Lookup,
        #[source]
        source: reqwest::Error,
    },
    #[error("explorer returned a malformed {lookup}: {detail}")]
    Protocol { lookup: Lookup, detail: String },
    #[error("explorer has no data for {lookup}")]
    NotFound { lookup: Lookup },
}

/// Typed lookups over the explorer's read-only API. No retries here, retry policy
/// belongs to the caller.
#[automock]
#[async_trait]
pub trait ExplorerApi {
    async fn current_height(&self) -> Result<i64, ExplorerError>;
    async fn hash_at(&self, height: i64) -> Result<String, ExplorerError>;
    async fn block_body(&self, hash: &str) -> Result<BlockSummary, ExplorerError>;
    async fn raw_transaction(&self, txid: &str) -> Result<RawTransaction, ExplorerError>;
    async fn money_supply(&self) -> Result<Decimal, ExplorerError>;
}

#[derive(Clone)]
pub struct ExplorerApiHttp {
    api_url: String,
    client: reqwest::Client,
    ext_url: String,
}

impl ExplorerApiHttp {
    pub fn new(api_url: &str, ext_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build explorer http client");

        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            client,
            ext_url: ext_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(&ENV_CONFIG.api_base_url, &ENV_CONFIG.ext_base_url)
    }

    async fn get_text(&self, url: String, lookup: &Lookup) -> Result<String, ExplorerError> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ExplorerError::Transport {
                lookup: lookup.clone(),
                source,
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ExplorerError::NotFound {
                lookup: lookup.clone(),
            });
        }

        response
            .error_for_status()
            .map_err(|source| ExplorerError::Transport {
                lookup: lookup.clone(),
                source,
            })?
            .text()
            .await
            .map_err(|source| ExplorerError::Transport {
                lookup: lookup.clone(),
                source,
            })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        lookup: &Lookup,
    ) -> Result<T, ExplorerError> {
        let body = self.get_text(url, lookup).await?;
        serde_json::from_str(&body).map_err(|err| ExplorerError::Protocol {
            lookup: lookup.clone(),
            detail: err.to_string(),
        })
    }
}

#[async_trait]
impl ExplorerApi for ExplorerApiHttp {
    async fn current_height(&self) -> Result<i64, ExplorerError> {
        let lookup = Lookup::BlockCount;
        let url = FormatUrl::new(&self.api_url)
            .with_path_template("/getblockcount")
            .format_url();

        let body = self.get_text(url, &lookup).await?;
        body.trim().parse::<i64>().map_err(|err| ExplorerError::Protocol {
            lookup,
            detail: format!("expected integer block count, got {:?}: {err}", body.trim()),
        })
    }

    async fn hash_at(&self, height: i64) -> Result<String, ExplorerError> {
        let lookup = Lookup::BlockHash { height };
        let index = height.to_string();
        let url = FormatUrl::new(&self.api_url)
            .with_path_template("/getblockhash")
            .with_query_params(vec![("index", index.as_str())])
            .format_url();

        let body = self.get_text(url, &lookup).await?;
        let hash = body.trim();
        if hash.is_empty() {
            Err(ExplorerError::Protocol {
                lookup,
                detail: "expected block hash, got empty body".to_string(),
            })
        } else {
            Ok(hash.to_string())
        }
    }

    async fn block_body(&self, hash: &str) -> Result<BlockSummary, ExplorerError> {
        let lookup = Lookup::Block {
            hash: hash.to_string(),
        };
        let url = FormatUrl::new(&self.api_url)
            .with_path_template("/getblock")
            .with_query_params(vec![("hash", hash)])
            .format_url();

        self.get_json(url, &lookup).await
    }

    async fn raw_transaction(&self, txid: &str) -> Result<RawTransaction, ExplorerError> {
        let lookup = Lookup::RawTransaction {
            txid: txid.to_string(),
        };
        let url = FormatUrl::new(&self.api_url)
            .with_path_template("/getrawtransaction")
            .with_query_params(vec![("txid", txid), ("decrypt", "1")])
            .format_url();

        self.get_json(url, &lookup).await
    }

    async fn money_supply(&self) -> Result<Decimal, ExplorerError> {
        let lookup = Lookup::MoneySupply;
        let url = FormatUrl::new(&self.ext_url)
            .with_path_template("/getmoneysupply")
            .format_url();

        let body = self.get_text(url, &lookup).await?;
        Decimal::from_str(body.trim()).map_err(|err| ExplorerError::Protocol {
            lookup,
            detail: format!("expected decimal money supply, got {:?}: {err}", body.trim()),
        })
    }
}
