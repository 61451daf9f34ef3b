use std::time::Duration;

use async_trait::async_trait;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::{Transaction, Txid};
use serde::Deserialize;

use crate::error::SwapError;

pub const DEFAULT_BASE_URL: &str = "https://mempool.space/api";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A confirmed output on a swap address; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    pub value: u64,
    pub block_height: u32,
}

#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Minimum fee recommendation in sat/vB.
    async fn recommended_fee(&self) -> Result<u64, SwapError>;

    /// Confirmed utxos on `address`; outpoints come from the provider's
    /// `txid`/`vout` fields.
    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>, SwapError>;

    async fn current_height(&self) -> Result<u32, SwapError>;

    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, SwapError>;
}

#[derive(Debug, Clone)]
pub struct MempoolClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RecommendedFees {
    #[serde(rename = "minimumFee")]
    minimum_fee: u64,
}

#[derive(Debug, Deserialize)]
struct AddressUtxo {
    txid: Txid,
    vout: u32,
    status: UtxoStatus,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct UtxoStatus {
    confirmed: bool,
    block_height: Option<u32>,
}

impl MempoolClient {
    pub fn new(base_url: &str) -> Result<Self, SwapError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SwapError::ChainUnavailable(format!("build http client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, SwapError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SwapError::ChainUnavailable(format!("GET {url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(SwapError::ChainUnavailable(format!(
                "GET {url}: status {}",
                resp.status()
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChainSource for MempoolClient {
    async fn recommended_fee(&self) -> Result<u64, SwapError> {
        let fees: RecommendedFees = self
            .get("/v1/fees/recommended")
            .await?
            .json()
            .await
            .map_err(|e| SwapError::ChainUnavailable(format!("decode recommended fees: {e}")))?;
        Ok(fees.minimum_fee)
    }

    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>, SwapError> {
        let entries: Vec<AddressUtxo> = self
            .get(&format!("/address/{address}/utxo"))
            .await?
            .json()
            .await
            .map_err(|e| SwapError::ChainUnavailable(format!("decode address utxos: {e}")))?;
        Ok(confirmed_utxos(entries))
    }

    async fn current_height(&self) -> Result<u32, SwapError> {
        let body = self
            .get("/blocks/tip/height")
            .await?
            .text()
            .await
            .map_err(|e| SwapError::ChainUnavailable(format!("read tip height: {e}")))?;
        parse_height(&body)
    }

    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, SwapError> {
        let url = format!("{}/tx", self.base_url);
        let resp = self
            .client
            .post(&url)
            .body(serialize_hex(tx))
            .send()
            .await
            .map_err(|e| SwapError::ChainUnavailable(format!("POST {url}: {e}")))?;
        if !resp.status().is_success() {
            return Err(SwapError::ChainUnavailable(format!(
                "POST {url}: status {}",
                resp.status()
            )));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| SwapError::ChainUnavailable(format!("read broadcast response: {e}")))?;
        body.trim()
            .parse()
            .map_err(|_| SwapError::ChainUnavailable(format!("unexpected txid response: {body:?}")))
    }
}

/// The tip-height endpoint answers with an ASCII decimal integer.
fn parse_height(body: &str) -> Result<u32, SwapError> {
    body.trim()
        .parse()
        .map_err(|_| SwapError::ChainUnavailable(format!("unexpected tip height response: {body:?}")))
}

fn confirmed_utxos(entries: Vec<AddressUtxo>) -> Vec<Utxo> {
    entries
        .into_iter()
        .filter(|e| e.status.confirmed)
        .filter_map(|e| {
            Some(Utxo {
                txid: e.txid,
                vout: e.vout,
                value: e.value,
                block_height: e.status.block_height?,
            })
        })
        .collect()
}
