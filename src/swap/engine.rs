use std::sync::{Arc, Mutex};

use bitcoin::{Address, Network, ScriptBuf};

use crate::chain::{ChainSource, Utxo};
use crate::error::SwapError;
use crate::lightning::invoice;
use crate::lightning::node::LightningClient;
use crate::swap::store::{PutSwap, SwapStore};
use crate::swap::{PolicyRejection, SwapRecord, keys, redeem, script};

#[derive(Debug, Clone)]
pub struct SwapEngineConfig {
    pub network: Network,
    pub default_lock_height: u16,
    /// Lower bound on the redeem fee rate in sat per kilo-weight.
    pub fee_per_kweight_floor: u64,
    /// Largest deposit the service will redeem, in satoshis.
    pub max_swap_amount_sat: u64,
}

pub struct SwapEngine {
    cfg: SwapEngineConfig,
    chain: Arc<dyn ChainSource>,
    ln: Arc<dyn LightningClient>,
    store: Arc<Mutex<SwapStore>>,
}

#[derive(Debug, Clone)]
pub struct CreatedSwap {
    pub address: Address,
    pub script: Vec<u8>,
    pub swapper_pubkey: [u8; 33],
    pub lock_height: i64,
}

#[derive(Debug, Clone)]
pub struct UnspentReport {
    pub total_sat: u64,
    pub lock_height: i64,
    pub utxos: Vec<Utxo>,
}

/// Policy refusals and node-side pay failures are outcomes, not errors;
/// only infrastructure faults surface as `SwapError`.
#[derive(Debug, Clone)]
pub enum SwapPaymentOutcome {
    Rejected {
        rejection: PolicyRejection,
        detail: String,
    },
    PaymentFailed {
        payment_error: String,
    },
    Redeemed {
        txid: String,
        payment_error: String,
    },
}

impl SwapEngine {
    pub fn new(
        cfg: SwapEngineConfig,
        chain: Arc<dyn ChainSource>,
        ln: Arc<dyn LightningClient>,
        store: Arc<Mutex<SwapStore>>,
    ) -> Self {
        Self {
            cfg,
            chain,
            ln,
            store,
        }
    }

    pub fn network(&self) -> Network {
        self.cfg.network
    }

    pub fn init(&self, payer_pubkey: &[u8], payment_hash: &[u8]) -> Result<CreatedSwap, SwapError> {
        let payer_pubkey: [u8; 33] = payer_pubkey
            .try_into()
            .map_err(|_| SwapError::InvalidInput("pubkey must be 33 bytes compressed".to_string()))?;
        let payment_hash: [u8; 32] = payment_hash
            .try_into()
            .map_err(|_| SwapError::InvalidInput("payment hash must be 32 bytes".to_string()))?;

        let existing = self
            .store
            .lock()
            .expect("store mutex poisoned")
            .get_swap(&payment_hash)
            .map_err(store_unavailable)?;
        if existing.is_some() {
            return Err(SwapError::Duplicate);
        }

        let (swapper_key, swapper_pubkey) = keys::new_swapper_key();
        let lock_height = i64::from(self.cfg.default_lock_height);
        let witness_script =
            script::submarine_swap_script(&swapper_pubkey, &payer_pubkey, &payment_hash, lock_height)?;
        let address = script::p2wsh_address(&witness_script, self.cfg.network);

        let record = SwapRecord {
            network_id: script::network_id(self.cfg.network),
            payment_hash,
            lock_height,
            swapper_key,
            script: witness_script.to_bytes(),
        };

        match self
            .store
            .lock()
            .expect("store mutex poisoned")
            .put_swap(&record)
            .map_err(store_unavailable)?
        {
            PutSwap::Inserted => {}
            PutSwap::Duplicate => return Err(SwapError::Duplicate),
        }

        tracing::info!(
            payment_hash = %hex::encode(payment_hash),
            address = %address,
            lock_height,
            "submarine swap created"
        );

        Ok(CreatedSwap {
            address,
            script: record.script,
            swapper_pubkey,
            lock_height,
        })
    }

    pub async fn unspent_amount(&self, payment_hash: &[u8]) -> Result<UnspentReport, SwapError> {
        let payment_hash: [u8; 32] = payment_hash
            .try_into()
            .map_err(|_| SwapError::InvalidInput("payment hash must be 32 bytes".to_string()))?;

        let record = self.load_swap(&payment_hash)?;
        let address = self.swap_address(&record);
        let utxos = self.chain.utxos(&address.to_string()).await?;
        let total_sat = utxos.iter().map(|u| u.value).sum();

        tracing::info!(
            payment_hash = %hex::encode(payment_hash),
            address = %address,
            amount = total_sat,
            "unspent amount queried"
        );

        Ok(UnspentReport {
            total_sat,
            lock_height: record.lock_height,
            utxos,
        })
    }

    /// Admission pipeline for a redeem request: policy checks, the
    /// Lightning pay, then the on-chain redemption. The attempt row is
    /// written before paying so a stuck swap stays observable.
    pub async fn get_swap_payment(
        &self,
        payment_request: &str,
        dest_address: Option<Address>,
    ) -> Result<SwapPaymentOutcome, SwapError> {
        let decoded = invoice::decode(payment_request, self.cfg.network)?;
        let hash_hex = hex::encode(decoded.payment_hash);

        if decoded.amount_sat > self.cfg.max_swap_amount_sat {
            return Ok(self.reject(
                &hash_hex,
                PolicyRejection::FundsExceedLimit,
                format!(
                    "payment request amount {} is greater than max allowed {}",
                    decoded.amount_sat, self.cfg.max_swap_amount_sat
                ),
            ));
        }

        let record = self.load_swap(&decoded.payment_hash)?;
        let address = self.swap_address(&record);
        let utxos = self.chain.utxos(&address.to_string()).await?;
        if utxos.is_empty() {
            return Err(SwapError::Internal(
                "there are no utxos related to the payment request".to_string(),
            ));
        }
        let utxo_total: u64 = utxos.iter().map(|u| u.value).sum();

        let fee_per_kweight = self.fee_per_kweight().await?;
        let fees =
            redeem::estimate_redeem_fee(self.chain.as_ref(), self.cfg.network, &record, fee_per_kweight)
                .await?;
        if 2 * utxo_total <= 3 * fees {
            return Ok(self.reject(
                &hash_hex,
                PolicyRejection::TxTooSmall,
                format!("utxo total {utxo_total} cannot carry redeem fee {fees}"),
            ));
        }

        if utxo_total != decoded.amount_sat {
            return Ok(self.reject(
                &hash_hex,
                PolicyRejection::InvoiceAmountMismatch,
                format!(
                    "utxo total {} does not equal the payment request amount {}",
                    utxo_total, decoded.amount_sat
                ),
            ));
        }

        let tip_height = self.chain.current_height().await?;
        let first_height = utxos[0].block_height;
        let elapsed = i64::from(tip_height) - i64::from(first_height);
        if 4 * elapsed > 3 * record.lock_height {
            return Ok(self.reject(
                &hash_hex,
                PolicyRejection::SwapExpired,
                format!("deposit confirmed {elapsed} blocks ago, past the redeem threshold"),
            ));
        }

        self.store
            .lock()
            .expect("store mutex poisoned")
            .put_payment(&hash_hex, payment_request)
            .map_err(store_unavailable)?;

        let pay = self.ln.pay(payment_request).await?;
        let Some(preimage) = pay.preimage else {
            tracing::warn!(
                payment_hash = %hash_hex,
                amount = decoded.amount_sat,
                error = %pay.payment_error,
                "lightning payment failed"
            );
            return Ok(SwapPaymentOutcome::PaymentFailed {
                payment_error: pay.payment_error,
            });
        };
        if keys::sha256(&preimage) != decoded.payment_hash {
            return Err(SwapError::Internal(
                "node returned a preimage that does not match the payment hash".to_string(),
            ));
        }

        // broadcast failure past this point is recoverable: the preimage is
        // ours, so the redeem can be re-attempted out of band
        let dest = dest_address.unwrap_or_else(|| self.swap_address(&record));
        let (_tx, txid) = redeem::redeem(
            self.chain.as_ref(),
            self.cfg.network,
            &record,
            preimage,
            &dest,
            fee_per_kweight,
        )
        .await?;

        self.store
            .lock()
            .expect("store mutex poisoned")
            .append_txid(&hash_hex, &txid.to_string())
            .map_err(store_unavailable)?;

        tracing::info!(
            payment_hash = %hash_hex,
            amount = decoded.amount_sat,
            txid = %txid,
            "redeem transaction broadcast"
        );

        Ok(SwapPaymentOutcome::Redeemed {
            txid: txid.to_string(),
            payment_error: pay.payment_error,
        })
    }

    fn load_swap(&self, payment_hash: &[u8; 32]) -> Result<SwapRecord, SwapError> {
        self.store
            .lock()
            .expect("store mutex poisoned")
            .get_swap(payment_hash)
            .map_err(store_unavailable)?
            .ok_or(SwapError::UnknownSwap)
    }

    fn swap_address(&self, record: &SwapRecord) -> Address {
        script::p2wsh_address(&ScriptBuf::from(record.script.clone()), self.cfg.network)
    }

    async fn fee_per_kweight(&self) -> Result<u64, SwapError> {
        let sat_per_vb = self.chain.recommended_fee().await?;
        // 1 vB = 4 WU, so sat/vB * 1000 / 4 gives sat per kilo-weight
        Ok((sat_per_vb * 250).max(self.cfg.fee_per_kweight_floor))
    }

    fn reject(
        &self,
        payment_hash: &str,
        rejection: PolicyRejection,
        detail: String,
    ) -> SwapPaymentOutcome {
        tracing::info!(
            payment_hash = %payment_hash,
            error = %detail,
            "swap payment rejected: {rejection:?}"
        );
        SwapPaymentOutcome::Rejected { rejection, detail }
    }
}

fn store_unavailable(err: anyhow::Error) -> SwapError {
    SwapError::StoreUnavailable(format!("{err:#}"))
}
