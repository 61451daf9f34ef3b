use std::str::FromStr as _;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bitcoin::hashes::{Hash as _, sha256};
use bitcoin::key::CompressedPublicKey;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::{Address, Network, Transaction, Txid};
use lightning_invoice::{Currency, InvoiceBuilder, PaymentSecret};

use subswapd::chain::{ChainSource, Utxo};
use subswapd::error::SwapError;
use subswapd::lightning::node::{LightningClient, PayOutcome};
use subswapd::swap::engine::{SwapEngine, SwapEngineConfig, SwapPaymentOutcome};
use subswapd::swap::store::SwapStore;
use subswapd::swap::{PolicyRejection, keys};

struct FakeChain {
    fee_sat_per_vb: u64,
    height: u32,
    utxos: Vec<Utxo>,
    broadcasts: Mutex<Vec<Transaction>>,
}

impl FakeChain {
    fn new(height: u32, utxos: Vec<Utxo>) -> Arc<Self> {
        Arc::new(Self {
            fee_sat_per_vb: 0,
            height,
            utxos,
            broadcasts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChainSource for FakeChain {
    async fn recommended_fee(&self) -> Result<u64, SwapError> {
        Ok(self.fee_sat_per_vb)
    }

    async fn utxos(&self, _address: &str) -> Result<Vec<Utxo>, SwapError> {
        Ok(self.utxos.clone())
    }

    async fn current_height(&self) -> Result<u32, SwapError> {
        Ok(self.height)
    }

    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, SwapError> {
        self.broadcasts.lock().unwrap().push(tx.clone());
        Ok(tx.compute_txid())
    }
}

struct FakeLightning {
    preimage: Option<[u8; 32]>,
    payment_error: String,
}

#[async_trait]
impl LightningClient for FakeLightning {
    async fn pay(&self, _payment_request: &str) -> Result<PayOutcome, SwapError> {
        Ok(PayOutcome {
            preimage: self.preimage,
            payment_error: self.payment_error.clone(),
        })
    }
}

struct Harness {
    engine: SwapEngine,
    chain: Arc<FakeChain>,
    store: Arc<Mutex<SwapStore>>,
    _dir: tempfile::TempDir,
}

fn harness(
    chain: Arc<FakeChain>,
    ln: FakeLightning,
    fee_per_kweight_floor: u64,
    max_swap_amount_sat: u64,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Mutex::new(
        SwapStore::open(dir.path().join("swap.sqlite3")).unwrap(),
    ));
    let cfg = SwapEngineConfig {
        network: Network::Regtest,
        default_lock_height: 288,
        fee_per_kweight_floor,
        max_swap_amount_sat,
    };
    let engine = SwapEngine::new(cfg, chain.clone(), Arc::new(ln), store.clone());
    Harness {
        engine,
        chain,
        store,
        _dir: dir,
    }
}

fn settled_ln(preimage: [u8; 32]) -> FakeLightning {
    FakeLightning {
        preimage: Some(preimage),
        payment_error: String::new(),
    }
}

fn utxo(vout: u32, value: u64, block_height: u32) -> Utxo {
    let txid = Txid::from_str("1f2d3a774af54a6c2e3f7e073e6b1a3d10516f2e53c0a3f9b0e93e1e6a7b8c9d")
        .unwrap();
    Utxo {
        txid,
        vout,
        value,
        block_height,
    }
}

fn invoice_for(preimage: &[u8; 32], amount_sat: Option<u64>) -> String {
    let payment_hash = sha256::Hash::hash(preimage);
    let node_key = SecretKey::from_slice(&[0x42; 32]).unwrap();
    let secp = Secp256k1::new();

    let mut builder = InvoiceBuilder::new(Currency::Regtest)
        .description("submarine swap".to_string())
        .payment_hash(payment_hash)
        .payment_secret(PaymentSecret([7u8; 32]))
        .current_timestamp()
        .min_final_cltv_expiry_delta(144);
    if let Some(amount_sat) = amount_sat {
        builder = builder.amount_milli_satoshis(amount_sat * 1000);
    }
    builder
        .build_signed(|hash| secp.sign_ecdsa_recoverable(hash, &node_key))
        .unwrap()
        .to_string()
}

fn payer_pubkey() -> [u8; 33] {
    let (_, pubkey) = keys::new_swapper_key();
    pubkey
}

fn p2wpkh_dest() -> Address {
    let (_, pubkey) = keys::new_swapper_key();
    let pubkey = CompressedPublicKey::from_slice(&pubkey).unwrap();
    Address::p2wpkh(&pubkey, Network::Regtest)
}

/// Draft weight of a one-input redeem paying a P2WPKH output.
const ONE_INPUT_REDEEM_WEIGHT: u64 = 4 * 82 + 209;

#[tokio::test]
async fn create_returns_p2wsh_address_and_rejects_duplicates() {
    let h = harness(
        FakeChain::new(700_000, vec![]),
        settled_ln([0u8; 32]),
        253,
        4_000_000,
    );
    let payment_hash = keys::sha256(b"preimage-A");

    let created = h.engine.init(&payer_pubkey(), &payment_hash).unwrap();
    assert_eq!(created.lock_height, 288);

    let spk = created.address.script_pubkey();
    assert_eq!(spk.as_bytes()[0], 0x00);
    assert_eq!(spk.as_bytes()[1], 0x20);
    assert_eq!(&spk.as_bytes()[2..], &keys::sha256(&created.script));

    assert!(matches!(
        h.engine.init(&payer_pubkey(), &payment_hash),
        Err(SwapError::Duplicate)
    ));

    assert!(matches!(
        h.engine.init(&payer_pubkey()[..32], &payment_hash),
        Err(SwapError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn unspent_amount_reports_totals_and_lock_height() {
    let h = harness(
        FakeChain::new(700_006, vec![utxo(0, 100_000, 700_000)]),
        settled_ln([0u8; 32]),
        253,
        4_000_000,
    );
    let payment_hash = keys::sha256(b"preimage-B");
    h.engine.init(&payer_pubkey(), &payment_hash).unwrap();

    let report = h.engine.unspent_amount(&payment_hash).await.unwrap();
    assert_eq!(report.total_sat, 100_000);
    assert_eq!(report.lock_height, 288);
    assert_eq!(report.utxos.len(), 1);
    assert_eq!(report.utxos[0].block_height, 700_000);

    let unknown = keys::sha256(b"never-created");
    assert!(matches!(
        h.engine.unspent_amount(&unknown).await,
        Err(SwapError::UnknownSwap)
    ));
}

#[tokio::test]
async fn amount_above_cap_is_rejected_without_store_mutation() {
    let preimage = *b"preimage-cap-padded-to-32-bytes!";
    let h = harness(
        FakeChain::new(700_000, vec![]),
        settled_ln(preimage),
        253,
        50_000,
    );

    let outcome = h
        .engine
        .get_swap_payment(&invoice_for(&preimage, Some(60_000)), None)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        SwapPaymentOutcome::Rejected {
            rejection: PolicyRejection::FundsExceedLimit,
            ..
        }
    ));

    let hash_hex = hex::encode(keys::sha256(&preimage));
    assert!(h.store.lock().unwrap().get_payment(&hash_hex).unwrap().is_none());
}

#[tokio::test]
async fn fee_viability_boundary_is_strict() {
    let preimage = *b"preimage-fee-padded-to-32-bytes!";
    let payment_hash = keys::sha256(&preimage);

    let floor = 2_000;
    let fees = subswapd::swap::redeem::fee_for_weight(floor, ONE_INPUT_REDEEM_WEIGHT);
    assert_eq!(fees, 1_074);

    // 2 x total == 3 x fees: rejected
    let h = harness(
        FakeChain::new(700_006, vec![utxo(0, 3 * fees / 2, 700_000)]),
        settled_ln(preimage),
        floor,
        4_000_000,
    );
    h.engine.init(&payer_pubkey(), &payment_hash).unwrap();
    let outcome = h
        .engine
        .get_swap_payment(&invoice_for(&preimage, None), None)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        SwapPaymentOutcome::Rejected {
            rejection: PolicyRejection::TxTooSmall,
            ..
        }
    ));

    // one satoshi more passes the fee gate and trips the amount check
    // (the invoice carries no amount)
    let h = harness(
        FakeChain::new(700_006, vec![utxo(0, 3 * fees / 2 + 1, 700_000)]),
        settled_ln(preimage),
        floor,
        4_000_000,
    );
    h.engine.init(&payer_pubkey(), &payment_hash).unwrap();
    let outcome = h
        .engine
        .get_swap_payment(&invoice_for(&preimage, None), None)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        SwapPaymentOutcome::Rejected {
            rejection: PolicyRejection::InvoiceAmountMismatch,
            ..
        }
    ));
}

#[tokio::test]
async fn amount_mismatch_is_exact() {
    let preimage = *b"preimage-amt-padded-to-32-bytes!";
    let payment_hash = keys::sha256(&preimage);
    let h = harness(
        FakeChain::new(700_006, vec![utxo(0, 100_000, 700_000)]),
        settled_ln(preimage),
        253,
        4_000_000,
    );
    h.engine.init(&payer_pubkey(), &payment_hash).unwrap();

    let outcome = h
        .engine
        .get_swap_payment(&invoice_for(&preimage, Some(99_999)), None)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        SwapPaymentOutcome::Rejected {
            rejection: PolicyRejection::InvoiceAmountMismatch,
            ..
        }
    ));
}

#[tokio::test]
async fn swap_past_three_quarters_of_the_csv_window_is_expired() {
    let preimage = *b"preimage-exp-padded-to-32-bytes!";
    let payment_hash = keys::sha256(&preimage);

    // 4 x (700217 - 700000) = 868 > 3 x 288 = 864
    let h = harness(
        FakeChain::new(700_217, vec![utxo(0, 100_000, 700_000)]),
        settled_ln(preimage),
        253,
        4_000_000,
    );
    h.engine.init(&payer_pubkey(), &payment_hash).unwrap();

    let outcome = h
        .engine
        .get_swap_payment(&invoice_for(&preimage, Some(100_000)), None)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        SwapPaymentOutcome::Rejected {
            rejection: PolicyRejection::SwapExpired,
            ..
        }
    ));
}

#[tokio::test]
async fn full_redeem_pays_invoice_broadcasts_and_records_txid() {
    let preimage = *b"preimage-ok!-padded-to-32-bytes!";
    let payment_hash = keys::sha256(&preimage);

    // floor chosen so the one-input redeem fee lands on 5_000 sat
    let floor = 9_311;
    assert_eq!(
        subswapd::swap::redeem::fee_for_weight(floor, ONE_INPUT_REDEEM_WEIGHT),
        5_000
    );

    // tip right on the expiry boundary: 4 x 216 == 3 x 288
    let h = harness(
        FakeChain::new(700_216, vec![utxo(0, 100_000, 700_000)]),
        settled_ln(preimage),
        floor,
        4_000_000,
    );
    h.engine.init(&payer_pubkey(), &payment_hash).unwrap();

    let outcome = h
        .engine
        .get_swap_payment(&invoice_for(&preimage, Some(100_000)), Some(p2wpkh_dest()))
        .await
        .unwrap();
    let SwapPaymentOutcome::Redeemed { txid, payment_error } = outcome else {
        panic!("expected redeem, got {outcome:?}");
    };
    assert!(payment_error.is_empty());

    let broadcasts = h.chain.broadcasts.lock().unwrap();
    assert_eq!(broadcasts.len(), 1);
    let tx = &broadcasts[0];
    assert_eq!(tx.compute_txid().to_string(), txid);
    assert_eq!(tx.output.len(), 1);
    assert_eq!(tx.output[0].value.to_sat(), 95_000);

    let witness: Vec<_> = tx.input[0].witness.iter().collect();
    assert_eq!(witness.len(), 3);
    assert_eq!(witness[1], preimage);

    let hash_hex = hex::encode(payment_hash);
    let attempt = h
        .store
        .lock()
        .unwrap()
        .get_payment(&hash_hex)
        .unwrap()
        .expect("payment attempt recorded");
    assert_eq!(attempt.txids, vec![txid]);
}

#[tokio::test]
async fn failed_payment_keeps_attempt_row_and_skips_redeem() {
    let preimage = *b"preimage-bad-padded-to-32-bytes!";
    let payment_hash = keys::sha256(&preimage);
    let h = harness(
        FakeChain::new(700_006, vec![utxo(0, 100_000, 700_000)]),
        FakeLightning {
            preimage: None,
            payment_error: "no route".to_string(),
        },
        253,
        4_000_000,
    );
    h.engine.init(&payer_pubkey(), &payment_hash).unwrap();

    let outcome = h
        .engine
        .get_swap_payment(&invoice_for(&preimage, Some(100_000)), None)
        .await
        .unwrap();
    let SwapPaymentOutcome::PaymentFailed { payment_error } = outcome else {
        panic!("expected payment failure, got {outcome:?}");
    };
    assert_eq!(payment_error, "no route");

    assert!(h.chain.broadcasts.lock().unwrap().is_empty());

    let hash_hex = hex::encode(payment_hash);
    let attempt = h
        .store
        .lock()
        .unwrap()
        .get_payment(&hash_hex)
        .unwrap()
        .expect("attempt row remains");
    assert!(attempt.txids.is_empty());
}

#[tokio::test]
async fn redeem_for_unknown_hash_is_an_error() {
    let preimage = *b"preimage-unk-padded-to-32-bytes!";
    let h = harness(
        FakeChain::new(700_006, vec![utxo(0, 100_000, 700_000)]),
        settled_ln(preimage),
        253,
        4_000_000,
    );

    assert!(matches!(
        h.engine
            .get_swap_payment(&invoice_for(&preimage, Some(100_000)), None)
            .await,
        Err(SwapError::UnknownSwap)
    ));
}
