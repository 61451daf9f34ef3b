pub mod engine;
pub mod keys;
pub mod redeem;
pub mod script;
pub mod service;
pub mod store;

/// One row of the `submarineswap` table. Write-once per payment hash;
/// `swapper_key` never leaves the process except into the signer.
#[derive(Debug, Clone)]
pub struct SwapRecord {
    pub network_id: u8,
    pub payment_hash: [u8; 32],
    pub lock_height: i64,
    pub swapper_key: [u8; 32],
    pub script: Vec<u8>,
}

/// A recorded attempt to redeem a swap through Lightning. The txid list
/// stays empty when the pay succeeded but the broadcast did not happen.
#[derive(Debug, Clone)]
pub struct PaymentAttempt {
    pub payment_hash: String,
    pub payment_request: String,
    pub txids: Vec<String>,
}

/// Business-policy refusals. These are successful responses to the
/// caller, distinct from the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyRejection {
    FundsExceedLimit,
    TxTooSmall,
    InvoiceAmountMismatch,
    SwapExpired,
}
