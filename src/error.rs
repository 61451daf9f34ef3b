/// Error taxonomy of the swap engine. Policy refusals are not errors;
/// they travel back to the caller as tagged rejection codes.
#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("swap already exists for this payment hash")]
    Duplicate,

    #[error("no swap recorded for this payment hash")]
    UnknownSwap,

    #[error("no confirmed utxos on the swap address")]
    NoUtxos,

    #[error("utxo total does not cover the redeem fee")]
    InsufficientFunds,

    #[error("chain provider unavailable: {0}")]
    ChainUnavailable(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("lightning node unavailable: {0}")]
    LightningUnavailable(String),

    #[error("{0}")]
    Internal(String),
}
