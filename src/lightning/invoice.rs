use std::str::FromStr as _;

use bitcoin::Network;
use bitcoin::hashes::Hash as _;
use lightning_invoice::Bolt11Invoice;

use crate::error::SwapError;

#[derive(Debug, Clone, Copy)]
pub struct DecodedInvoice {
    pub payment_hash: [u8; 32],
    /// Zero when the invoice carries no amount.
    pub amount_sat: u64,
}

pub fn decode(payment_request: &str, network: Network) -> Result<DecodedInvoice, SwapError> {
    let invoice = Bolt11Invoice::from_str(payment_request)
        .map_err(|e| SwapError::InvalidInput(format!("parse BOLT11 invoice: {e:?}")))?;

    if invoice.network() != network {
        return Err(SwapError::InvalidInput(
            "payment request is for a different network".to_string(),
        ));
    }

    Ok(DecodedInvoice {
        payment_hash: invoice.payment_hash().to_byte_array(),
        amount_sat: invoice.amount_milli_satoshis().unwrap_or(0) / 1000,
    })
}
