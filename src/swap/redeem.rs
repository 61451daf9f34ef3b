use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash as _;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::sighash::SighashCache;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, EcdsaSighashType, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn,
    TxOut, Txid, WPubkeyHash, Witness,
};

use crate::chain::{ChainSource, Utxo};
use crate::error::SwapError;
use crate::swap::{SwapRecord, keys, script};

/// Fixed over-estimate of one input's witness: length prefixes plus a
/// 73-byte DER signature, the 32-byte preimage, and a 100-byte script.
pub const REDEEM_WITNESS_INPUT_SIZE: u64 = 1 + 1 + 73 + 1 + 32 + 1 + 100;

/// Minimum output value a P2WPKH recipient will relay.
pub const DUST_LIMIT_SAT: u64 = 546;

pub async fn estimate_redeem_fee(
    chain: &dyn ChainSource,
    network: Network,
    record: &SwapRecord,
    fee_per_kweight: u64,
) -> Result<u64, SwapError> {
    let witness_script = ScriptBuf::from(record.script.clone());
    let address = script::p2wsh_address(&witness_script, network);

    let utxos = chain.utxos(&address.to_string()).await?;
    if utxos.is_empty() {
        return Err(SwapError::NoUtxos);
    }
    let tip_height = chain.current_height().await?;

    // zero-value output to an ephemeral key; only its script shape counts
    let (_, ephemeral_pubkey) = keys::new_swapper_key();
    let wpkh = WPubkeyHash::from_byte_array(keys::hash160(&ephemeral_pubkey));
    let draft = draft_redeem_tx(&utxos, ScriptBuf::new_p2wpkh(&wpkh), tip_height)?;

    Ok(fee_for_weight(fee_per_kweight, redeem_weight(&draft)))
}

/// Claims every confirmed utxo on the swap address through the hash branch.
pub async fn redeem(
    chain: &dyn ChainSource,
    network: Network,
    record: &SwapRecord,
    preimage: [u8; 32],
    dest_address: &Address,
    fee_per_kweight: u64,
) -> Result<(Transaction, Txid), SwapError> {
    let witness_script = ScriptBuf::from(record.script.clone());
    let address = script::p2wsh_address(&witness_script, network);

    let utxos = chain.utxos(&address.to_string()).await?;
    if utxos.is_empty() {
        return Err(SwapError::NoUtxos);
    }
    let tip_height = chain.current_height().await?;

    let mut tx = draft_redeem_tx(&utxos, dest_address.script_pubkey(), tip_height)?;
    let fee = fee_for_weight(fee_per_kweight, redeem_weight(&tx));
    let total: u64 = utxos.iter().map(|u| u.value).sum();
    let value = redeem_output_value(total, fee)?;
    tx.output[0].value = Amount::from_sat(value);

    sign_redeem_inputs(&mut tx, &utxos, &witness_script, &record.swapper_key, &preimage)?;

    let txid = chain.broadcast(&tx).await?;
    Ok((tx, txid))
}

// sequence 0 keeps locktime and CSV evaluation enabled on every input
pub fn draft_redeem_tx(
    utxos: &[Utxo],
    output_script: ScriptBuf,
    tip_height: u32,
) -> Result<Transaction, SwapError> {
    let lock_time = LockTime::from_height(tip_height)
        .map_err(|_| SwapError::Internal(format!("tip height {tip_height} is not a valid locktime")))?;

    Ok(Transaction {
        version: Version::ONE,
        lock_time,
        input: utxos
            .iter()
            .map(|u| TxIn {
                previous_output: OutPoint {
                    txid: u.txid,
                    vout: u.vout,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ZERO,
                witness: Witness::default(),
            })
            .collect(),
        output: vec![TxOut {
            value: Amount::ZERO,
            script_pubkey: output_script,
        }],
    })
}

pub fn redeem_weight(tx: &Transaction) -> u64 {
    4 * tx.base_size() as u64 + REDEEM_WITNESS_INPUT_SIZE * tx.input.len() as u64
}

/// Fee at `fee_per_kweight`, rounded half-up to whole satoshis.
pub fn fee_for_weight(fee_per_kweight: u64, weight: u64) -> u64 {
    (fee_per_kweight * weight + 500) / 1000
}

fn redeem_output_value(total: u64, fee: u64) -> Result<u64, SwapError> {
    total
        .checked_sub(fee)
        .filter(|value| *value >= DUST_LIMIT_SAT)
        .ok_or(SwapError::InsufficientFunds)
}

/// BIP-143 SIGHASH_ALL per input, witness stack `[sig, preimage, script]`.
pub fn sign_redeem_inputs(
    tx: &mut Transaction,
    utxos: &[Utxo],
    witness_script: &ScriptBuf,
    swapper_key: &[u8; 32],
    preimage: &[u8; 32],
) -> Result<(), SwapError> {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(swapper_key)
        .map_err(|_| SwapError::InvalidInput("swapper key is not a valid scalar".to_string()))?;

    let mut witnesses = Vec::with_capacity(tx.input.len());
    {
        let mut cache = SighashCache::new(&*tx);
        for (index, utxo) in utxos.iter().enumerate() {
            let sighash = cache
                .p2wsh_signature_hash(
                    index,
                    witness_script,
                    Amount::from_sat(utxo.value),
                    EcdsaSighashType::All,
                )
                .map_err(|e| SwapError::Internal(format!("sighash input {index}: {e}")))?;
            let msg = Message::from_digest(sighash.to_byte_array());
            let sig = secp.sign_ecdsa(&msg, &secret);

            let mut sig_bytes = sig.serialize_der().to_vec();
            sig_bytes.push(EcdsaSighashType::All as u8);
            witnesses.push(Witness::from_slice(&[
                sig_bytes.as_slice(),
                preimage.as_slice(),
                witness_script.as_bytes(),
            ]));
        }
    }
    for (input, witness) in tx.input.iter_mut().zip(witnesses) {
        input.witness = witness;
    }
    Ok(())
}
