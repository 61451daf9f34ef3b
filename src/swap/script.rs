use bitcoin::opcodes::all::{
    OP_CHECKSIG, OP_CSV, OP_DROP, OP_ELSE, OP_ENDIF, OP_EQUAL, OP_HASH160, OP_IF,
};
use bitcoin::script::Builder;
use bitcoin::{Address, Network, ScriptBuf};

use crate::error::SwapError;
use crate::swap::keys;

pub const DEFAULT_LOCK_HEIGHT: u16 = 288;

/// Largest relative-block lock OP_CHECKSEQUENCEVERIFY can encode.
const MAX_CSV_BLOCKS: i64 = 0xffff;

/// The two-branch submarine swap witness script:
///
/// ```text
/// OP_HASH160 <ripemd160(sha256(payment_hash))> OP_EQUAL
/// OP_IF <swapper_pubkey>
/// OP_ELSE <lock_height> OP_CHECKSEQUENCEVERIFY OP_DROP <payer_pubkey>
/// OP_ENDIF OP_CHECKSIG
/// ```
pub fn submarine_swap_script(
    swapper_pubkey: &[u8],
    payer_pubkey: &[u8],
    payment_hash: &[u8],
    lock_height: i64,
) -> Result<ScriptBuf, SwapError> {
    let swapper_pubkey: &[u8; 33] = swapper_pubkey
        .try_into()
        .map_err(|_| SwapError::InvalidInput("swapper pubkey must be 33 bytes".to_string()))?;
    let payer_pubkey: &[u8; 33] = payer_pubkey
        .try_into()
        .map_err(|_| SwapError::InvalidInput("payer pubkey must be 33 bytes".to_string()))?;
    let payment_hash: &[u8; 32] = payment_hash
        .try_into()
        .map_err(|_| SwapError::InvalidInput("payment hash must be 32 bytes".to_string()))?;
    if lock_height <= 0 || lock_height > MAX_CSV_BLOCKS {
        return Err(SwapError::InvalidInput(format!(
            "lock height {lock_height} outside the CSV relative-block range"
        )));
    }

    Ok(Builder::new()
        .push_opcode(OP_HASH160)
        .push_slice(keys::hash160(payment_hash))
        .push_opcode(OP_EQUAL)
        .push_opcode(OP_IF)
        .push_slice(swapper_pubkey)
        .push_opcode(OP_ELSE)
        .push_int(lock_height)
        .push_opcode(OP_CSV)
        .push_opcode(OP_DROP)
        .push_slice(payer_pubkey)
        .push_opcode(OP_ENDIF)
        .push_opcode(OP_CHECKSIG)
        .into_script())
}

pub fn p2wsh_address(script: &ScriptBuf, network: Network) -> Address {
    Address::p2wsh(script, network)
}

/// One-byte network tag stored with each swap record: the network's
/// P2SH address prefix (mainnet 0x05, testnet and regtest 0xc4).
pub fn network_id(network: Network) -> u8 {
    match network {
        Network::Bitcoin => 0x05,
        _ => 0xc4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_script(lock_height: i64) -> ScriptBuf {
        let (_, swapper_pubkey) = keys::new_swapper_key();
        let (_, payer_pubkey) = keys::new_swapper_key();
        let payment_hash = keys::sha256(b"preimage-A");
        submarine_swap_script(&swapper_pubkey, &payer_pubkey, &payment_hash, lock_height).unwrap()
    }

    #[test]
    fn script_frames_hash160_of_payment_hash() {
        let payment_hash = keys::sha256(b"preimage-A");
        let script = sample_script(288);
        let bytes = script.as_bytes();

        // OP_HASH160, 20-byte push, the double-hash, OP_EQUAL
        assert_eq!(bytes[0], 0xa9);
        assert_eq!(bytes[1], 0x14);
        assert_eq!(&bytes[2..22], &keys::hash160(&payment_hash));
        assert_eq!(bytes[22], 0x87);

        // both branches terminate at OP_ENDIF OP_CHECKSIG
        assert_eq!(&bytes[bytes.len() - 2..], &[0x68, 0xac]);
    }

    #[test]
    fn default_lock_height_encodes_as_two_byte_push() {
        let script = sample_script(288);
        let bytes = script.as_bytes();
        assert_eq!(bytes.len(), 100);
        // hash frame (23), OP_IF, 33-byte pubkey push puts OP_ELSE at 58
        assert_eq!(bytes[23], 0x63);
        assert_eq!(bytes[24], 0x21);
        assert_eq!(bytes[58], 0x67);
        // 288 pushed minimally as two little-endian bytes
        assert_eq!(&bytes[59..62], &[0x02, 0x20, 0x01]);
        assert_eq!(bytes[62], 0xb2);
    }

    #[test]
    fn address_commits_to_sha256_of_script() {
        let script = sample_script(288);
        let address = p2wsh_address(&script, Network::Regtest);
        let spk = address.script_pubkey();
        let spk = spk.as_bytes();

        assert_eq!(spk[0], 0x00);
        assert_eq!(spk[1], 0x20);
        assert_eq!(&spk[2..], &keys::sha256(script.as_bytes()));
    }

    #[test]
    fn rejects_bad_inputs() {
        let (_, swapper_pubkey) = keys::new_swapper_key();
        let (_, payer_pubkey) = keys::new_swapper_key();
        let payment_hash = keys::sha256(b"preimage-A");

        assert!(matches!(
            submarine_swap_script(&swapper_pubkey[..32], &payer_pubkey, &payment_hash, 288),
            Err(SwapError::InvalidInput(_))
        ));
        assert!(matches!(
            submarine_swap_script(&swapper_pubkey, &payer_pubkey, &payment_hash[..31], 288),
            Err(SwapError::InvalidInput(_))
        ));
        assert!(matches!(
            submarine_swap_script(&swapper_pubkey, &payer_pubkey, &payment_hash, 0),
            Err(SwapError::InvalidInput(_))
        ));
        assert!(matches!(
            submarine_swap_script(&swapper_pubkey, &payer_pubkey, &payment_hash, 65_536),
            Err(SwapError::InvalidInput(_))
        ));
        assert!(
            submarine_swap_script(&swapper_pubkey, &payer_pubkey, &payment_hash, 65_535).is_ok()
        );
    }

    #[test]
    fn network_id_bytes() {
        assert_eq!(network_id(Network::Bitcoin), 0x05);
        assert_eq!(network_id(Network::Testnet), 0xc4);
        assert_eq!(network_id(Network::Regtest), 0xc4);
    }
}
