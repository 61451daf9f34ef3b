use bitcoin::hashes::Hash as _;
use bitcoin::secp256k1::rand::RngCore as _;
use bitcoin::secp256k1::rand::rngs::OsRng;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};

/// Fresh swapper keypair: 32-byte secret scalar, 33-byte compressed pubkey.
pub fn new_swapper_key() -> ([u8; 32], [u8; 33]) {
    let secp = Secp256k1::new();
    loop {
        let mut buf = [0u8; 32];
        OsRng.fill_bytes(&mut buf);
        if let Ok(secret) = SecretKey::from_slice(&buf) {
            let public = PublicKey::from_secret_key(&secp, &secret);
            return (buf, public.serialize());
        }
    }
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    bitcoin::hashes::sha256::Hash::hash(data).to_byte_array()
}

pub fn hash160(data: &[u8]) -> [u8; 20] {
    bitcoin::hashes::hash160::Hash::hash(data).to_byte_array()
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash as _;

    use super::*;

    #[test]
    fn swapper_key_is_valid_scalar_with_compressed_pubkey() {
        let (secret, public) = new_swapper_key();
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&secret).unwrap();
        let pk = PublicKey::from_secret_key(&secp, &sk);
        assert_eq!(pk.serialize(), public);
        assert!(public[0] == 0x02 || public[0] == 0x03);
    }

    #[test]
    fn hash160_is_ripemd_of_sha256() {
        let data = b"preimage-A";
        let expected = bitcoin::hashes::ripemd160::Hash::hash(&sha256(data));
        assert_eq!(hash160(data), expected.to_byte_array());
    }
}
