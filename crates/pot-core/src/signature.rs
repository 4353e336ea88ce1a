//! Optional wallet attestations over the canonical message.
//!
//! A signature never gates the ledger: unsigned transactions are always
//! accepted. When a wallet address and a signature are both supplied, the
//! signer recovered from the signature has to match the declared address or
//! the pending transaction is rejected.

use crate::error::SignatureError;
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, PublicKey, Secp256k1, VerifyOnly,
};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use tracing::debug;

const SIGNATURE_LEN: usize = 65;

/// Recovers the address that signed a message.
pub trait SignatureVerifier: Send + Sync {
    fn recover(&self, message: &str, signature: &str) -> Result<String, SignatureError>;
}

/// Outcome of checking the wallet fields submitted with a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attestation {
    Unsigned,
    Signed {
        wallet_address: String,
        signature: String,
    },
}

impl Attestation {
    /// Blank address or blank signature means unsigned; otherwise the
    /// recovered signer must equal the declared address, ignoring case.
    pub fn check<V: SignatureVerifier + ?Sized>(
        verifier: &V,
        message: &str,
        wallet_address: &str,
        signature: &str,
    ) -> Result<Self, SignatureError> {
        let (declared, signature) = (wallet_address.trim(), signature.trim());
        if declared.is_empty() || signature.is_empty() {
            return Ok(Attestation::Unsigned);
        }
        let recovered = verifier.recover(message, signature)?;
        if !recovered.eq_ignore_ascii_case(declared) {
            return Err(SignatureError::AddressMismatch {
                recovered,
                declared: declared.to_string(),
            });
        }
        debug!(signer = %recovered, "signature verified");
        Ok(Attestation::Signed {
            wallet_address: declared.to_string(),
            signature: signature.to_string(),
        })
    }

    pub fn wallet_address(&self) -> &str {
        match self {
            Attestation::Unsigned => "",
            Attestation::Signed { wallet_address, .. } => wallet_address,
        }
    }

    pub fn signature(&self) -> &str {
        match self {
            Attestation::Unsigned => "",
            Attestation::Signed { signature, .. } => signature,
        }
    }
}

/// Keccak-256 of the EIP-191 `personal_sign` envelope around `message`.
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// `0x`-prefixed lowercase address: the last 20 bytes of the Keccak-256 of
/// the uncompressed public key without its prefix byte.
pub fn address_from_public_key(key: &PublicKey) -> String {
    let uncompressed = key.serialize_uncompressed();
    let digest = Keccak256::digest(&uncompressed[1..]);
    format!("0x{}", hex::encode(&digest[12..]))
}

fn malformed(e: impl std::fmt::Display) -> SignatureError {
    SignatureError::Malformed(e.to_string())
}

/// Recovers signers of Ethereum `personal_sign` signatures (65 bytes,
/// `r || s || v`, hex encoded).
pub struct EthereumVerifier {
    secp: Secp256k1<VerifyOnly>,
}

impl EthereumVerifier {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl Default for EthereumVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureVerifier for EthereumVerifier {
    fn recover(&self, message: &str, signature: &str) -> Result<String, SignatureError> {
        let trimmed = signature.trim();
        let raw = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(malformed)?;
        if raw.len() != SIGNATURE_LEN {
            return Err(SignatureError::Malformed(format!(
                "expected {SIGNATURE_LEN} bytes, got {}",
                raw.len()
            )));
        }
        let v = match raw[64] {
            v @ (27 | 28) => v - 27,
            v @ (0 | 1) => v,
            other => {
                return Err(SignatureError::Malformed(format!(
                    "invalid recovery byte {other}"
                )))
            }
        };
        let id = RecoveryId::from_i32(i32::from(v)).map_err(malformed)?;
        let sig = RecoverableSignature::from_compact(&raw[..64], id).map_err(malformed)?;
        let digest = Message::from_digest(personal_message_hash(message));
        let key = self
            .secp
            .recover_ecdsa(&digest, &sig)
            .map_err(|e| SignatureError::Recovery(e.to_string()))?;
        Ok(address_from_public_key(&key))
    }
}
