//! Local signing wallets: parse, generate, export.

use alloy::primitives::hex;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};

/// Parse a hex private key (with or without `0x`).
pub fn parse_private_key(key: &str) -> Result<PrivateKeySigner> {
    key.trim()
        .parse::<PrivateKeySigner>()
        .context("invalid private key")
}

/// Fresh random wallet, used for buffer hops and `gen-wallets`.
pub fn generate() -> PrivateKeySigner {
    PrivateKeySigner::random()
}

/// `0x`-prefixed 32-byte private key.
pub fn private_key_hex(signer: &PrivateKeySigner) -> String {
    signer.to_bytes().to_string()
}

/// Uncompressed SEC1 public key, `0x04…` (65 bytes).
pub fn public_key_hex(signer: &PrivateKeySigner) -> String {
    let point = signer.credential().verifying_key().to_encoded_point(false);
    hex::encode_prefixed(point.as_bytes())
}
