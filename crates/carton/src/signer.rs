//! Detached signing of the contents document.
//!
//! The scheme is fixed out of band: Ed25519 over PKCS#8 (private) and
//! SPKI (public) PEM key material. The core neither generates nor stores
//! keys; callers pass opaque PEM strings.

use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::error::SignatureError;

/// Sign `message` with a PKCS#8 PEM private key, returning the detached
/// signature as lowercase hex.
pub fn sign(private_key_pem: &str, message: &[u8]) -> Result<String, SignatureError> {
    let key = SigningKey::from_pkcs8_pem(private_key_pem)
        .map_err(|_| SignatureError::UnsupportedKey)?;
    Ok(hex::encode(key.sign(message).to_bytes()))
}

/// Verify a hex-encoded detached signature with an SPKI PEM public key.
pub fn verify(
    public_key_pem: &str,
    signature_hex: &str,
    message: &[u8],
) -> Result<bool, SignatureError> {
    let key = VerifyingKey::from_public_key_pem(public_key_pem)
        .map_err(|_| SignatureError::UnsupportedKey)?;
    let raw = hex::decode(signature_hex).map_err(|_| SignatureError::MalformedSignature)?;
    let signature =
        Signature::from_slice(&raw).map_err(|_| SignatureError::MalformedSignature)?;
    Ok(key.verify(message, &signature).is_ok())
}
