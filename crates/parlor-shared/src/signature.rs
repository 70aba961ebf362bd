//! Detached Ed25519 signatures over canonical bytes.
//!
//! The verifying key is always the one embedded in the message being checked;
//! callers never pass a key separately.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde_json::Value;

use crate::canonical;
use crate::error::SignatureError;
use crate::types::UserRef;
use crate::wire::ChatMessage;

#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        self.signing_key.as_bytes()
    }

    pub fn sign_hex(&self, bytes: &[u8]) -> String {
        hex::encode(self.signing_key.sign(bytes).to_bytes())
    }

    /// Embed this key pair's public key and a detached signature into `msg`.
    pub fn sign_chat_message(&self, msg: &mut ChatMessage) {
        // The public key is part of the canonical bytes, so set it first.
        msg.public_key = Some(self.public_key_hex());
        msg.signature = Some(self.sign_hex(&canonical::chat_message(msg)));
    }

    pub fn sign_join(&self, room: &str, user: &UserRef) -> String {
        self.sign_hex(&canonical::join(room, user))
    }

    pub fn sign_offer(&self, id: &str, room: &str, offer: &Value) -> String {
        self.sign_hex(&canonical::offer(id, room, offer, &self.public_key_hex()))
    }

    pub fn sign_http_request(&self, method: &str, path: &str, body: &[u8]) -> String {
        self.sign_hex(&canonical::http_request(method, path, body))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Verify a hex signature over `bytes` with a hex-encoded public key.
pub fn verify_detached(
    public_key_hex: &str,
    bytes: &[u8],
    signature_hex: &str,
) -> Result<(), SignatureError> {
    let key_bytes: [u8; 32] = hex::decode(public_key_hex)
        .map_err(|_| SignatureError::MalformedKey)?
        .try_into()
        .map_err(|_| SignatureError::MalformedKey)?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| SignatureError::MalformedKey)?;

    let sig_bytes: [u8; 64] = hex::decode(signature_hex)
        .map_err(|_| SignatureError::InvalidSignature)?
        .try_into()
        .map_err(|_| SignatureError::InvalidSignature)?;
    let signature = Signature::from_bytes(&sig_bytes);

    key.verify(bytes, &signature)
        .map_err(|_| SignatureError::InvalidSignature)
}

/// Verify a chat message against the key it carries.
pub fn verify_chat_message(msg: &ChatMessage) -> Result<(), SignatureError> {
    let (Some(public_key), Some(signature)) = (&msg.public_key, &msg.signature) else {
        return Err(SignatureError::InvalidSignature);
    };
    verify_detached(public_key, &canonical::chat_message(msg), signature)
}

pub fn verify_join(room: &str, user: &UserRef, signature: &str) -> Result<(), SignatureError> {
    verify_detached(&user.public_key, &canonical::join(room, user), signature)
}

pub fn verify_offer(
    id: &str,
    room: &str,
    offer: &Value,
    public_key: &str,
    signature: &str,
) -> Result<(), SignatureError> {
    verify_detached(
        public_key,
        &canonical::offer(id, room, offer, public_key),
        signature,
    )
}
