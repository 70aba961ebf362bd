use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature does not match message")]
    InvalidSignature,

    #[error("malformed public key")]
    MalformedKey,
}
