pub mod canonical;
pub mod signature;
pub mod types;
pub mod wire;

mod error;

pub use error::SignatureError;
pub use signature::KeyPair;
