//! Integrity and confidentiality for metrics in transit.
//!
//! Signing happens before serialization and serialization before encryption.
//! Receivers undo the steps in reverse order.

pub mod rsa;
pub mod signer;

pub use self::rsa::{decrypt, encrypt, load_private_key, load_public_key, RsaPrivateKey, RsaPublicKey};
pub use self::signer::Signer;
