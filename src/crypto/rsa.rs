//! Asymmetric payload encryption.
//!
//! Payloads longer than a single OAEP block are split into chunks, each
//! encrypted on its own, and the ciphertexts concatenated. Every ciphertext
//! block is exactly the key size, which is how the receiving side splits them
//! again.

use crate::core::{PromLightError, Result};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use rsa::Oaep;
use sha2::Sha512;
use std::path::Path;

pub use rsa::{RsaPrivateKey, RsaPublicKey};

/// Output size of the OAEP hash in bytes.
const HASH_LEN: usize = 64;

fn padding() -> Oaep {
    Oaep::new::<Sha512>()
}

async fn read_pem(path: Option<&Path>) -> Result<Option<String>> {
    let Some(path) = path.filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(None);
    };
    let pem = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PromLightError::crypto(format!("failed to read key {:?}: {}", path, e)))?;
    Ok(Some(pem))
}

/// Load a PKCS#1 PEM public key. An absent or empty path means no key.
pub async fn load_public_key(path: Option<&Path>) -> Result<Option<RsaPublicKey>> {
    read_pem(path)
        .await?
        .map(|pem| {
            RsaPublicKey::from_pkcs1_pem(&pem)
                .map_err(|e| PromLightError::crypto(format!("invalid public key: {}", e)))
        })
        .transpose()
}

/// Load a PKCS#1 PEM private key. An absent or empty path means no key.
pub async fn load_private_key(path: Option<&Path>) -> Result<Option<RsaPrivateKey>> {
    read_pem(path)
        .await?
        .map(|pem| {
            RsaPrivateKey::from_pkcs1_pem(&pem)
                .map_err(|e| PromLightError::crypto(format!("invalid private key: {}", e)))
        })
        .transpose()
}

/// Encrypt `msg` with RSA-OAEP/SHA-512 in chunks.
pub fn encrypt(key: &RsaPublicKey, msg: &[u8]) -> Result<Vec<u8>> {
    let step = key
        .size()
        .checked_sub(2 * HASH_LEN + 2)
        .filter(|step| *step > 0)
        .ok_or_else(|| PromLightError::crypto(format!("{}-bit key is too small for OAEP", key.size() * 8)))?;

    let mut rng = OsRng;
    let mut out = Vec::with_capacity(msg.len().div_ceil(step) * key.size());
    for chunk in msg.chunks(step) {
        let block = key
            .encrypt(&mut rng, padding(), chunk)
            .map_err(|e| PromLightError::crypto(format!("encryption failed: {}", e)))?;
        out.extend_from_slice(&block);
    }
    Ok(out)
}

/// Reverse of [`encrypt`].
pub fn decrypt(key: &RsaPrivateKey, msg: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(msg.len());
    for block in msg.chunks(key.size()) {
        let plain = key
            .decrypt(padding(), block)
            .map_err(|e| PromLightError::crypto(format!("decryption failed: {}", e)))?;
        out.extend_from_slice(&plain);
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
    use std::sync::OnceLock;

    /// One shared 2048-bit key, generating keys is slow.
    pub(crate) fn test_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).unwrap())
    }

    #[test]
    fn test_multi_chunk_round_trip() {
        let private = test_key();
        let public = private.to_public_key();
        // Several times the 126-byte chunk of a 2048-bit key.
        let msg: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

        let encrypted = encrypt(&public, &msg).unwrap();
        assert_eq!(encrypted.len() % public.size(), 0);
        assert_eq!(encrypted.len() / public.size(), msg.len().div_ceil(126));

        assert_eq!(decrypt(private, &encrypted).unwrap(), msg);
    }

    #[test]
    fn test_garbage_ciphertext_fails() {
        let private = test_key();
        let garbage = vec![7u8; private.size()];
        assert!(matches!(decrypt(private, &garbage), Err(PromLightError::Crypto(_))));
    }

    #[tokio::test]
    async fn test_load_pem_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let private = test_key();
        let private_path = dir.path().join("private.pem");
        let public_path = dir.path().join("public.pem");

        std::fs::write(&private_path, private.to_pkcs1_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();
        std::fs::write(
            &public_path,
            private.to_public_key().to_pkcs1_pem(LineEnding::LF).unwrap(),
        )
        .unwrap();

        let loaded_private = load_private_key(Some(&private_path)).await.unwrap().unwrap();
        let loaded_public = load_public_key(Some(&public_path)).await.unwrap().unwrap();
        assert_eq!(&loaded_private, private);
        assert_eq!(loaded_public, private.to_public_key());
    }

    #[tokio::test]
    async fn test_missing_key_paths() {
        assert!(load_public_key(None).await.unwrap().is_none());
        assert!(load_private_key(Some(Path::new(""))).await.unwrap().is_none());
        assert!(load_public_key(Some(Path::new("/nonexistent/key.pem"))).await.is_err());
    }
}
