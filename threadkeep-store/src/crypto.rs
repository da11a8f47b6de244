//! Sealing provider API keys at rest.
//!
//! Envelope format: `enc:v1:<key_id>:<nonce_b64>:<ciphertext_b64>`, using
//! ChaCha20-Poly1305 with a random 96-bit nonce per value. The key id lets a
//! deployment rotate keys and detect values sealed under a different one.
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use threadkeep_common::{Result, ThreadkeepError};

const ENVELOPE_PREFIX: &str = "enc:v1:";
const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct SecretCipher {
    key_id: String,
    key: [u8; 32],
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher")
            .field("key_id", &self.key_id)
            .field("key", &"<redacted>")
            .finish()
    }
}

fn crypto_err(message: impl Into<String>) -> ThreadkeepError {
    ThreadkeepError::Crypto(message.into())
}

impl SecretCipher {
    pub fn new(key_id: impl Into<String>, key: [u8; 32]) -> Result<Self> {
        let key_id = key_id.into();
        if key_id.is_empty() || key_id.contains(':') {
            return Err(crypto_err(format!("invalid key id `{key_id}`")));
        }
        Ok(Self { key_id, key })
    }

    /// Accepts standard or URL-safe base64 for a 32-byte key.
    pub fn from_base64(key_id: impl Into<String>, encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .or_else(|_| STANDARD.decode(encoded.as_bytes()))
            .map_err(|e| crypto_err(format!("encryption key is not valid base64: {e}")))?;
        let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            crypto_err(format!(
                "encryption key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Self::new(key_id, key)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    fn aead(&self) -> Result<ChaCha20Poly1305> {
        ChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|e| crypto_err(format!("failed to initialize cipher: {e}")))
    }

    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let nonce_source = uuid::Uuid::new_v4();
        let nonce_bytes = &nonce_source.as_bytes()[..NONCE_LEN];
        let ciphertext = self
            .aead()?
            .encrypt(Nonce::from_slice(nonce_bytes), plaintext.as_bytes())
            .map_err(|e| crypto_err(format!("failed to encrypt secret: {e}")))?;

        Ok(format!(
            "{ENVELOPE_PREFIX}{}:{}:{}",
            self.key_id,
            URL_SAFE_NO_PAD.encode(nonce_bytes),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    pub fn open(&self, stored: &str) -> Result<String> {
        let rest = stored
            .strip_prefix(ENVELOPE_PREFIX)
            .ok_or_else(|| crypto_err("secret envelope is invalid"))?;
        let parts: Vec<&str> = rest.split(':').collect();
        let [key_id, nonce_b64, ciphertext_b64] = parts.as_slice() else {
            return Err(crypto_err("secret envelope is invalid"));
        };
        if *key_id != self.key_id {
            return Err(crypto_err(format!("secret key id {key_id} is not configured")));
        }

        let nonce = URL_SAFE_NO_PAD
            .decode(nonce_b64.as_bytes())
            .map_err(|e| crypto_err(format!("failed to decode nonce: {e}")))?;
        if nonce.len() != NONCE_LEN {
            return Err(crypto_err("nonce length is invalid"));
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext_b64.as_bytes())
            .map_err(|e| crypto_err(format!("failed to decode payload: {e}")))?;

        let plain = self
            .aead()?
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|e| crypto_err(format!("failed to decrypt secret: {e}")))?;
        String::from_utf8(plain).map_err(|e| crypto_err(format!("secret is invalid utf8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(id: &str) -> SecretCipher {
        SecretCipher::new(id, [7u8; 32]).unwrap()
    }

    #[test]
    fn roundtrip_and_rotation_guard() {
        let sealed = cipher("v1").seal("super-secret-key").unwrap();
        assert!(sealed.starts_with("enc:v1:v1:"));
        assert!(!sealed.contains("super-secret-key"));
        assert_eq!(cipher("v1").open(&sealed).unwrap(), "super-secret-key");

        let err = cipher("v2").open(&sealed).unwrap_err();
        assert!(matches!(err, ThreadkeepError::Crypto(_)));
    }

    #[test]
    fn nonces_differ_per_seal() {
        let c = cipher("v1");
        assert_ne!(c.seal("same").unwrap(), c.seal("same").unwrap());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let c = cipher("v1");
        let sealed = c.seal("value").unwrap();
        let (head, tail) = sealed.rsplit_once(':').unwrap();
        let mut bytes = URL_SAFE_NO_PAD.decode(tail).unwrap();
        bytes[0] ^= 0xff;
        let forged = format!("{head}:{}", URL_SAFE_NO_PAD.encode(bytes));
        assert!(c.open(&forged).is_err());
        assert!(c.open("plain-text").is_err());
        assert!(c.open("enc:v1:v1:only-two").is_err());
    }

    #[test]
    fn base64_key_validation() {
        let key = STANDARD.encode([1u8; 32]);
        assert!(SecretCipher::from_base64("v1", &key).is_ok());
        let short = STANDARD.encode([1u8; 16]);
        assert!(SecretCipher::from_base64("v1", &short).is_err());
        assert!(SecretCipher::from_base64("v1", "!!!").is_err());
        assert!(SecretCipher::new("bad:id", [0u8; 32]).is_err());
    }
}
