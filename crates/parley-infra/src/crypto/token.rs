//! AES-256-GCM session token minter.
//!
//! Each token is a fixed marker encrypted under a random nonce and encoded as
//! URL-safe base64 without padding, so every write cycle gets a fresh,
//! opaque value. The key comes from:
//! - A raw 32-byte key
//! - A passphrase (Argon2id key derivation)
//! - A key file in the data directory (auto-generated on first use)
//!
//! Encrypted format: `nonce (12 bytes) || ciphertext`
//!
//! SECURITY: Error types never contain key material.

use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use secrecy::{ExposeSecret, SecretString};

use parley_core::token::TokenMinter;
use parley_types::error::MintError;

/// Nonce size for AES-256-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Plaintext sealed into every token.
const TOKEN_MARKER: &[u8] = b"parley-session";

/// Name of the generated key file inside the data directory.
pub const KEY_FILE_NAME: &str = "token.key";

pub struct AesTokenMinter {
    cipher: Aes256Gcm,
}

impl AesTokenMinter {
    /// Create a minter from a raw 32-byte key.
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Derive the key from a passphrase using Argon2id.
    ///
    /// Uses OWASP recommended parameters (19 MiB memory, 2 iterations,
    /// parallelism 1) with a fixed salt, so the same passphrase always yields
    /// the same key.
    pub fn from_passphrase(passphrase: &SecretString) -> Result<Self, MintError> {
        use argon2::{Algorithm, Argon2, Params, Version};

        let params = Params::new(19456, 2, 1, Some(32))
            .map_err(|e| MintError::KeyDerivation(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let salt = b"parley-token-v1";
        let mut key = [0u8; 32];
        argon2
            .hash_password_into(passphrase.expose_secret().as_bytes(), salt, &mut key)
            .map_err(|e| MintError::KeyDerivation(e.to_string()))?;

        Ok(Self::new(&key))
    }

    /// Load the key from `{data_dir}/token.key`, generating a random one on
    /// first use. The file holds the key as standard base64.
    pub fn from_key_file(data_dir: &Path) -> Result<Self, MintError> {
        let path = data_dir.join(KEY_FILE_NAME);

        if path.exists() {
            let encoded = std::fs::read_to_string(&path)
                .map_err(|e| MintError::KeyFile(format!("{}: {e}", path.display())))?;
            let bytes = STANDARD
                .decode(encoded.trim())
                .map_err(|_| MintError::KeyFile("corrupted key file".to_string()))?;
            let key: [u8; 32] = bytes
                .try_into()
                .map_err(|_| MintError::KeyFile("invalid key length".to_string()))?;
            return Ok(Self::new(&key));
        }

        let key = rand_bytes();
        std::fs::create_dir_all(data_dir)
            .map_err(|e| MintError::KeyFile(format!("{}: {e}", data_dir.display())))?;
        std::fs::write(&path, STANDARD.encode(key))
            .map_err(|e| MintError::KeyFile(format!("{}: {e}", path.display())))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| MintError::KeyFile(format!("{}: {e}", path.display())))?;
        }
        tracing::info!(path = %path.display(), "generated session token key");

        Ok(Self::new(&key))
    }

    /// Check that `token` was minted with this key.
    pub fn verify(&self, token: &str) -> bool {
        let Ok(data) = URL_SAFE_NO_PAD.decode(token) else {
            return false;
        };
        if data.len() < NONCE_SIZE {
            return false;
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .is_ok_and(|plain| plain == TOKEN_MARKER)
    }
}

impl TokenMinter for AesTokenMinter {
    fn mint(&self) -> Result<String, MintError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, TOKEN_MARKER)
            .map_err(|_| MintError::Encryption)?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }
}

/// Generate 32 random bytes using the OS CSPRNG.
fn rand_bytes() -> [u8; 32] {
    use aes_gcm::aead::rand_core::RngCore;
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}
