use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use ring::{aead, pbkdf2, rand::{SecureRandom, SystemRandom}};
use std::num::NonZeroU32;

use crate::utils::sha256_hex;

const APP_SECRET: &[u8] = b"billbook-secret-v1";
const KEYCHAIN_SERVICE: &str = "billbook";
const PBKDF2_ITERATIONS: u32 = 100_000;
const NONCE_LEN: usize = 12;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const TOKEN_LEN: usize = 32;

pub struct CryptoService;

impl CryptoService {
    /// Stores `secret` in the OS keychain under `name`, falling back to an
    /// encrypted inline payload. The returned string is what goes into settings.
    pub fn encrypt_secret(name: &str, secret: &str) -> Result<String> {
        if let Ok(reference) = Self::store_in_keychain(name, secret) {
            return Ok(reference);
        }
        Self::encrypt_symmetric(secret)
    }

    pub fn decrypt_secret(stored: &str) -> Result<String> {
        if stored.starts_with("keychain:") {
            return Self::retrieve_from_keychain(stored);
        }
        if stored.starts_with("enc:") {
            return Self::decrypt_symmetric(stored);
        }
        Err(anyhow!("Unknown encrypted format"))
    }

    pub fn forget_secret(stored: &str) {
        if let Some(name) = stored.strip_prefix("keychain:billbook:") {
            if let Ok(entry) = keyring::Entry::new(KEYCHAIN_SERVICE, name) {
                let _ = entry.delete_password();
            }
        }
    }

    /// `pbkdf2$<iterations>$<salt>$<hash>` with base64 salt and hash.
    pub fn hash_password(password: &str) -> Result<String> {
        let rng = SystemRandom::new();
        let mut salt = [0u8; SALT_LEN];
        rng.fill(&mut salt)
            .map_err(|_| anyhow!("Failed to generate salt"))?;

        let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).ok_or_else(|| anyhow!("Invalid iterations"))?;
        let mut hash = [0u8; HASH_LEN];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            &salt,
            password.as_bytes(),
            &mut hash,
        );

        Ok(format!(
            "pbkdf2${}${}${}",
            PBKDF2_ITERATIONS,
            general_purpose::STANDARD.encode(salt),
            general_purpose::STANDARD.encode(hash)
        ))
    }

    pub fn verify_password(password: &str, stored: &str) -> bool {
        let parts: Vec<&str> = stored.split('$').collect();
        if parts.len() != 4 || parts[0] != "pbkdf2" {
            return false;
        }
        let Some(iterations) = parts[1].parse::<u32>().ok().and_then(NonZeroU32::new) else {
            return false;
        };
        let (Ok(salt), Ok(hash)) = (
            general_purpose::STANDARD.decode(parts[2]),
            general_purpose::STANDARD.decode(parts[3]),
        ) else {
            return false;
        };
        pbkdf2::verify(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            &salt,
            password.as_bytes(),
            &hash,
        )
        .is_ok()
    }

    pub fn generate_token() -> Result<String> {
        let rng = SystemRandom::new();
        let mut bytes = [0u8; TOKEN_LEN];
        rng.fill(&mut bytes)
            .map_err(|_| anyhow!("Failed to generate token"))?;
        Ok(hex::encode(bytes))
    }

    /// Session tokens are only ever stored as digests.
    pub fn token_digest(token: &str) -> String {
        sha256_hex(token.as_bytes())
    }

    fn store_in_keychain(name: &str, secret: &str) -> Result<String> {
        keyring::Entry::new(KEYCHAIN_SERVICE, name)
            .map_err(|e| anyhow!("Keychain error: {}", e))?
            .set_password(secret)
            .map_err(|e| anyhow!("Keychain store error: {}", e))?;
        Ok(format!("keychain:{}:{}", KEYCHAIN_SERVICE, name))
    }

    fn retrieve_from_keychain(reference: &str) -> Result<String> {
        let name = reference
            .strip_prefix("keychain:billbook:")
            .filter(|name| !name.is_empty())
            .ok_or_else(|| anyhow!("Invalid keychain reference"))?;
        keyring::Entry::new(KEYCHAIN_SERVICE, name)
            .map_err(|e| anyhow!("Keychain error: {}", e))?
            .get_password()
            .map_err(|e| anyhow!("Keychain fetch error: {}", e))
    }

    fn encrypt_symmetric(plaintext: &str) -> Result<String> {
        let rng = SystemRandom::new();
        let mut salt = [0u8; SALT_LEN];
        rng.fill(&mut salt)
            .map_err(|_| anyhow!("Failed to generate salt"))?;

        let key = derive_key(&salt)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill(&mut nonce_bytes)
            .map_err(|_| anyhow!("Failed to generate nonce"))?;

        let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);
        let mut in_out = plaintext.as_bytes().to_vec();
        key.seal_in_place_append_tag(nonce, aead::Aad::empty(), &mut in_out)
            .map_err(|_| anyhow!("Encryption failed"))?;

        Ok(format!(
            "enc:{}:{}:{}",
            general_purpose::STANDARD.encode(salt),
            general_purpose::STANDARD.encode(nonce_bytes),
            general_purpose::STANDARD.encode(in_out)
        ))
    }

    fn decrypt_symmetric(ciphertext: &str) -> Result<String> {
        let parts: Vec<&str> = ciphertext.split(':').collect();
        if parts.len() != 4 {
            return Err(anyhow!("Invalid encrypted payload"));
        }
        let salt = general_purpose::STANDARD
            .decode(parts[1])
            .map_err(|e| anyhow!("Decode salt: {}", e))?;
        let nonce_bytes = general_purpose::STANDARD
            .decode(parts[2])
            .map_err(|e| anyhow!("Decode nonce: {}", e))?;
        let mut data = general_purpose::STANDARD
            .decode(parts[3])
            .map_err(|e| anyhow!("Decode ciphertext: {}", e))?;

        let key = derive_key(&salt)?;
        let nonce = aead::Nonce::assume_unique_for_key(
            nonce_bytes
                .as_slice()
                .try_into()
                .map_err(|_| anyhow!("Invalid nonce length"))?,
        );

        let decrypted = key
            .open_in_place(nonce, aead::Aad::empty(), &mut data)
            .map_err(|_| anyhow!("Decryption failed"))?;
        Ok(String::from_utf8(decrypted.to_vec())?)
    }
}

fn derive_key(salt: &[u8]) -> Result<aead::LessSafeKey> {
    let mut key_bytes = [0u8; 32];
    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).ok_or_else(|| anyhow!("Invalid iterations"))?;
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        APP_SECRET,
        &mut key_bytes,
    );
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, &key_bytes)
        .map_err(|_| anyhow!("Invalid key material"))?;
    Ok(aead::LessSafeKey::new(unbound))
}
