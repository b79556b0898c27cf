//! Password hashing.
//!
//! Stored form: `sha256$<rounds>$<salt>$<digest>`, salt and digest base64url encoded.
//! The digest is HMAC-SHA256 keyed by the salt, iterated `rounds` times.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{ApiError, ApiResult};

type HmacSha256 = Hmac<Sha256>;

const SCHEME: &str = "sha256";

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plain: &str) -> ApiResult<String>;

    /// `false` for a mismatch and for anything that is not a hash this hasher produced.
    fn verify(&self, plain: &str, hashed: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct SaltedSha256 {
    rounds: u32,
}

impl Default for SaltedSha256 {
    fn default() -> Self {
        Self { rounds: 10_000 }
    }
}

impl SaltedSha256 {
    pub fn with_rounds(rounds: u32) -> Self {
        Self {
            rounds: rounds.max(1),
        }
    }

    /// All rounds except the last; the caller finishes with either `finalize` or a
    /// constant-time `verify_slice`.
    fn prepare(salt: &[u8], plain: &str, rounds: u32) -> ApiResult<HmacSha256> {
        let keyed = || {
            HmacSha256::new_from_slice(salt).map_err(|_| ApiError::internal("Hashing password failed."))
        };
        let mut mac = keyed()?;
        mac.update(plain.as_bytes());
        for _ in 1..rounds {
            let previous = mac.finalize().into_bytes();
            mac = keyed()?;
            mac.update(&previous);
        }
        Ok(mac)
    }
}

impl PasswordHasher for SaltedSha256 {
    fn hash(&self, plain: &str) -> ApiResult<String> {
        let salt = rand::random::<[u8; 16]>();
        let digest = Self::prepare(&salt, plain, self.rounds)?.finalize().into_bytes();
        Ok(format!(
            "{}${}${}${}",
            SCHEME,
            self.rounds,
            URL_SAFE_NO_PAD.encode(salt),
            URL_SAFE_NO_PAD.encode(digest)
        ))
    }

    fn verify(&self, plain: &str, hashed: &str) -> bool {
        let parts: Vec<&str> = hashed.split('$').collect();
        let [scheme, rounds, salt, digest] = parts.as_slice() else {
            return false;
        };
        if *scheme != SCHEME {
            return false;
        }
        let (Ok(rounds), Ok(salt), Ok(digest)) = (
            rounds.parse::<u32>(),
            URL_SAFE_NO_PAD.decode(salt),
            URL_SAFE_NO_PAD.decode(digest),
        ) else {
            return false;
        };
        if rounds == 0 {
            return false;
        }
        match Self::prepare(&salt, plain, rounds) {
            Ok(mac) => mac.verify_slice(&digest).is_ok(),
            Err(_) => false,
        }
    }
}
