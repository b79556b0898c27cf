//! Bearer token issuance and verification.
//!
//! Tokens are HS256 JWTs: `base64url(header).base64url(claims).base64url(signature)`
//! without padding. Claims carry a format version, an expiry and the minimal user identity
//! needed to load the caller's document.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::error::ApiError;
use crate::storage::types::Document;

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_VERSION: &str = "0.1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUser {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub ver: String,
    pub exp: i64,
    pub user: TokenUser,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("signing failed: {0}")]
    Signing(String),
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Signing(_) => ApiError::internal("Generating token failed."),
            _ => ApiError::unauthorized("Token is not valid."),
        }
    }
}

pub trait CredentialService: Send + Sync {
    fn verify(&self, token: &str) -> Result<TokenClaims, CredentialError>;

    /// Issues a token for `user_id`, copying non-empty `username`/`email` from `user`.
    fn issue(&self, user_id: &str, user: &Document) -> Result<String, CredentialError>;
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

pub struct HmacCredentials {
    key: Vec<u8>,
    ttl: Duration,
}

impl HmacCredentials {
    pub fn new(key: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            ttl,
        }
    }

    fn mac(&self) -> Result<HmacSha256, CredentialError> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| CredentialError::Signing(e.to_string()))
    }

    fn encode_part<T: Serialize>(part: &T) -> Result<String, CredentialError> {
        let json = serde_json::to_vec(part).map_err(|e| CredentialError::Signing(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    fn decode_part<T: for<'de> Deserialize<'de>>(part: &str) -> Result<T, CredentialError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(part)
            .map_err(|_| CredentialError::Malformed)?;
        serde_json::from_slice(&bytes).map_err(|_| CredentialError::Malformed)
    }

    fn sign_claims(&self, claims: &TokenClaims) -> Result<String, CredentialError> {
        let header = Header {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let signing_input = format!(
            "{}.{}",
            Self::encode_part(&header)?,
            Self::encode_part(claims)?
        );
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{}.{}", signing_input, signature))
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn non_empty(user: &Document, field: &str) -> Option<String> {
    user.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl CredentialService for HmacCredentials {
    fn verify(&self, token: &str) -> Result<TokenClaims, CredentialError> {
        let mut parts = token.split('.');
        let (Some(header), Some(claims), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CredentialError::Malformed);
        };

        let header: Header = Self::decode_part(header)?;
        if header.alg != "HS256" {
            return Err(CredentialError::Malformed);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| CredentialError::Malformed)?;
        let (signing_input, _) = token.rsplit_once('.').ok_or(CredentialError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| CredentialError::BadSignature)?;

        let claims: TokenClaims = Self::decode_part(claims)?;
        if claims.exp <= unix_now() {
            return Err(CredentialError::Expired);
        }
        Ok(claims)
    }

    fn issue(&self, user_id: &str, user: &Document) -> Result<String, CredentialError> {
        let claims = TokenClaims {
            ver: TOKEN_VERSION.to_string(),
            exp: unix_now().saturating_add(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)),
            user: TokenUser {
                user_id: user_id.to_string(),
                username: non_empty(user, "username"),
                email: non_empty(user, "email"),
            },
        };
        self.sign_claims(&claims)
    }
}

#[cfg(test)]
impl HmacCredentials {
    /// Signs arbitrary claims, used to forge expired tokens in tests.
    pub fn sign_for_test(&self, claims: &TokenClaims) -> String {
        self.sign_claims(claims).unwrap()
    }
}
