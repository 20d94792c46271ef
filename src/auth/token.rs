use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by the session credential. `sub` is the user id; the name
/// and email ride along so handlers can log/echo them without a lookup, but
/// the extractor always re-resolves `sub` against the identity store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: i64,
    pub name: String,
    pub email: String,
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: i64, name: &str, email: &str, session_hours: u64) -> Self {
        let exp = (Utc::now() + Duration::hours(session_hours as i64)).timestamp();
        Self {
            sub: user_id,
            name: name.to_string(),
            email: email.to_string(),
            exp,
        }
    }
}

/// Signing and verification keys derived from one HMAC secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Generate a random per-process secret for when none is configured.
    pub fn random() -> Self {
        use rand::Rng;
        let secret: [u8; 32] = rand::thread_rng().gen();
        Self::from_secret(&secret)
    }
}

pub fn sign(keys: &TokenKeys, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
    encode(&Header::new(Algorithm::HS256), claims, &keys.encoding)
}

/// Verify signature and expiry, returning the embedded claims.
pub fn verify(keys: &TokenKeys, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &keys.decoding, &validation).map(|data| data.claims)
}
