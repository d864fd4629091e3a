//! Token minter. Builds and signs a compact JWS whose claims embed the
//! resolved user's attributes plus the authenticating key's fingerprint.

use std::collections::HashMap;
use std::time::Duration;

use jsonwebtoken::{encode, Header};
use serde_json::{Map, Value};

use crate::directory::User;
use crate::keys::jwks::SigningKey;

/// Everything the minter needs that isn't per-request.
pub struct TokenConfig {
    pub issuer: String,
    pub claim_prefix: String,
    pub static_claims: HashMap<String, String>,
    pub expiry: Duration,
}

fn claim_name(prefix: &str, name: &str) -> String {
    format!("{prefix}{name}")
}

/// Mint a signed token for `user`, authenticated via the key whose
/// fingerprint is `fingerprint`.
///
/// Claim application order is static claims, then the registered claims,
/// then the fingerprint, then the user's own claims. The expiration always
/// equals `iat + config.expiry`.
pub fn generate(
    user: &User,
    fingerprint: &str,
    signing_key: &SigningKey,
    config: &TokenConfig,
) -> Result<String, anyhow::Error> {
    let iat = chrono::Utc::now();
    let exp = iat + chrono::Duration::from_std(config.expiry)?;

    let mut claims = Map::new();

    for (k, v) in &config.static_claims {
        claims.insert(claim_name(&config.claim_prefix, k), Value::String(v.clone()));
    }

    claims.insert("iss".to_string(), Value::String(config.issuer.clone()));
    claims.insert("sub".to_string(), Value::String(user.sub.clone()));
    claims.insert("iat".to_string(), Value::Number(iat.timestamp().into()));
    claims.insert("exp".to_string(), Value::Number(exp.timestamp().into()));

    claims.insert(
        claim_name(&config.claim_prefix, "ssh_key_fingerprint"),
        Value::String(fingerprint.to_string()),
    );

    for (k, v) in &user.claims {
        claims.insert(claim_name(&config.claim_prefix, k), v.clone());
    }

    let mut header = Header::new(signing_key.algorithm);
    header.kid = Some(signing_key.kid.clone());

    let token = encode(&header, &Value::Object(claims), &signing_key.encoding_key)?;
    Ok(token)
}
