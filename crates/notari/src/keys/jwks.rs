//! Verification-key store: load a JWK Set from disk, or synthesize a fresh
//! one, derive the public subset, and select the signing key to use.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey};
use rsa::pkcs8::EncodePrivateKey;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::BigUint;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::BootstrapError;

const RSA_BITS: usize = 4096;

/// A single RSA JWK. Private fields are present when this key came from (or
/// was generated to seed) the private set, and stripped for publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsaJwk {
    pub kty: String,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
    pub n: String,
    pub e: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(rename = "dp", skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(rename = "dq", skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(rename = "qi", skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
}

impl RsaJwk {
    fn is_private(&self) -> bool {
        self.d.is_some()
    }

    fn to_public(&self) -> RsaJwk {
        RsaJwk {
            kty: self.kty.clone(),
            kid: self.kid.clone(),
            alg: self.alg.clone(),
            use_: self.use_.clone(),
            n: self.n.clone(),
            e: self.e.clone(),
            d: None,
            p: None,
            q: None,
            dp: None,
            dq: None,
            qi: None,
        }
    }

    fn to_rsa_private_key(&self) -> Result<rsa::RsaPrivateKey, anyhow::Error> {
        let n = decode_uint(&self.n)?;
        let e = decode_uint(&self.e)?;
        let d = decode_uint(
            self.d
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("JWK '{}' has no private component", self.kid))?,
        )?;
        let p = decode_uint(self.p.as_ref().ok_or_else(|| anyhow::anyhow!("missing p"))?)?;
        let q = decode_uint(self.q.as_ref().ok_or_else(|| anyhow::anyhow!("missing q"))?)?;
        Ok(rsa::RsaPrivateKey::from_components(n, e, d, vec![p, q])?)
    }

    fn encoding_key(&self) -> Result<EncodingKey, anyhow::Error> {
        let private = self.to_rsa_private_key()?;
        let pem = private.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)?;
        Ok(EncodingKey::from_rsa_pem(pem.as_bytes())?)
    }
}

fn decode_uint(value: &str) -> Result<BigUint, anyhow::Error> {
    let bytes = URL_SAFE_NO_PAD.decode(value)?;
    Ok(BigUint::from_bytes_be(&bytes))
}

fn encode_uint(value: &BigUint) -> String {
    URL_SAFE_NO_PAD.encode(value.to_bytes_be())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<RsaJwk>,
}

impl JwkSet {
    /// Strip private components, yielding the set safe to publish.
    pub fn to_public(&self) -> JwkSet {
        JwkSet {
            keys: self.keys.iter().map(RsaJwk::to_public).collect(),
        }
    }
}

/// The key selected to sign tokens: its id, algorithm, and signing material.
pub struct SigningKey {
    pub kid: String,
    pub algorithm: Algorithm,
    pub encoding_key: EncodingKey,
}

pub struct VerificationKeys {
    pub private_set: JwkSet,
    pub public_set: JwkSet,
}

/// Load or generate the signing JWK Set.
pub fn setup(path: Option<&str>, default_kid: &str) -> Result<VerificationKeys, BootstrapError> {
    let private_set = match path {
        Some(path) => {
            info!(path, "loading signing JWKS from disk");
            let text = std::fs::read_to_string(path).map_err(|e| BootstrapError::JwksLoad {
                path: path.to_string(),
                source: e.into(),
            })?;
            let set: JwkSet =
                serde_json::from_str(&text).map_err(|e| BootstrapError::JwksLoad {
                    path: path.to_string(),
                    source: e.into(),
                })?;
            set
        }
        None => {
            info!(kid = default_kid, "generating new signing JWKS");
            generate(default_kid)?
        }
    };

    let public_set = private_set.to_public();
    Ok(VerificationKeys {
        private_set,
        public_set,
    })
}

fn generate(kid: &str) -> Result<JwkSet, BootstrapError> {
    let private_key = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, RSA_BITS)
        .map_err(|e| BootstrapError::JwksGenerate(e.into()))?;
    let public_key = private_key.to_public_key();

    let primes = private_key.primes();
    let p = primes.first().cloned().unwrap_or_default();
    let q = primes.get(1).cloned().unwrap_or_default();

    let jwk = RsaJwk {
        kty: "RSA".to_string(),
        kid: kid.to_string(),
        alg: "RS256".to_string(),
        use_: Some("sig".to_string()),
        n: encode_uint(public_key.n()),
        e: encode_uint(public_key.e()),
        d: Some(encode_uint(private_key.d())),
        p: Some(encode_uint(&p)),
        q: Some(encode_uint(&q)),
        dp: None,
        dq: None,
        qi: None,
    };

    Ok(JwkSet { keys: vec![jwk] })
}

/// Select the signing key from `private_set`.
pub fn pick_signing_key(
    private_set: &JwkSet,
    kid: Option<&str>,
) -> Result<SigningKey, BootstrapError> {
    let jwk = match kid {
        Some(kid) => private_set
            .keys
            .iter()
            .find(|k| k.kid == kid)
            .ok_or_else(|| BootstrapError::KeyIdNotFound(kid.to_string()))?,
        None => match private_set.keys.len() {
            1 => &private_set.keys[0],
            n => return Err(BootstrapError::KeyIdAmbiguous(n)),
        },
    };

    if !jwk.is_private() {
        return Err(BootstrapError::JwksLoad {
            path: jwk.kid.clone(),
            source: anyhow::anyhow!("selected key has no private component"),
        });
    }

    let algorithm = match jwk.alg.as_str() {
        "RS256" => Algorithm::RS256,
        other => {
            return Err(BootstrapError::InvalidConfig {
                key: "NOTARI_JWK_KID",
                reason: format!("unsupported algorithm '{other}'"),
            })
        }
    };

    let encoding_key = jwk
        .encoding_key()
        .map_err(|e| BootstrapError::JwksLoad {
            path: jwk.kid.clone(),
            source: e,
        })?;

    Ok(SigningKey {
        kid: jwk.kid.clone(),
        algorithm,
        encoding_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_set_has_one_private_key_with_requested_kid() {
        let keys = setup(None, "k1").unwrap();
        assert_eq!(keys.private_set.keys.len(), 1);
        assert_eq!(keys.private_set.keys[0].kid, "k1");
        assert!(keys.private_set.keys[0].is_private());
    }

    #[test]
    fn public_set_strips_private_material() {
        let keys = setup(None, "k1").unwrap();
        assert!(keys.public_set.keys[0].d.is_none());
        assert!(keys.public_set.keys[0].p.is_none());
        assert_eq!(keys.public_set.keys[0].n, keys.private_set.keys[0].n);
    }

    #[test]
    fn picking_sole_key_succeeds_without_kid() {
        let keys = setup(None, "k1").unwrap();
        let signing = pick_signing_key(&keys.private_set, None).unwrap();
        assert_eq!(signing.kid, "k1");
        assert_eq!(signing.algorithm, Algorithm::RS256);
    }

    #[test]
    fn picking_by_unknown_kid_fails_with_not_found() {
        let keys = setup(None, "k1").unwrap();
        let err = pick_signing_key(&keys.private_set, Some("missing")).unwrap_err();
        assert!(matches!(err, BootstrapError::KeyIdNotFound(_)));
    }

    #[test]
    fn ambiguous_when_multiple_keys_and_no_kid() {
        let mut keys = setup(None, "k1").unwrap();
        let mut second = generate("k2").unwrap();
        keys.private_set.keys.append(&mut second.keys);
        let err = pick_signing_key(&keys.private_set, None).unwrap_err();
        assert!(matches!(err, BootstrapError::KeyIdAmbiguous(2)));
    }
}
