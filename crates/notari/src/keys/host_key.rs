//! Host-key store: load an OpenSSH private key from disk, or synthesize a
//! fresh 4096-bit RSA key in memory.

use russh::keys::ssh_key::private::{KeypairData, PrivateKey as SshPrivateKey, RsaKeypair};
use russh::keys::{load_secret_key, PrivateKey};
use tracing::info;

use crate::error::BootstrapError;

const RSA_BITS: usize = 4096;

/// Load or generate the SSH host key, logging its source and fingerprint.
pub fn setup(path: Option<&str>) -> Result<PrivateKey, BootstrapError> {
    let key = match path {
        Some(path) => {
            info!(path, "loading host key from disk");
            load_secret_key(path, None).map_err(|e| BootstrapError::HostKeyLoad {
                path: path.to_string(),
                source: e.into(),
            })?
        }
        None => {
            info!("no host key configured, generating a new one");
            generate()?
        }
    };

    info!(
        fingerprint = %key.public_key().fingerprint(Default::default()),
        "host key ready"
    );
    Ok(key)
}

fn generate() -> Result<PrivateKey, BootstrapError> {
    let rsa_key = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, RSA_BITS)
        .map_err(|e| BootstrapError::HostKeyGenerate(e.into()))?;
    let keypair =
        RsaKeypair::try_from(rsa_key).map_err(|e| BootstrapError::HostKeyGenerate(e.into()))?;
    let key = SshPrivateKey::new(KeypairData::Rsa(keypair), "notari")
        .map_err(|e| BootstrapError::HostKeyGenerate(e.into()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_an_rsa_host_key_when_no_path_given() {
        let key = setup(None).expect("generation should succeed");
        assert_eq!(key.algorithm(), russh::keys::Algorithm::Rsa { hash: None });
    }
}
