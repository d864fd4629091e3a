//! Error types and the SSH exit-status codes they map to.

use thiserror::Error;

/// Numeric codes sent over the SSH `exit-status` channel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExitCode {
    Ok = 0,
    ClientError = 1,
    AuthError = 2,
    ServerError = 5,
}

impl From<ExitCode> for u32 {
    fn from(code: ExitCode) -> u32 {
        code as u32
    }
}

/// Fatal errors raised during process bootstrap (host key, JWKS, signing key
/// selection). The caller logs these and exits the process with a non-zero
/// status; there is no retry.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to load host key from {path}: {source}")]
    HostKeyLoad {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to generate host key: {0}")]
    HostKeyGenerate(#[source] anyhow::Error),

    #[error("failed to load signing key set from {path}: {source}")]
    JwksLoad {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to generate signing key: {0}")]
    JwksGenerate(#[source] anyhow::Error),

    #[error("signing key id '{0}' not found in JWK set")]
    KeyIdNotFound(String),

    #[error("signing key id ambiguous: JWK set has {0} keys and no NOTARI_JWK_KID was set")]
    KeyIdAmbiguous(usize),

    #[error("invalid configuration: {key}: {reason}")]
    InvalidConfig { key: &'static str, reason: String },

    #[error("failed to bind {address}: {source}")]
    ListenerBind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while resolving a user's identity and minting their
/// token, scoped to a single SSH session. Never fatal to the process.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("directory lookup failed: {0}")]
    Directory(#[source] anyhow::Error),

    #[error("no key on record for this user matched the presented fingerprint")]
    KeyMismatch,

    #[error("failed to mint token: {0}")]
    TokenMint(#[source] anyhow::Error),
}

impl SessionError {
    /// The exit status this error implies on the SSH channel.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            SessionError::Directory(_) => ExitCode::ServerError,
            SessionError::KeyMismatch => ExitCode::AuthError,
            SessionError::TokenMint(_) => ExitCode::ServerError,
        }
    }
}
