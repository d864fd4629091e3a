//! Configuration. All settings come from the environment; the `clap` flags
//! exist so `notari --help` documents them.

use std::time::Duration;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

use crate::error::BootstrapError;

#[derive(Parser, Debug)]
#[command(name = "notari", about = "SSH-fronted identity broker")]
pub struct Args {
    #[arg(long, env = "NOTARI_HOST_KEY_PATH")]
    pub host_key_path: Option<String>,

    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    #[arg(long, env = "NOTARI_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "NOTARI_ADDRESS", default_value = "0.0.0.0:1022")]
    pub address: String,

    #[arg(long, env = "NOTARI_GITHUB_TOKEN")]
    pub github_token: Option<String>,

    #[arg(long, env = "NOTARI_EXTERNAL_HTTP_ADDRESS")]
    pub external_http_address: Option<String>,

    #[arg(long, env = "NOTARI_INTERNAL_HTTP_ADDRESS")]
    pub internal_http_address: Option<String>,

    #[arg(long, env = "NOTARI_JWKS_PATH")]
    pub jwks_path: Option<String>,

    #[arg(long, env = "NOTARI_JWK_KID")]
    pub jwk_kid: Option<String>,

    #[arg(long, env = "NOTARI_ISSUER", default_value = "notari")]
    pub issuer: String,

    #[arg(long, env = "NOTARI_CLAIM_PREFIX", default_value = "notari:")]
    pub claim_prefix: String,

    #[arg(long, env = "NOTARI_EXPIRY_SECONDS", default_value = "3600")]
    pub expiry_seconds: u64,
}

/// Resolved, validated configuration the rest of the service runs against.
#[derive(Debug, Clone)]
pub struct Config {
    pub host_key_path: Option<String>,
    pub log_level: String,
    pub address: String,
    pub github_token: Option<String>,
    pub external_http_address: Option<String>,
    pub internal_http_address: Option<String>,
    pub jwks_path: Option<String>,
    pub jwk_kid: Option<String>,
    pub issuer: String,
    pub claim_prefix: String,
    pub expiry: Duration,
}

impl TryFrom<Args> for Config {
    type Error = BootstrapError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if args.expiry_seconds == 0 {
            return Err(BootstrapError::InvalidConfig {
                key: "NOTARI_EXPIRY_SECONDS",
                reason: "must be greater than zero".into(),
            });
        }

        if args.log_level.parse::<tracing::Level>().is_err() {
            return Err(BootstrapError::InvalidConfig {
                key: "NOTARI_LOG_LEVEL",
                reason: format!("'{}' is not a valid log level", args.log_level),
            });
        }

        // clap only supports one env name per arg; GITHUB_TOKEN is a secondary
        // fallback so the process can reuse a token already set for other tooling.
        let github_token = args
            .github_token
            .or_else(|| std::env::var("GITHUB_TOKEN").ok());

        Ok(Config {
            host_key_path: args.host_key_path,
            log_level: args.log_level,
            address: args.address,
            github_token,
            external_http_address: args.external_http_address,
            internal_http_address: args.internal_http_address,
            jwks_path: args.jwks_path,
            jwk_kid: args.jwk_kid,
            issuer: args.issuer,
            claim_prefix: args.claim_prefix,
            expiry: Duration::from_secs(args.expiry_seconds),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_match_spec() {
        let args = Args::parse_from(["notari"]);
        let config = Config::try_from(args).unwrap();
        assert_eq!(config.address, "0.0.0.0:1022");
        assert_eq!(config.issuer, "notari");
        assert_eq!(config.claim_prefix, "notari:");
        assert_eq!(config.expiry, Duration::from_secs(3600));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn zero_expiry_is_rejected() {
        let args = Args::parse_from(["notari", "--expiry-seconds", "0"]);
        assert!(Config::try_from(args).is_err());
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let args = Args::parse_from(["notari", "--log-level", "not-a-level"]);
        assert!(Config::try_from(args).is_err());
    }

    #[test]
    fn log_level_is_read_from_args() {
        let args = Args::parse_from(["notari", "--log-level", "debug"]);
        let config = Config::try_from(args).unwrap();
        assert_eq!(config.log_level, "debug");
    }
}
