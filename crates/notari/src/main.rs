//! notari — an SSH-fronted identity broker that mints signed bearer tokens
//! from GitHub-verified keys.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use notari::config::{Args, Config};
use notari::directory::cache::CachingProvider;
use notari::directory::github::GithubProvider;
use notari::directory::Provider;
use notari::error::BootstrapError;
use notari::keys::{host_key, jwks};
use notari::ssh::{self, ServerState};
use notari::token::TokenConfig;
use notari::{http, metrics};

/// Bootstrap failures are fatal: log and exit 2. Retrying a misconfigured
/// process is futile.
fn fatal(err: BootstrapError) -> ! {
    tracing::error!(error = %err, "fatal startup error");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    // NOTARI_LOG_LEVEL sets the default filter; -v/-q (scoped by `init_logging`
    // to `base_filter`) and RUST_LOG both still take priority over it.
    let default_filter = format!(
        "{}={}",
        env!("CARGO_BIN_NAME").replace('-', "_"),
        args.log_level
    );
    notari_common::logging::init_logging(&args.verbosity, "notari", &default_filter)?;

    let config = match Config::try_from(args) {
        Ok(config) => config,
        Err(e) => fatal(e),
    };

    let host_key = match host_key::setup(config.host_key_path.as_deref()) {
        Ok(key) => key,
        Err(e) => fatal(e),
    };
    let host_key_authorized_keys = host_key
        .public_key()
        .to_openssh()
        .context("failed to encode host key public component")?;

    let verification_keys = match jwks::setup(config.jwks_path.as_deref(), "default") {
        Ok(keys) => keys,
        Err(e) => fatal(e),
    };
    let signing_key =
        match jwks::pick_signing_key(&verification_keys.private_set, config.jwk_kid.as_deref()) {
            Ok(key) => key,
            Err(e) => fatal(e),
        };
    info!(kid = signing_key.kid, "signing key selected");

    let github_provider = GithubProvider::new(config.github_token.clone());
    let provider: Arc<dyn Provider> = Arc::new(CachingProvider::new(Arc::new(github_provider)));

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install prometheus recorder")?;
    metrics::describe();

    let state = Arc::new(ServerState {
        provider,
        signing_key,
        token_config: TokenConfig {
            issuer: config.issuer.clone(),
            claim_prefix: config.claim_prefix.clone(),
            static_claims: Default::default(),
            expiry: config.expiry,
        },
    });

    if let Some(address) = config.external_http_address.clone() {
        let public_jwks = verification_keys.public_set.clone();
        let host_key_text = host_key_authorized_keys.clone();
        tokio::spawn(async move {
            if let Err(e) = http::public::serve(&address, public_jwks, host_key_text).await {
                tracing::error!(error = %e, "external http server failed");
                std::process::exit(5);
            }
        });
    }

    if let Some(address) = config.internal_http_address.clone() {
        let handle = prometheus_handle.clone();
        tokio::spawn(async move {
            if let Err(e) = http::internal::serve(&address, handle).await {
                tracing::error!(error = %e, "internal http server failed");
                std::process::exit(5);
            }
        });
    }

    ssh::run(&config.address, host_key, state)
        .await
        .context("ssh listener failed")?;

    Ok(())
}
