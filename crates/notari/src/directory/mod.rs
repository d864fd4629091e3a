//! Abstract user directory: resolves an SSH username to a user record.

pub mod cache;
pub mod github;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

/// A key on record for a user, as returned by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub blob: String,
    pub fingerprint: String,
}

/// A normalized user record.
#[derive(Debug, Clone)]
pub struct User {
    pub sub: String,
    pub username: String,
    pub keys: Vec<Key>,
    pub claims: HashMap<String, Value>,
}

/// The single method every directory implementation exposes, so the caching
/// resolver and the GitHub client compose by wrapping rather than by any
/// source-language dynamic-dispatch trick.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn get_user(&self, username: &str) -> Result<User, anyhow::Error>;
}
