pub mod host_key;
pub mod jwks;
