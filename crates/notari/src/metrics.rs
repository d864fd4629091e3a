//! Process-wide counters: module-scoped singletons initialized once at
//! startup, incremented by the SSH engine, and read by the internal HTTP
//! façade's `/metrics` endpoint.

use metrics::{counter, describe_counter};

pub const SSH_REQUESTS_TOTAL: &str = "notari_ssh_requests_total";
pub const AUTHENTICATION_FAILURES_TOTAL: &str = "notari_authentication_failures_total";

/// Register counter descriptions once, before the Prometheus exporter starts
/// scraping. Safe to call more than once.
pub fn describe() {
    describe_counter!(SSH_REQUESTS_TOTAL, "Total accepted SSH connections");
    describe_counter!(
        AUTHENTICATION_FAILURES_TOTAL,
        "Total sessions where the presented key did not match the resolved user"
    );
}

pub fn record_ssh_request() {
    counter!(SSH_REQUESTS_TOTAL).increment(1);
}

pub fn record_authentication_failure() {
    counter!(AUTHENTICATION_FAILURES_TOTAL).increment(1);
}
