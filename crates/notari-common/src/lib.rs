//! Shared plumbing for notari's binaries: logging initialization.

pub mod logging;
