//! Module-gated logging macros that stamp every record with a per-module target.
//!
//! Usage:
//! ```rust,ignore
//! // In your module, define both constants first:
//! const ENABLE_LOGS: bool = true;
//! const LOG_TARGET: &str = "fichaje::store";
//!
//! // Then use the macros (they're exported at the crate root):
//! use crate::{log_info, log_warn, log_error};
//!
//! log_info!("loaded {} records", count);
//! ```
//!
//! Filtering with `RUST_LOG=fichaje::store=debug` then works per module.

/// Info-level record under the calling module's `LOG_TARGET`,
/// emitted only when `ENABLE_LOGS` is true.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        if ENABLE_LOGS {
            log::info!(target: LOG_TARGET, $($arg)*);
        }
    }};
}

/// Warn-level record under the calling module's `LOG_TARGET`.
///
/// Each module that uses this macro must define:
/// ```rust,ignore
/// const ENABLE_LOGS: bool = true; // or false
/// const LOG_TARGET: &str = "fichaje::module";
/// ```
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        if ENABLE_LOGS {
            log::warn!(target: LOG_TARGET, $($arg)*);
        }
    }};
}

/// Error-level record under the calling module's `LOG_TARGET`.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        if ENABLE_LOGS {
            log::error!(target: LOG_TARGET, $($arg)*);
        }
    }};
}

/// Debug-level record; handy for per-tick chatter that is off by default.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        if ENABLE_LOGS {
            log::debug!(target: LOG_TARGET, $($arg)*);
        }
    }};
}
