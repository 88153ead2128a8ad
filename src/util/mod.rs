//! Small shared helpers.

pub mod hex;

use std::sync::OnceLock;

/// Verbose per-record diagnostics, enabled by any nonzero `IB_PARSER_DEBUG`.
pub fn debug_enabled() -> bool {
    static DEBUG: OnceLock<bool> = OnceLock::new();
    *DEBUG.get_or_init(|| {
        std::env::var("IB_PARSER_DEBUG")
            .map(|v| !v.is_empty() && v != "0")
            .unwrap_or(false)
    })
}
