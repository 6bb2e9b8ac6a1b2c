//! Tracing and logging setup shared by the deedbank binaries.

/// Initialize process-wide tracing/logging.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}

/// Tracing configuration (filters, layers, output format).
pub mod tracing;

pub use tracing::LogFormat;
