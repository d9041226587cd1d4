//! Binary-level constants.

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Prompt printed by the interactive shell.
pub const SHELL_PROMPT: &str = "nfio> ";

/// Largest single read issued by `cat`.
pub const READ_CHUNK: u32 = 64 * 1024;
