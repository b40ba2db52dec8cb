//! Errors raised while reading `codex.toml`.

use std::path::PathBuf;

/// Why a configuration could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// The file that was opened.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The content is not valid TOML or does not match the schema.
    #[error("malformed configuration: {message}")]
    Parse {
        /// Parser diagnostic.
        message: String,
    },

    /// A setting that must have a value was given as empty.
    #[error("`{field}` must not be empty")]
    MissingField {
        /// Dotted key of the setting.
        field: &'static str,
    },

    /// A setting has a value outside its allowed range.
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        /// Dotted key of the setting.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}
