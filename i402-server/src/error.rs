//! Error types for the demo server.

/// Errors raised while loading the server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`ServerConfig`](crate::config::ServerConfig).
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// An override from the environment could not be parsed.
    #[error("invalid {name} override {value:?}")]
    InvalidOverride {
        /// Environment variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}
