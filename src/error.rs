use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to read {path:?}\n{source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse parameters file\n{0}")]
    ParseConfig(#[from] toml::de::Error),

    #[error("Missing section [{0}] in parameters file")]
    MissingSection(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidConfig { key: &'static str, message: String },

    /// resource, stack, or template level validation failure.
    /// the message is already formatted for display.
    #[error("{0}")]
    Validation(String),

    #[error("Failed to serialize template\n{0}")]
    Serialize(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_config(key: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidConfig { key, message: message.into() }
    }
}
