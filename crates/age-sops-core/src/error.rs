use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to parse config {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("scope '{0}' already exists")]
    DuplicateScope(String),

    #[error("no key registered for user '{0}'")]
    UserNotFound(String),

    #[error("key file not found: {}", .0.display())]
    KeyFileNotFound(PathBuf),

    #[error("no key files found in {}", .0.display())]
    NoIdentityFiles(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
