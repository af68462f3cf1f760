/// Core error and result types for the procjail system
use thiserror::Error;

/// Custom error types for procjail
#[derive(Error, Debug)]
pub enum JailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cgroup error: {0}")]
    Cgroup(String),

    #[error("Clone error: {0}")]
    Clone(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Exec error: {0}")]
    Exec(String),
}

/// Result type alias for procjail operations
pub type Result<T> = std::result::Result<T, JailError>;

impl From<nix::errno::Errno> for JailError {
    fn from(err: nix::errno::Errno) -> Self {
        JailError::Process(err.to_string())
    }
}
