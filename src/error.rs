//! Error types and exit codes for quillfs

use std::process::ExitCode;
use thiserror::Error;

/// Main error type for workspace mirror operations
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Not a workspace member: {path}")]
    NotLoaded { path: String },

    #[error("Target already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Invalid target name: {name}")]
    InvalidName { name: String },

    #[error("Descriptor type mismatch at {path}: {message}")]
    WrongType { path: String, message: String },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not move {path} to trash: {message}")]
    Trash { path: String, message: String },

    #[error("Invalid identifier pattern: {pattern}")]
    BadIdPattern { pattern: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkspaceError {
    /// Convert error to an exit code for the CLI:
    /// - 0: Success
    /// - 1: Path not found / IO error
    /// - 2: Invalid argument (name, pattern)
    /// - 3: Tree state error (not loaded, wrong type, exists)
    /// - 4: Deletion failure
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Read { .. } | Self::Write { .. } | Self::Io(_) => ExitCode::from(1),
            Self::InvalidName { .. } | Self::BadIdPattern { .. } => ExitCode::from(2),
            Self::NotLoaded { .. } | Self::AlreadyExists { .. } | Self::WrongType { .. } => {
                ExitCode::from(3)
            }
            Self::Trash { .. } => ExitCode::from(4),
        }
    }
}

/// Result type alias for workspace mirror operations
pub type Result<T> = std::result::Result<T, WorkspaceError>;
