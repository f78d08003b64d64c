use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Dataset '{name}' not found in {path:?}")]
    DatasetNotFound { name: String, path: PathBuf },

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Columns requested {requested:?} do not match columns {actual:?} in {path:?}")]
    SchemaMismatch {
        path: PathBuf,
        requested: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Unknown score method '{method}' in {path:?}")]
    UnknownScoreMethod { method: String, path: PathBuf },

    #[error("Score method '{method}' in {path:?} has no shards")]
    NoShards { method: String, path: PathBuf },

    #[error("Storage unavailable at {path:?}: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },

    #[error("Path not found: {0:?}")]
    PathNotFound(PathBuf),

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Store at {0:?} is open read-only")]
    ReadOnly(PathBuf),

    #[error("Dataset '{name}' has dtype {actual}, expected {expected}")]
    DtypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Corrupt dataset {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Invalid _ref value '{value}' in {path:?}")]
    InvalidRef { path: PathBuf, value: String },

    #[error("Duplicate _ref: {0}")]
    DuplicateRef(i64),

    #[error("No files matching '{pattern}' in {directory:?}")]
    NoInputFiles { pattern: String, directory: PathBuf },

    #[error("Missing setting: {0}")]
    MissingSetting(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn storage_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::StorageUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
