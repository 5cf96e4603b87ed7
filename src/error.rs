//! Error types
//!
//! Only caller mistakes and malformed input surface as `Err`. Native resource
//! failures are recorded on the owning object (see `Runtime::fatal`) and a
//! runaway watcher loop panics.

use std::io;
use std::path::PathBuf;

use crate::store::ObjectId;

/// Crate level error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("object id already in use: {0}")]
    DuplicateId(ObjectId),

    #[error(transparent)]
    Mux(#[from] MuxError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Native(#[from] NativeError),
}

/// Codec input that violates the native layer contract
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MuxError {
    #[error("video header unit carries no SPS")]
    MissingSps,

    #[error("video header unit carries no PPS")]
    MissingPps,

    #[error("SPS too short: {0} bytes")]
    SpsTooShort(usize),

    #[error("parameter set too large: {0} bytes")]
    ParameterSetTooLarge(usize),

    #[error("too many parameter sets for a decoder configuration record: {sps} SPS, {pps} PPS")]
    TooManyParameterSets { sps: usize, pps: usize },

    #[error("invalid AAC audio specific config")]
    InvalidAacConfig,

    #[error("mixer not found: {0}")]
    MixerNotFound(ObjectId),
}

/// Loading or saving the persisted object tree
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config root must be a JSON object keyed by object id")]
    NotAnObject,
}

/// A native resource refused to start
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NativeError {
    #[error("failed to start {kind}: {message}")]
    StartFailed { kind: String, message: String },

    #[error("unsupported resource type: {0}")]
    Unsupported(String),
}

/// Result type for crate operations
pub type Result<T> = std::result::Result<T, Error>;
