//! Error types for loading, resolving and publishing functions

use std::path::PathBuf;

use thiserror::Error;

/// Failures while scanning source directories into a registry
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Source directory {0:?} has no usable name")]
    InvalidDirectory(PathBuf),

    #[error("Duplicate function {name}: defined in {first:?} and {second:?}")]
    DuplicateFunction {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("No CREATE TEMP FUNCTION statement found in {0:?}")]
    NoDefinitions(PathBuf),
}

/// Failures while computing a dependency closure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Unresolved reference to {reference} in {function}")]
    UnresolvedReference { function: String, reference: String },
}

/// Failures reported by the warehouse or object-storage collaborators
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Staging {file:?} to gs://{bucket}/{destination} failed: {source}")]
    Staging {
        file: PathBuf,
        bucket: String,
        destination: String,
        #[source]
        source: RemoteError,
    },

    #[error("Staged files {first:?} and {second:?} would both upload to {destination}")]
    StagingCollision {
        destination: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Publishing {function} failed: {source}")]
    Submission {
        function: String,
        #[source]
        source: RemoteError,
    },

    #[error("Publish failures ({count} total):\n{summary}")]
    Batch { count: usize, summary: String },
}
