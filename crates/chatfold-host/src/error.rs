//! Error types for the chatfold-host crate.

use std::io;
use thiserror::Error;

use crate::node::NodeId;

/// Failures from operations that touch the host document.
///
/// The engine treats every one of these as transient: the failed
/// operation is logged and retried on a later pass.
#[derive(Error, Debug)]
pub enum HostError {
    /// The node exists but is no longer attached to the document
    #[error("node {0:?} is not connected to the document")]
    NotConnected(NodeId),

    /// The node handle does not refer to any live node
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    /// The operation does not apply to the node's current state
    #[error("invalid host operation: {0}")]
    InvalidOperation(String),
}

/// Failures from the settings store.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Underlying file I/O failed
    #[error("settings I/O error: {0}")]
    Io(#[from] io::Error),

    /// No config directory could be determined for this platform
    #[error("could not determine config directory")]
    NoConfigDir,

    /// Settings could not be serialized
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}
