//! Recording controller error types.
//!
//! Lifecycle failures are reported synchronously from
//! `start_recording`; teardown paths never surface errors.

use media_recording::{MediaError, MediaType};
use std::path::PathBuf;
use thiserror::Error;

/// Failure creating or writing the metadata sink.
///
/// `AlreadyExists` is recoverable: the sink retries with a numeric
/// suffix and never surfaces it to callers. Everything else is fatal
/// to session start.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The desired metadata file already exists.
    #[error("metadata file already exists: {0}")]
    AlreadyExists(PathBuf),

    /// The metadata file could not be created or written.
    #[error("metadata file {path} unusable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Session lifecycle error.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `init` was called on a session that was already initialized.
    #[error("session already initialized")]
    AlreadyInitialized,

    /// A lifecycle operation ran before `init`.
    #[error("session not initialized")]
    NotInitialized,

    /// `init` was missing a required secure transport.
    #[error("no secure transport supplied for {0}")]
    MissingTransport(MediaType),

    /// `start_recording` was missing a connector or target for an
    /// active receive path.
    #[error("missing {what} for {media_type}")]
    MissingParameters {
        media_type: MediaType,
        what: &'static str,
    },

    /// `start_recording` called while already recording.
    #[error("recorders are already recording")]
    AlreadyRecording,

    /// A lifecycle operation ran on a torn-down session; `Stopped` is
    /// terminal for a session instance.
    #[error("session already stopped")]
    AlreadyStopped,

    /// Recorders cannot start because receiving never started.
    #[error("media streams are not receiving")]
    NotReceiving,

    /// Fewer receive paths started than were configured. The session
    /// is left partially open; callers must run `stop_recording`.
    #[error("could not start receiving streams ({started}/{configured} started)")]
    StartReceivingFailed { started: usize, configured: usize },

    /// A recorder failed to start; aborts the whole operation.
    #[error("could not start {media_type} recorder")]
    RecorderStart {
        media_type: MediaType,
        #[source]
        source: MediaError,
    },

    /// Metadata sink creation failed (permissions, disk).
    #[error("could not create metadata sink")]
    Sink(#[from] SinkError),
}

/// Configuration loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unparsable value.
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
