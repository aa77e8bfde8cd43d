//! Conference recording session orchestration.
//!
//! This crate sequences the control plane of a multi-stream conference
//! recording: it prepares one receive path per recorded media type,
//! starts the recorders, bridges the out-of-band control channel into
//! recorder events, and keeps a metadata journal of what happened
//! during the recording.
//!
//! Architecture:
//!
//! - [`session`] - the [`session::RecordingSession`] lifecycle state
//!   machine (the only place resources are created or torn down)
//! - [`endpoints`] - the conference roster and SSRC/endpoint resolution
//! - [`sink`] - the newline-delimited JSON metadata journal, including
//!   speaker-change audio-to-video correlation
//! - [`datachannel`] - the bridge from the data sub-channel to recorder
//!   events
//! - [`config`] - environment-derived settings
//! - [`errors`] - error types for the above
//!
//! Media I/O is injected through the capability traits in the
//! `media-recording` crate; this crate never touches packets or files
//! other than the metadata journal.

pub mod config;
pub mod datachannel;
pub mod endpoints;
pub mod errors;
pub mod session;
pub mod sink;

pub use config::Config;
pub use endpoints::{Endpoint, EndpointRegistry};
pub use errors::{ConfigError, SessionError, SinkError};
pub use session::{Phase, RecordingSession, TaskEvent, TaskEventListener};
pub use sink::MetadataSink;
