//! Opaque capabilities consumed by the session layer.
//!
//! These traits are the entire surface the orchestrator sees of the
//! media engine. Implementations own the sockets, SRTP contexts, and
//! codecs; the session layer only sequences them.

use crate::event::RecorderEvent;
use crate::media::{MediaFormat, MediaStreamTarget, MediaType, StreamConnector};
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure reported by a media capability.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The underlying transport could not be driven.
    #[error("transport error: {0}")]
    Transport(String),

    /// A recorder could not start or persist media.
    #[error("recorder error: {0}")]
    Recorder(String),
}

/// An established secure (DTLS/SRTP) transport for one media type.
///
/// Lifecycle is owned by the receive path that gets handed the
/// transport; the session only forwards the handle and releases the
/// DATA transport when the control channel closes.
pub trait SecureTransport: Send + Sync {
    /// Begin protecting the given media type.
    fn start(&self, media_type: MediaType) -> Result<(), MediaError>;

    /// Release all resources. Idempotent.
    fn cleanup(&self);
}

/// An inbound media stream (one per recorded media type).
#[async_trait::async_trait]
pub trait ReceivePath: Send + Sync {
    /// The media type this path receives.
    fn media_type(&self) -> MediaType;

    /// Bind the path to its local socket pair.
    fn set_connector(&self, connector: StreamConnector);

    /// Point the path at the remote stream source.
    fn set_target(&self, target: MediaStreamTarget);

    /// Register a negotiated format under a dynamic payload type.
    fn add_format(&self, format: MediaFormat, payload_type: u8);

    /// Start receiving. The path starts its secure transport itself.
    async fn start(&self) -> Result<(), MediaError>;

    /// Whether the path is currently receiving.
    fn is_started(&self) -> bool;

    /// Stop receiving and release the transport. Idempotent.
    async fn close(&self);

    /// The locally generated SSRC for this path.
    fn local_ssrc(&self) -> u32;
}

/// Receives every event a recorder (or the control channel) produces.
///
/// Returns `true` when the event was persisted, `false` when it was
/// dropped. Implementations must be callable concurrently.
pub trait RecorderEventHandler: Send + Sync {
    fn handle_event(&self, event: RecorderEvent) -> bool;
}

/// Maps transport SSRCs to participant identities inside a recorder,
/// so long-lived recording components know "who is SSRC X" without
/// understanding endpoints.
pub trait Synchronizer: Send + Sync {
    fn set_endpoint(&self, ssrc: u32, endpoint_id: &str);
}

/// Persists the media received on one path.
#[async_trait::async_trait]
pub trait Recorder: Send + Sync {
    /// Start writing files under `output_dir`, labelled `label`.
    async fn start(&self, label: &str, output_dir: &Path) -> Result<(), MediaError>;

    /// Stop recording. Idempotent, never fails.
    async fn stop(&self);

    /// Install the handler that receives this recorder's events.
    fn set_event_handler(&self, handler: Arc<dyn RecorderEventHandler>);

    /// The recorder's identity-correlation sink.
    fn synchronizer(&self) -> Arc<dyn Synchronizer>;
}

/// A message delivered on a data sub-channel.
#[derive(Debug, Clone)]
pub enum ChannelMessage {
    Text(String),
    Binary(Bytes),
}

/// One message-oriented sub-channel of the data transport.
pub trait DataChannel: Send + Sync {
    /// The sub-channel identifier.
    fn sid(&self) -> u16;

    /// Take the inbound message stream. Returns `None` if it was
    /// already taken; there is exactly one consumer per channel.
    fn take_messages(&self) -> Option<mpsc::Receiver<ChannelMessage>>;
}

/// Manages the out-of-band data transport and its sub-channels.
#[async_trait::async_trait]
pub trait ChannelManager: Send + Sync {
    /// Drive the transport in client mode towards the remote side.
    fn run_as_client(
        &self,
        connector: StreamConnector,
        target: MediaStreamTarget,
        transport: Arc<dyn SecureTransport>,
    );

    /// Resolves once the remote side has created the sub-channel with
    /// the given id. Sub-channel creation is asynchronous and not
    /// otherwise observable, so callers await this under a
    /// cancellation token.
    async fn wait_for_channel(&self, sid: u16) -> Arc<dyn DataChannel>;

    /// Tear the transport down. Idempotent, never fails.
    fn shutdown(&self);
}

/// Creates the per-session capability instances.
pub trait MediaFactory: Send + Sync {
    /// Build a receive path for one media type, bound to its secure
    /// transport.
    fn create_receive_path(
        &self,
        media_type: MediaType,
        transport: Arc<dyn SecureTransport>,
    ) -> Arc<dyn ReceivePath>;

    /// Build a recorder bound to a receive path.
    fn create_recorder(
        &self,
        media_type: MediaType,
        path: Arc<dyn ReceivePath>,
    ) -> Arc<dyn Recorder>;

    /// Build the data-transport channel manager.
    fn create_channel_manager(&self) -> Arc<dyn ChannelManager>;
}
