//! Control-channel bridge.
//!
//! The remote side opens a default data sub-channel once the transport
//! handshake completes and pushes notifications on it, most
//! importantly "active speaker changed". This adapter waits for that
//! sub-channel, turns its messages into typed events, and hands them
//! to the injected event handler. It never sees the orchestrator.

use crate::endpoints::EndpointRegistry;
use media_recording::{
    ChannelManager, ChannelMessage, MediaStreamTarget, RecorderEvent, RecorderEventHandler,
    SecureTransport, StreamConnector,
};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Wire field naming the new dominant speaker in a control message.
const DOMINANT_SPEAKER_FIELD: &str = "dominantSpeakerEndpoint";

/// Bridges the out-of-band data channel into recorder events.
pub struct DataChannelAdapter {
    manager: Arc<dyn ChannelManager>,
    transport: Arc<dyn SecureTransport>,
    registry: Arc<EndpointRegistry>,
    handler: Arc<dyn RecorderEventHandler>,
    /// Sub-channel id the remote side creates once connected.
    channel_sid: u16,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DataChannelAdapter {
    #[must_use]
    pub fn new(
        manager: Arc<dyn ChannelManager>,
        transport: Arc<dyn SecureTransport>,
        registry: Arc<EndpointRegistry>,
        handler: Arc<dyn RecorderEventHandler>,
        channel_sid: u16,
    ) -> Self {
        Self {
            manager,
            transport,
            registry,
            handler,
            channel_sid,
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Drive the transport into client mode and spawn the single
    /// background worker that waits for the default sub-channel.
    pub fn connect(&self, connector: StreamConnector, target: MediaStreamTarget) {
        let mut worker = self.lock_worker();
        if worker.is_some() {
            warn!(target: "recorder.datachannel", "already connected, ignoring connect");
            return;
        }

        self.manager
            .run_as_client(connector, target, Arc::clone(&self.transport));

        let manager = Arc::clone(&self.manager);
        let registry = Arc::clone(&self.registry);
        let handler = Arc::clone(&self.handler);
        let cancel = self.cancel.clone();
        let channel_sid = self.channel_sid;
        *worker = Some(tokio::spawn(async move {
            run_worker(manager, registry, handler, cancel, channel_sid).await;
        }));
    }

    /// Tear the bridge down: cancel the worker (even while it is still
    /// waiting for the sub-channel), shut the transport manager down,
    /// and release the secure transport. Best-effort, never fails.
    pub async fn disconnect(&self) {
        self.cancel.cancel();
        let worker = self.lock_worker().take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                warn!(target: "recorder.datachannel", error = ?err, "worker did not exit cleanly");
            }
        }
        self.manager.shutdown();
        self.transport.cleanup();
        debug!(target: "recorder.datachannel", "disconnected");
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wait for the default sub-channel, then pump its messages until the
/// channel closes or the adapter disconnects.
async fn run_worker(
    manager: Arc<dyn ChannelManager>,
    registry: Arc<EndpointRegistry>,
    handler: Arc<dyn RecorderEventHandler>,
    cancel: CancellationToken,
    channel_sid: u16,
) {
    let channel = tokio::select! {
        () = cancel.cancelled() => {
            debug!(target: "recorder.datachannel", "cancelled before sub-channel appeared");
            return;
        }
        channel = manager.wait_for_channel(channel_sid) => channel,
    };

    info!(target: "recorder.datachannel", sid = channel_sid, "data sub-channel available");

    let Some(mut messages) = channel.take_messages() else {
        warn!(target: "recorder.datachannel", sid = channel_sid, "message stream already taken");
        return;
    };

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(target: "recorder.datachannel", "worker cancelled");
                return;
            }
            message = messages.recv() => match message {
                Some(ChannelMessage::Text(text)) => {
                    handle_text_message(&text, &registry, &handler);
                }
                Some(ChannelMessage::Binary(_)) => {
                    // Only text notifications are defined on this channel.
                }
                None => {
                    debug!(target: "recorder.datachannel", "sub-channel closed");
                    return;
                }
            }
        }
    }
}

/// Parse one inbound notification. Malformed input is logged and
/// dropped; nothing here may take the worker down.
fn handle_text_message(
    text: &str,
    registry: &Arc<EndpointRegistry>,
    handler: &Arc<dyn RecorderEventHandler>,
) {
    let json: Value = match serde_json::from_str(text) {
        Ok(json) => json,
        Err(err) => {
            warn!(
                target: "recorder.datachannel",
                error = %err,
                "dropping malformed control message"
            );
            return;
        }
    };

    let Some(endpoint_id) = json.get(DOMINANT_SPEAKER_FIELD).and_then(Value::as_str) else {
        debug!(target: "recorder.datachannel", "control message without speaker field, ignoring");
        return;
    };

    let audio_ssrc = registry
        .resolve_endpoint_ssrc(endpoint_id, media_recording::MediaType::Audio)
        .map_or(-1, i64::from);

    debug!(
        target: "recorder.datachannel",
        endpoint_id = %endpoint_id,
        audio_ssrc,
        "dominant speaker changed"
    );

    let event = RecorderEvent::speaker_changed(audio_ssrc, chrono::Utc::now().timestamp_millis());
    // The handler correlates audio to video and may still drop the event.
    if !handler.handle_event(event) {
        debug!(
            target: "recorder.datachannel",
            endpoint_id = %endpoint_id,
            "speaker change was not recorded"
        );
    }
}
