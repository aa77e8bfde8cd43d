//! Mock capability implementations for orchestration tests.
//!
//! Every mock records the calls made against it and exposes failure
//! toggles, so session tests can assert sequencing without a media
//! engine. Enabled via the `test-utils` feature.

use crate::event::RecorderEvent;
use crate::media::{MediaFormat, MediaStreamTarget, MediaType, StreamConnector};
use crate::traits::{
    ChannelManager, ChannelMessage, DataChannel, MediaError, MediaFactory, ReceivePath, Recorder,
    RecorderEventHandler, SecureTransport, Synchronizer,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, Notify};

/// Lock a std mutex, recovering from poisoning instead of panicking.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Secure transport that records lifecycle calls.
#[derive(Default)]
pub struct MockSecureTransport {
    started: Mutex<Vec<MediaType>>,
    cleanups: AtomicUsize,
}

impl MockSecureTransport {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn started_types(&self) -> Vec<MediaType> {
        lock(&self.started).clone()
    }

    #[must_use]
    pub fn cleanup_count(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

impl SecureTransport for MockSecureTransport {
    fn start(&self, media_type: MediaType) -> Result<(), MediaError> {
        lock(&self.started).push(media_type);
        Ok(())
    }

    fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

/// Receive path that records configuration and can fail to start.
pub struct MockReceivePath {
    media_type: MediaType,
    transport: Arc<dyn SecureTransport>,
    local_ssrc: u32,
    connector: Mutex<Option<StreamConnector>>,
    target: Mutex<Option<MediaStreamTarget>>,
    formats: Mutex<Vec<(MediaFormat, u8)>>,
    started: AtomicBool,
    closed: AtomicBool,
    /// When set, `start` reports success but the path never reaches
    /// the started state (partial-start simulation).
    fail_start: AtomicBool,
}

impl MockReceivePath {
    #[must_use]
    pub fn new(
        media_type: MediaType,
        transport: Arc<dyn SecureTransport>,
        local_ssrc: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            media_type,
            transport,
            local_ssrc,
            connector: Mutex::new(None),
            target: Mutex::new(None),
            formats: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
        })
    }

    pub fn fail_next_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn connector(&self) -> Option<StreamConnector> {
        *lock(&self.connector)
    }

    #[must_use]
    pub fn target(&self) -> Option<MediaStreamTarget> {
        *lock(&self.target)
    }

    #[must_use]
    pub fn formats(&self) -> Vec<(MediaFormat, u8)> {
        lock(&self.formats).clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ReceivePath for MockReceivePath {
    fn media_type(&self) -> MediaType {
        self.media_type
    }

    fn set_connector(&self, connector: StreamConnector) {
        *lock(&self.connector) = Some(connector);
    }

    fn set_target(&self, target: MediaStreamTarget) {
        *lock(&self.target) = Some(target);
    }

    fn add_format(&self, format: MediaFormat, payload_type: u8) {
        lock(&self.formats).push((format, payload_type));
    }

    async fn start(&self) -> Result<(), MediaError> {
        self.transport.start(self.media_type)?;
        if !self.fail_start.load(Ordering::SeqCst) {
            self.started.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.transport.cleanup();
    }

    fn local_ssrc(&self) -> u32 {
        self.local_ssrc
    }
}

/// Identity-correlation sink that records every binding pushed at it.
#[derive(Default)]
pub struct MockSynchronizer {
    bindings: Mutex<Vec<(u32, String)>>,
}

impl MockSynchronizer {
    #[must_use]
    pub fn bindings(&self) -> Vec<(u32, String)> {
        lock(&self.bindings).clone()
    }
}

impl Synchronizer for MockSynchronizer {
    fn set_endpoint(&self, ssrc: u32, endpoint_id: &str) {
        lock(&self.bindings).push((ssrc, endpoint_id.to_string()));
    }
}

/// Recorder that records lifecycle calls and can fail to start.
pub struct MockRecorder {
    media_type: MediaType,
    started: AtomicBool,
    stopped: AtomicBool,
    fail_start: AtomicBool,
    label: Mutex<Option<String>>,
    output_dir: Mutex<Option<PathBuf>>,
    handler: Mutex<Option<Arc<dyn RecorderEventHandler>>>,
    synchronizer: Arc<MockSynchronizer>,
}

impl MockRecorder {
    #[must_use]
    pub fn new(media_type: MediaType) -> Arc<Self> {
        Arc::new(Self {
            media_type,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            label: Mutex::new(None),
            output_dir: Mutex::new(None),
            handler: Mutex::new(None),
            synchronizer: Arc::new(MockSynchronizer::default()),
        })
    }

    pub fn fail_next_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn label(&self) -> Option<String> {
        lock(&self.label).clone()
    }

    #[must_use]
    pub fn output_dir(&self) -> Option<PathBuf> {
        lock(&self.output_dir).clone()
    }

    #[must_use]
    pub fn mock_synchronizer(&self) -> Arc<MockSynchronizer> {
        Arc::clone(&self.synchronizer)
    }

    /// Push an event through the installed handler, as the real
    /// recorder would from its media threads. Returns `None` when no
    /// handler was installed.
    #[must_use]
    pub fn emit(&self, event: RecorderEvent) -> Option<bool> {
        let handler = lock(&self.handler).clone();
        handler.map(|h| h.handle_event(event))
    }
}

#[async_trait::async_trait]
impl Recorder for MockRecorder {
    async fn start(&self, label: &str, output_dir: &Path) -> Result<(), MediaError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(MediaError::Recorder(format!(
                "mock recorder for {} refused to start",
                self.media_type
            )));
        }
        *lock(&self.label) = Some(label.to_string());
        *lock(&self.output_dir) = Some(output_dir.to_path_buf());
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn set_event_handler(&self, handler: Arc<dyn RecorderEventHandler>) {
        *lock(&self.handler) = Some(handler);
    }

    fn synchronizer(&self) -> Arc<dyn Synchronizer> {
        Arc::clone(&self.synchronizer) as Arc<dyn Synchronizer>
    }
}

/// Data channel fed by a test-held sender.
pub struct MockDataChannel {
    sid: u16,
    receiver: Mutex<Option<mpsc::Receiver<ChannelMessage>>>,
}

impl MockDataChannel {
    /// Build a channel plus the sender a test uses to inject messages.
    #[must_use]
    pub fn channel(sid: u16) -> (Arc<Self>, mpsc::Sender<ChannelMessage>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Arc::new(Self {
                sid,
                receiver: Mutex::new(Some(rx)),
            }),
            tx,
        )
    }
}

impl DataChannel for MockDataChannel {
    fn sid(&self) -> u16 {
        self.sid
    }

    fn take_messages(&self) -> Option<mpsc::Receiver<ChannelMessage>> {
        lock(&self.receiver).take()
    }
}

/// Channel manager whose sub-channels appear when the test says so.
#[derive(Default)]
pub struct MockChannelManager {
    channels: Mutex<HashMap<u16, Arc<dyn DataChannel>>>,
    channel_added: Notify,
    client_runs: Mutex<Vec<(StreamConnector, MediaStreamTarget)>>,
    shutdowns: AtomicUsize,
}

impl MockChannelManager {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make a sub-channel visible, waking any waiter.
    pub fn install_channel(&self, channel: Arc<dyn DataChannel>) {
        lock(&self.channels).insert(channel.sid(), channel);
        self.channel_added.notify_waiters();
    }

    #[must_use]
    pub fn client_runs(&self) -> Vec<(StreamConnector, MediaStreamTarget)> {
        lock(&self.client_runs).clone()
    }

    #[must_use]
    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChannelManager for MockChannelManager {
    fn run_as_client(
        &self,
        connector: StreamConnector,
        target: MediaStreamTarget,
        _transport: Arc<dyn SecureTransport>,
    ) {
        lock(&self.client_runs).push((connector, target));
    }

    async fn wait_for_channel(&self, sid: u16) -> Arc<dyn DataChannel> {
        loop {
            let notified = self.channel_added.notified();
            if let Some(channel) = lock(&self.channels).get(&sid) {
                return Arc::clone(channel);
            }
            notified.await;
        }
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory that hands out the mocks above and remembers what it built.
#[derive(Default)]
pub struct MockMediaFactory {
    paths: Mutex<HashMap<MediaType, Arc<MockReceivePath>>>,
    recorders: Mutex<HashMap<MediaType, Arc<MockRecorder>>>,
    managers: Mutex<Vec<Arc<MockChannelManager>>>,
    next_ssrc: AtomicUsize,
    fail_path_start: Mutex<Vec<MediaType>>,
    fail_recorder_start: Mutex<Vec<MediaType>>,
}

impl MockMediaFactory {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_ssrc: AtomicUsize::new(1000),
            ..Self::default()
        })
    }

    /// Make the receive path for `media_type` silently fail to start.
    pub fn fail_path_start(&self, media_type: MediaType) {
        lock(&self.fail_path_start).push(media_type);
    }

    /// Make the recorder for `media_type` error on start.
    pub fn fail_recorder_start(&self, media_type: MediaType) {
        lock(&self.fail_recorder_start).push(media_type);
    }

    #[must_use]
    pub fn path(&self, media_type: MediaType) -> Option<Arc<MockReceivePath>> {
        lock(&self.paths).get(&media_type).cloned()
    }

    #[must_use]
    pub fn recorder(&self, media_type: MediaType) -> Option<Arc<MockRecorder>> {
        lock(&self.recorders).get(&media_type).cloned()
    }

    #[must_use]
    pub fn channel_manager(&self) -> Option<Arc<MockChannelManager>> {
        lock(&self.managers).last().cloned()
    }
}

impl MediaFactory for MockMediaFactory {
    fn create_receive_path(
        &self,
        media_type: MediaType,
        transport: Arc<dyn SecureTransport>,
    ) -> Arc<dyn ReceivePath> {
        let ssrc = self.next_ssrc.fetch_add(1, Ordering::SeqCst) as u32;
        let path = MockReceivePath::new(media_type, transport, ssrc);
        if lock(&self.fail_path_start).contains(&media_type) {
            path.fail_next_start();
        }
        lock(&self.paths).insert(media_type, Arc::clone(&path));
        path
    }

    fn create_recorder(
        &self,
        media_type: MediaType,
        _path: Arc<dyn ReceivePath>,
    ) -> Arc<dyn Recorder> {
        let recorder = MockRecorder::new(media_type);
        if lock(&self.fail_recorder_start).contains(&media_type) {
            recorder.fail_next_start();
        }
        lock(&self.recorders).insert(media_type, Arc::clone(&recorder));
        recorder
    }

    fn create_channel_manager(&self) -> Arc<dyn ChannelManager> {
        let manager = MockChannelManager::new();
        lock(&self.managers).push(Arc::clone(&manager));
        manager
    }
}
