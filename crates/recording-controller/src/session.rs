//! The recording session orchestrator.
//!
//! Owns the per-media-type receive/record state machine, the roster
//! registry, and the control-channel bridge. Lifecycle operations are
//! sequenced, never concurrent with each other; the only background
//! work is the control-channel worker the bridge spawns.
//!
//! # Cleanup contract
//!
//! A failed [`RecordingSession::start_recording`] leaves the session
//! partially open on purpose: no rollback is attempted, matching the
//! all-or-nothing progress report. Callers must run
//! [`RecordingSession::stop_recording`] regardless of the outcome;
//! it tears down whatever subset of resources exists and never fails.

use crate::config::Config;
use crate::datachannel::DataChannelAdapter;
use crate::endpoints::{Endpoint, EndpointRegistry};
use crate::errors::SessionError;
use crate::sink::MetadataSink;
use media_recording::{
    MediaFactory, MediaFormat, MediaStreamTarget, MediaType, ReceivePath, Recorder,
    RecorderEventHandler, SecureTransport, StreamConnector,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Negotiated formats per media type, paired with dynamic payload types.
pub type FormatTable = HashMap<MediaType, Vec<(MediaFormat, u8)>>;

/// Local socket pairs per media type.
pub type ConnectorTable = HashMap<MediaType, StreamConnector>;

/// Remote stream sources per media type.
pub type TargetTable = HashMap<MediaType, MediaStreamTarget>;

/// Where a session is in its one-way lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Fresh session, nothing prepared.
    Idle,
    /// Receive paths exist but are not started.
    Ready,
    /// All configured receive paths are started.
    Receiving,
    /// Recorders are running.
    Recording,
    /// Torn down; terminal for this session instance.
    Stopped,
}

/// Session-lifecycle notification for external observers. These are
/// distinct from the recorded [`media_recording::RecorderEvent`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    /// Recording is running.
    Started,
    /// `start_recording` failed; the session needs `stop_recording`.
    Aborted,
    /// Recording was stopped.
    Finished,
}

/// Observer of session-lifecycle notifications.
pub trait TaskEventListener: Send + Sync {
    fn handle_task_event(&self, event: TaskEvent);
}

/// Lock a std mutex, recovering from poisoning instead of panicking.
fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Orchestrates one conference recording session.
///
/// Each logical resource is guarded by its own lock; mutation only
/// happens inside lifecycle methods, external callers read through
/// accessors.
pub struct RecordingSession {
    factory: Arc<dyn MediaFactory>,
    config: Config,
    registry: Arc<EndpointRegistry>,
    output_dir: StdMutex<Option<PathBuf>>,
    streams: Mutex<HashMap<MediaType, Arc<dyn ReceivePath>>>,
    recorders: Mutex<HashMap<MediaType, Arc<dyn Recorder>>>,
    local_ssrcs: StdMutex<HashMap<MediaType, u32>>,
    /// DATA transport held between `init` and control-channel open.
    data_transport: StdMutex<Option<Arc<dyn SecureTransport>>>,
    data_channel: Mutex<Option<DataChannelAdapter>>,
    listeners: StdMutex<Vec<Arc<dyn TaskEventListener>>>,
    phase: StdMutex<Phase>,
}

impl RecordingSession {
    #[must_use]
    pub fn new(factory: Arc<dyn MediaFactory>, config: Config) -> Self {
        Self {
            factory,
            config,
            registry: Arc::new(EndpointRegistry::new()),
            output_dir: StdMutex::new(None),
            streams: Mutex::new(HashMap::new()),
            recorders: Mutex::new(HashMap::new()),
            local_ssrcs: StdMutex::new(HashMap::new()),
            data_transport: StdMutex::new(None),
            data_channel: Mutex::new(None),
            listeners: StdMutex::new(Vec::new()),
            phase: StdMutex::new(Phase::Idle),
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        *lock(&self.phase)
    }

    /// Prepare one receive path per recorded media type, bound to its
    /// secure transport, and stash the optional DATA transport for the
    /// control channel.
    ///
    /// Calling `init` twice on the same session is rejected; callers
    /// reinitialize on a fresh session object.
    pub async fn init(
        &self,
        output_dir: impl Into<PathBuf>,
        mut transports: HashMap<MediaType, Arc<dyn SecureTransport>>,
    ) -> Result<(), SessionError> {
        let audio = transports
            .remove(&MediaType::Audio)
            .ok_or(SessionError::MissingTransport(MediaType::Audio))?;
        let video = transports
            .remove(&MediaType::Video)
            .ok_or(SessionError::MissingTransport(MediaType::Video))?;

        {
            let mut phase = lock(&self.phase);
            if *phase != Phase::Idle {
                return Err(SessionError::AlreadyInitialized);
            }
            *phase = Phase::Ready;
        }

        let output_dir = output_dir.into();
        info!(
            target: "recorder.session",
            output_dir = %output_dir.display(),
            "initializing recording session"
        );

        let mut streams = self.streams.lock().await;
        for (media_type, transport) in [(MediaType::Audio, audio), (MediaType::Video, video)] {
            let path = self.factory.create_receive_path(media_type, transport);
            streams.insert(media_type, path);
        }

        *lock(&self.data_transport) = transports.remove(&MediaType::Data);
        *lock(&self.output_dir) = Some(output_dir);
        Ok(())
    }

    /// Start recording: open the control channel (if DATA parameters
    /// were supplied), configure and start every receive path, then
    /// start one recorder per path.
    ///
    /// Fails fast without touching state when already recording. Any
    /// later failure aborts the sequence and leaves the session
    /// partially open; see the module docs for the cleanup contract.
    pub async fn start_recording(
        &self,
        formats: FormatTable,
        connectors: ConnectorTable,
        targets: TargetTable,
    ) -> Result<(), SessionError> {
        {
            let phase = lock(&self.phase);
            match *phase {
                Phase::Recording => return Err(SessionError::AlreadyRecording),
                Phase::Idle => return Err(SessionError::NotInitialized),
                // Stopped is terminal; a torn-down session has no
                // streams left to record from.
                Phase::Stopped => return Err(SessionError::AlreadyStopped),
                Phase::Ready | Phase::Receiving => {}
            }
        }
        let output_dir = lock(&self.output_dir)
            .clone()
            .ok_or(SessionError::NotInitialized)?;

        let result = self
            .start_recording_sequence(&output_dir, &formats, &connectors, &targets)
            .await;
        match &result {
            Ok(()) => self.fire_event(TaskEvent::Started),
            Err(err) => {
                warn!(target: "recorder.session", error = %err, "start_recording aborted");
                self.fire_event(TaskEvent::Aborted);
            }
        }
        result
    }

    async fn start_recording_sequence(
        &self,
        output_dir: &Path,
        formats: &FormatTable,
        connectors: &ConnectorTable,
        targets: &TargetTable,
    ) -> Result<(), SessionError> {
        // 1. The metadata sink; its file name may need suffixing.
        let sink = Arc::new(MetadataSink::create(
            output_dir,
            &self.config.metadata_filename,
            Arc::clone(&self.registry),
        )?);

        // 2. Control channel, only when DATA parameters exist. Its
        //    absence just means no speaker-change correlation.
        self.open_control_channel(connectors, targets, Arc::clone(&sink) as _)
            .await;

        // 3. Configure each receive path.
        self.configure_receive_paths(formats, connectors, targets)
            .await?;

        // 4. Start receiving on all of them.
        self.start_receiving().await?;

        // 5. One recorder per path.
        self.start_recorders(output_dir, &sink).await
    }

    async fn open_control_channel(
        &self,
        connectors: &ConnectorTable,
        targets: &TargetTable,
        handler: Arc<dyn RecorderEventHandler>,
    ) {
        let (Some(connector), Some(target)) = (
            connectors.get(&MediaType::Data).copied(),
            targets.get(&MediaType::Data).copied(),
        ) else {
            debug!(target: "recorder.session", "no control channel parameters, skipping");
            return;
        };
        let Some(transport) = lock(&self.data_transport).take() else {
            debug!(target: "recorder.session", "no DATA transport was supplied, skipping");
            return;
        };

        let adapter = DataChannelAdapter::new(
            self.factory.create_channel_manager(),
            transport,
            Arc::clone(&self.registry),
            handler,
            self.config.control_channel_sid,
        );
        adapter.connect(connector, target);
        *self.data_channel.lock().await = Some(adapter);
        debug!(target: "recorder.session", "control channel opened");
    }

    async fn configure_receive_paths(
        &self,
        formats: &FormatTable,
        connectors: &ConnectorTable,
        targets: &TargetTable,
    ) -> Result<(), SessionError> {
        debug!(target: "recorder.session", "configuring receive paths");

        let streams = self.streams.lock().await;
        for (media_type, path) in streams.iter() {
            let connector =
                connectors
                    .get(media_type)
                    .copied()
                    .ok_or(SessionError::MissingParameters {
                        media_type: *media_type,
                        what: "connector",
                    })?;
            let target =
                targets
                    .get(media_type)
                    .copied()
                    .ok_or(SessionError::MissingParameters {
                        media_type: *media_type,
                        what: "target",
                    })?;

            path.set_connector(connector);
            path.set_target(target);
            if let Some(table) = formats.get(media_type) {
                for (format, payload_type) in table {
                    path.add_format(format.clone(), *payload_type);
                }
            }
        }
        Ok(())
    }

    /// Start all configured paths; every path must end up started or
    /// the whole operation fails. No partial rollback here.
    async fn start_receiving(&self) -> Result<(), SessionError> {
        let streams = self.streams.lock().await;
        let configured = streams.len();
        let mut started = 0;

        for (media_type, path) in streams.iter() {
            if let Err(err) = path.start().await {
                warn!(
                    target: "recorder.session",
                    media_type = %media_type,
                    error = %err,
                    "receive path failed to start"
                );
            }
            if path.is_started() {
                started += 1;
            }
        }

        if started != configured {
            return Err(SessionError::StartReceivingFailed {
                started,
                configured,
            });
        }

        *lock(&self.phase) = Phase::Receiving;
        info!(target: "recorder.session", paths = configured, "receiving media streams");
        Ok(())
    }

    async fn start_recorders(
        &self,
        output_dir: &Path,
        sink: &Arc<MetadataSink>,
    ) -> Result<(), SessionError> {
        if self.phase() != Phase::Receiving {
            return Err(SessionError::NotReceiving);
        }

        let streams = self.streams.lock().await;
        let mut recorders = self.recorders.lock().await;
        for (media_type, path) in streams.iter() {
            let recorder = self.factory.create_recorder(*media_type, Arc::clone(path));
            recorder.set_event_handler(Arc::clone(sink) as Arc<dyn RecorderEventHandler>);
            recorder
                .start(media_type.as_str(), output_dir)
                .await
                .map_err(|source| SessionError::RecorderStart {
                    media_type: *media_type,
                    source,
                })?;
            recorders.insert(*media_type, recorder);
            debug!(target: "recorder.session", media_type = %media_type, "recorder started");
        }

        *lock(&self.phase) = Phase::Recording;
        info!(target: "recorder.session", recorders = recorders.len(), "recording");
        Ok(())
    }

    /// Tear the session down: stop recorders, close receive paths,
    /// close the control channel. Safe to call in any phase, after
    /// partial starts included; never fails.
    pub async fn stop_recording(&self) {
        debug!(target: "recorder.session", "stopping recording session");

        let was_recording = {
            let mut recorders = self.recorders.lock().await;
            let had_recorders = !recorders.is_empty();
            for (media_type, recorder) in recorders.drain() {
                recorder.stop().await;
                debug!(target: "recorder.session", media_type = %media_type, "recorder stopped");
            }
            had_recorders
        };

        {
            let mut streams = self.streams.lock().await;
            for (media_type, path) in streams.drain() {
                path.close().await;
                debug!(target: "recorder.session", media_type = %media_type, "receive path closed");
            }
        }

        if let Some(adapter) = self.data_channel.lock().await.take() {
            adapter.disconnect().await;
        }

        *lock(&self.phase) = Phase::Stopped;
        if was_recording {
            self.fire_event(TaskEvent::Finished);
        }
        info!(target: "recorder.session", "recording session stopped");
    }

    /// Atomically replace the conference roster, then push every
    /// (SSRC, endpoint) binding into the live recorders' correlation
    /// sinks so they know "who is SSRC X".
    pub async fn set_endpoints(&self, roster: Vec<Endpoint>) {
        self.registry.replace(roster);

        let roster = self.registry.snapshot();
        let recorders = self.recorders.lock().await;
        for endpoint in &roster {
            for (media_type, ssrc) in endpoint.ssrcs() {
                if let Some(recorder) = recorders.get(media_type) {
                    recorder.synchronizer().set_endpoint(*ssrc, endpoint.id());
                    info!(
                        target: "recorder.session",
                        endpoint = %endpoint.id(),
                        media_type = %media_type,
                        ssrc,
                        "endpoint bound"
                    );
                }
            }
        }
    }

    /// The locally generated SSRC per media type, computed from the
    /// live receive paths on first call and memoized.
    pub async fn local_ssrcs(&self) -> HashMap<MediaType, u32> {
        {
            let cache = lock(&self.local_ssrcs);
            if !cache.is_empty() {
                return cache.clone();
            }
        }

        let streams = self.streams.lock().await;
        let computed: HashMap<MediaType, u32> = streams
            .iter()
            .map(|(media_type, path)| (*media_type, path.local_ssrc()))
            .collect();

        let mut cache = lock(&self.local_ssrcs);
        if cache.is_empty() {
            *cache = computed;
        }
        cache.clone()
    }

    /// The roster registry shared with the sink and the bridge.
    #[must_use]
    pub fn endpoint_registry(&self) -> Arc<EndpointRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn add_task_event_listener(&self, listener: Arc<dyn TaskEventListener>) {
        lock(&self.listeners).push(listener);
    }

    pub fn remove_task_event_listener(&self, listener: &Arc<dyn TaskEventListener>) {
        lock(&self.listeners).retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Delivery holds the listeners lock, so it is serialized against
    /// add/remove.
    fn fire_event(&self, event: TaskEvent) {
        let listeners = lock(&self.listeners);
        for listener in listeners.iter() {
            listener.handle_task_event(event);
        }
    }
}
