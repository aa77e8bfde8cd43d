//! Durable metadata log for a recording session.
//!
//! One JSON object per line. Speaker-change events are correlated to
//! their video SSRC here, under the same critical section that guards
//! the writer, so a roster replacement can never interleave with a
//! resolution.

use crate::endpoints::EndpointRegistry;
use crate::errors::SinkError;
use media_recording::{EventKind, MediaType, RecorderEvent, RecorderEventHandler};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

/// Default metadata file name inside the session output directory.
pub const DEFAULT_METADATA_FILENAME: &str = "metadata.json";

struct LineWriter {
    writer: BufWriter<File>,
    path: PathBuf,
}

/// Append-only JSON-lines event log with collision-avoiding naming.
pub struct MetadataSink {
    registry: Arc<EndpointRegistry>,
    // One lock serializes correlation and the write behind it.
    writer: Mutex<LineWriter>,
}

impl MetadataSink {
    /// Create the sink inside `output_dir`.
    ///
    /// If `filename` is taken, numeric suffixes (`metadata.json-1`,
    /// `metadata.json-2`, ...) are tried until a fresh file can be
    /// created. Any failure other than pre-existence (permissions,
    /// missing directory) is fatal.
    pub fn create(
        output_dir: &Path,
        filename: &str,
        registry: Arc<EndpointRegistry>,
    ) -> Result<Self, SinkError> {
        let mut count = 0;
        let (file, path) = loop {
            let candidate = if count == 0 {
                output_dir.join(filename)
            } else {
                output_dir.join(format!("{filename}-{count}"))
            };
            match Self::try_create(&candidate) {
                Ok(file) => break (file, candidate),
                Err(SinkError::AlreadyExists(taken)) => {
                    debug!(
                        target: "recorder.sink",
                        path = %taken.display(),
                        "metadata file exists, trying next suffix"
                    );
                    count += 1;
                }
                Err(err) => return Err(err),
            }
        };

        debug!(target: "recorder.sink", path = %path.display(), "metadata sink created");

        Ok(Self {
            registry,
            writer: Mutex::new(LineWriter {
                writer: BufWriter::new(file),
                path,
            }),
        })
    }

    /// Create the file only if it does not exist, so pre-existence and
    /// real I/O failures stay distinguishable.
    fn try_create(path: &Path) -> Result<File, SinkError> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| {
                if source.kind() == ErrorKind::AlreadyExists {
                    SinkError::AlreadyExists(path.to_path_buf())
                } else {
                    SinkError::Io {
                        path: path.to_path_buf(),
                        source,
                    }
                }
            })
    }

    /// The file this sink writes to (after suffix resolution).
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.lock().path.clone()
    }

    fn lock(&self) -> MutexGuard<'_, LineWriter> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecorderEventHandler for MetadataSink {
    /// Correlate (for speaker changes) and persist one event.
    ///
    /// Returns `false` when the event was dropped: either correlation
    /// failed or the write did. An uncorrelated speaker change is
    /// never written; a persisted `ssrc: -1` would corrupt downstream
    /// analysis.
    fn handle_event(&self, mut event: RecorderEvent) -> bool {
        let mut guard = self.lock();

        if event.kind == EventKind::SpeakerChanged {
            let resolved = u32::try_from(event.audio_ssrc)
                .ok()
                .and_then(|audio| self.registry.resolve_associated_ssrc(audio, MediaType::Video));
            match resolved {
                Some(video_ssrc) => {
                    // Downstream consumers index by video SSRC; first
                    // roster match is authoritative.
                    event.ssrc = i64::from(video_ssrc);
                }
                None => {
                    error!(
                        target: "recorder.sink",
                        audio_ssrc = event.audio_ssrc,
                        "no video SSRC associated with speaker change, dropping event"
                    );
                    return false;
                }
            }
        }

        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(err) => {
                warn!(target: "recorder.sink", error = %err, "could not encode event");
                return false;
            }
        };

        let written = writeln!(guard.writer, "{line}").and_then(|()| guard.writer.flush());
        if let Err(err) = written {
            warn!(
                target: "recorder.sink",
                path = %guard.path.display(),
                error = %err,
                "could not append event"
            );
            return false;
        }

        debug!(target: "recorder.sink", kind = %event.kind, ssrc = event.ssrc, "event recorded");
        true
    }
}
