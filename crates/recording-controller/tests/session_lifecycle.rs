//! Full session lifecycle integration tests.
//!
//! Drives a `RecordingSession` end to end against the in-memory
//! capability mocks: init, start, a dominant-speaker notification on
//! the control channel, and teardown, asserting on the metadata
//! journal the session leaves behind.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use recording_controller::{Config, Endpoint, Phase, RecordingSession};

use media_recording::mock::{MockDataChannel, MockMediaFactory, MockSecureTransport};
use media_recording::{
    ChannelMessage, MediaFactory, MediaFormat, MediaStreamTarget, MediaType, SecureTransport,
    StreamConnector,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("recorder=debug")
        .with_test_writer()
        .try_init();
}

fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().unwrap()
}

fn transports() -> HashMap<MediaType, Arc<dyn SecureTransport>> {
    [MediaType::Audio, MediaType::Video, MediaType::Data]
        .into_iter()
        .map(|media_type| {
            (
                media_type,
                MockSecureTransport::new() as Arc<dyn SecureTransport>,
            )
        })
        .collect()
}

#[allow(clippy::type_complexity)]
fn media_parameters() -> (
    HashMap<MediaType, Vec<(MediaFormat, u8)>>,
    HashMap<MediaType, StreamConnector>,
    HashMap<MediaType, MediaStreamTarget>,
) {
    let formats = HashMap::from([
        (
            MediaType::Audio,
            vec![(MediaFormat::new("opus", 48_000), 111)],
        ),
        (
            MediaType::Video,
            vec![(MediaFormat::new("VP8", 90_000), 100)],
        ),
        (MediaType::Data, vec![]),
    ]);
    let connectors = HashMap::from([
        (
            MediaType::Audio,
            StreamConnector::new(addr(10_000), addr(10_001)),
        ),
        (
            MediaType::Video,
            StreamConnector::new(addr(10_002), addr(10_003)),
        ),
        (
            MediaType::Data,
            StreamConnector::new(addr(10_004), addr(10_005)),
        ),
    ]);
    let targets = HashMap::from([
        (
            MediaType::Audio,
            MediaStreamTarget::new(addr(20_000), addr(20_001)),
        ),
        (
            MediaType::Video,
            MediaStreamTarget::new(addr(20_002), addr(20_003)),
        ),
        (
            MediaType::Data,
            MediaStreamTarget::new(addr(20_004), addr(20_005)),
        ),
    ]);
    (formats, connectors, targets)
}

/// Poll the metadata journal until `predicate` matches a line.
async fn wait_for_journal_line(
    path: &Path,
    predicate: impl Fn(&serde_json::Value) -> bool,
) -> Result<serde_json::Value, anyhow::Error> {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(contents) = std::fs::read_to_string(path) {
                for line in contents.lines() {
                    let json: serde_json::Value = serde_json::from_str(line)?;
                    if predicate(&json) {
                        return Ok(json);
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("expected journal line never appeared"))?
}

/// A speaker-change notification arriving on the control channel ends
/// up in the metadata journal with the speaker's *video* SSRC.
#[tokio::test]
async fn test_speaker_change_flows_into_the_metadata_journal(
) -> Result<(), anyhow::Error> {
    init_tracing();

    let dir = TempDir::new()?;
    let factory = MockMediaFactory::new();
    let session = RecordingSession::new(
        Arc::clone(&factory) as Arc<dyn MediaFactory>,
        Config::default(),
    );

    session.init(dir.path(), transports()).await?;
    let (formats, connectors, targets) = media_parameters();
    session.start_recording(formats, connectors, targets).await?;
    assert_eq!(session.phase(), Phase::Recording);

    // The roster arrives after recording started, as it does live.
    session
        .set_endpoints(vec![
            Endpoint::new("alice@conference/web")
                .with_ssrc(MediaType::Audio, 1111)
                .with_ssrc(MediaType::Video, 2222),
            Endpoint::new("bob@conference/web")
                .with_ssrc(MediaType::Audio, 3333)
                .with_ssrc(MediaType::Video, 4444),
        ])
        .await;

    // The remote side opens the default sub-channel and announces a
    // dominant speaker.
    let manager = factory
        .channel_manager()
        .expect("control channel was not opened");
    let (channel, sender) = MockDataChannel::channel(0);
    manager.install_channel(channel);
    sender
        .send(ChannelMessage::Text(
            r#"{"dominantSpeakerEndpoint": "bob@conference"}"#.to_string(),
        ))
        .await?;

    let journal = dir.path().join("metadata.json");
    let line = wait_for_journal_line(&journal, |json| {
        json["type"] == "SPEAKER_CHANGED"
    })
    .await?;

    // Bob's audio SSRC was resolved by bare id and correlated to his
    // video SSRC.
    assert_eq!(line["audioSsrc"], 3333);
    assert_eq!(line["ssrc"], 4444);
    assert!(line["instant"].as_i64().unwrap() > 0);

    session.stop_recording().await;
    assert_eq!(session.phase(), Phase::Stopped);
    assert_eq!(manager.shutdown_count(), 1);

    Ok(())
}

/// Recorder-emitted events and speaker changes share one journal; an
/// unresolvable speaker is dropped without disturbing the rest.
#[tokio::test]
async fn test_journal_keeps_recorder_events_and_drops_unresolved_speakers(
) -> Result<(), anyhow::Error> {
    init_tracing();

    let dir = TempDir::new()?;
    let factory = MockMediaFactory::new();
    let session = RecordingSession::new(
        Arc::clone(&factory) as Arc<dyn MediaFactory>,
        Config::default(),
    );

    session.init(dir.path(), transports()).await?;
    let (formats, connectors, targets) = media_parameters();
    session.start_recording(formats, connectors, targets).await?;

    // Empty roster: nobody can be resolved.
    let manager = factory.channel_manager().unwrap();
    let (channel, sender) = MockDataChannel::channel(0);
    manager.install_channel(channel);
    sender
        .send(ChannelMessage::Text(
            r#"{"dominantSpeakerEndpoint": "ghost@conference"}"#.to_string(),
        ))
        .await?;

    // A recorder event from the media layer still lands in the journal.
    let event = media_recording::RecorderEvent {
        kind: media_recording::EventKind::Started,
        instant: 12_345,
        ssrc: 777,
        filename: Some("video.webm".to_string()),
        ..Default::default()
    };
    assert_eq!(
        factory.recorder(MediaType::Video).unwrap().emit(event),
        Some(true)
    );

    let journal = dir.path().join("metadata.json");
    let line = wait_for_journal_line(&journal, |json| {
        json["type"] == "RECORDING_STARTED"
    })
    .await?;
    assert_eq!(line["ssrc"], 777);
    assert_eq!(line["filename"], "video.webm");

    session.stop_recording().await;

    // The dropped speaker change never made it to disk.
    let contents = std::fs::read_to_string(&journal)?;
    assert!(!contents.contains("SPEAKER_CHANGED"));

    Ok(())
}

/// Stopping tears down every resource the partial start created, even
/// when the receive paths never all came up.
#[tokio::test]
async fn test_stop_after_partial_start_releases_everything(
) -> Result<(), anyhow::Error> {
    init_tracing();

    let dir = TempDir::new()?;
    let factory = MockMediaFactory::new();
    factory.fail_path_start(MediaType::Audio);
    let session = RecordingSession::new(
        Arc::clone(&factory) as Arc<dyn MediaFactory>,
        Config::default(),
    );

    session.init(dir.path(), transports()).await?;
    let (formats, connectors, targets) = media_parameters();
    let result = session.start_recording(formats, connectors, targets).await;
    assert!(result.is_err());

    session.stop_recording().await;
    assert_eq!(session.phase(), Phase::Stopped);
    for media_type in MediaType::RECORDED {
        assert!(factory.path(media_type).unwrap().is_closed());
    }
    // The control channel was opened before the failure and must be
    // shut down too.
    assert_eq!(factory.channel_manager().unwrap().shutdown_count(), 1);

    Ok(())
}
