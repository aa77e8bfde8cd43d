//! The recordable event model and its JSON wire form.
//!
//! Events are persisted one JSON object per line in the session's
//! metadata file. Construction from inbound JSON is permissive: every
//! field is independently optional and a type-mismatched field falls
//! back to its default instead of failing the whole event.

use crate::media::MediaType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What kind of occurrence an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A recording started.
    #[serde(rename = "RECORDING_STARTED")]
    Started,

    /// A recording ended.
    #[serde(rename = "RECORDING_ENDED")]
    Ended,

    /// The active speaker changed. `audio_ssrc` carries the SSRC of the
    /// now-active audio stream; `ssrc` carries the associated video
    /// SSRC once correlation has run.
    #[serde(rename = "SPEAKER_CHANGED")]
    SpeakerChanged,

    /// A new stream was added to an existing recording (e.g. a new
    /// audio stream joining a mix).
    #[serde(rename = "STREAM_ADDED")]
    StreamAdded,

    /// Default / unrecognized.
    #[serde(rename = "OTHER")]
    Other,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventKind::Started => "RECORDING_STARTED",
            EventKind::Ended => "RECORDING_ENDED",
            EventKind::SpeakerChanged => "SPEAKER_CHANGED",
            EventKind::StreamAdded => "STREAM_ADDED",
            EventKind::Other => "OTHER",
        }
    }

    /// Parse a kind from its wire name; anything unrecognized is
    /// [`EventKind::Other`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "RECORDING_STARTED" => EventKind::Started,
            "RECORDING_ENDED" => EventKind::Ended,
            "SPEAKER_CHANGED" => EventKind::SpeakerChanged,
            "STREAM_ADDED" => EventKind::StreamAdded,
            _ => EventKind::Other,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video aspect ratio attached to stream events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16_9")]
    SixteenNine,
    #[serde(rename = "4_3")]
    FourThree,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl AspectRatio {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::SixteenNine => "16_9",
            AspectRatio::FourThree => "4_3",
            AspectRatio::Unknown => "UNKNOWN",
        }
    }

    /// Width-to-height scale factor; 1.0 when unknown.
    #[must_use]
    pub fn scale_factor(&self) -> f64 {
        match self {
            AspectRatio::SixteenNine => 16.0 / 9.0,
            AspectRatio::FourThree => 4.0 / 3.0,
            AspectRatio::Unknown => 1.0,
        }
    }

    /// Parse from the wire name; anything unrecognized is
    /// [`AspectRatio::Unknown`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "16_9" => AspectRatio::SixteenNine,
            "4_3" => AspectRatio::FourThree,
            _ => AspectRatio::Unknown,
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recordable occurrence within a session.
///
/// Numeric fields use -1 (and -1.0 for `ntp_time`) as the "unset"
/// sentinel, which is also what gets persisted when a field was never
/// filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Wall-clock timestamp in milliseconds since the epoch.
    pub instant: i64,

    /// Primary SSRC the event is about. For `SpeakerChanged` this is
    /// rewritten to the correlated video SSRC before persistence.
    pub ssrc: i64,

    /// Audio SSRC; only meaningful for `SpeakerChanged`.
    #[serde(rename = "audioSsrc")]
    pub audio_ssrc: i64,

    #[serde(rename = "ntpTime")]
    pub ntp_time: f64,

    /// RTP clock value at the event instant.
    #[serde(rename = "rtpTimestamp")]
    pub rtp_timestamp: i64,

    pub duration: i64,

    #[serde(rename = "aspectRatio")]
    pub aspect_ratio: AspectRatio,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(rename = "participantName", skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,

    #[serde(
        rename = "participantDescription",
        skip_serializing_if = "Option::is_none"
    )]
    pub participant_description: Option<String>,

    #[serde(rename = "mediaType", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,

    #[serde(rename = "disableOtherVideosOnTop")]
    pub disable_other_videos_on_top: bool,
}

impl Default for RecorderEvent {
    fn default() -> Self {
        Self {
            kind: EventKind::Other,
            instant: -1,
            ssrc: -1,
            audio_ssrc: -1,
            ntp_time: -1.0,
            rtp_timestamp: -1,
            duration: -1,
            aspect_ratio: AspectRatio::Unknown,
            filename: None,
            participant_name: None,
            participant_description: None,
            media_type: None,
            disable_other_videos_on_top: false,
        }
    }
}

impl RecorderEvent {
    /// A speaker-change event as produced by the control channel.
    ///
    /// `audio_ssrc` may be -1 when the endpoint could not be resolved;
    /// the metadata sink will then drop the event at correlation time.
    #[must_use]
    pub fn speaker_changed(audio_ssrc: i64, instant: i64) -> Self {
        Self {
            kind: EventKind::SpeakerChanged,
            media_type: Some(MediaType::Audio),
            audio_ssrc,
            instant,
            ..Self::default()
        }
    }

    /// Permissively build an event from arbitrary JSON.
    ///
    /// Every field is optional; a missing or type-mismatched field
    /// keeps its default. This never fails: garbage in yields an
    /// `Other` event with sentinel values.
    #[must_use]
    pub fn from_json(json: &Value) -> Self {
        let mut event = Self::default();

        if let Some(s) = json.get("type").and_then(Value::as_str) {
            event.kind = EventKind::parse(s);
        }
        if let Some(n) = json.get("instant").and_then(Value::as_i64) {
            event.instant = n;
        }
        if let Some(n) = json.get("ssrc").and_then(Value::as_i64) {
            event.ssrc = n;
        }
        if let Some(n) = json.get("audioSsrc").and_then(Value::as_i64) {
            event.audio_ssrc = n;
        }
        if let Some(n) = json.get("ntpTime").and_then(Value::as_f64) {
            event.ntp_time = n;
        }
        if let Some(n) = json.get("rtpTimestamp").and_then(Value::as_i64) {
            event.rtp_timestamp = n;
        }
        if let Some(n) = json.get("duration").and_then(Value::as_i64) {
            event.duration = n;
        }
        if let Some(s) = json.get("aspectRatio").and_then(Value::as_str) {
            event.aspect_ratio = AspectRatio::parse(s);
        }
        if let Some(s) = json.get("filename").and_then(Value::as_str) {
            event.filename = Some(s.to_string());
        }
        if let Some(s) = json.get("participantName").and_then(Value::as_str) {
            event.participant_name = Some(s.to_string());
        }
        if let Some(s) = json.get("participantDescription").and_then(Value::as_str) {
            event.participant_description = Some(s.to_string());
        }
        if let Some(s) = json.get("mediaType").and_then(Value::as_str) {
            event.media_type = MediaType::parse(s);
        }
        match json.get("disableOtherVideosOnTop") {
            Some(Value::Bool(b)) => event.disable_other_videos_on_top = *b,
            Some(Value::String(s)) => {
                event.disable_other_videos_on_top = s.eq_ignore_ascii_case("true");
            }
            _ => {}
        }

        event
    }
}

impl fmt::Display for RecorderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecorderEvent: {} @{}", self.kind, self.instant)?;
        if let Some(media_type) = self.media_type {
            write!(f, " ({media_type})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_parse_falls_back_to_other() {
        assert_eq!(EventKind::parse("SPEAKER_CHANGED"), EventKind::SpeakerChanged);
        assert_eq!(EventKind::parse("RECORDING_STARTED"), EventKind::Started);
        assert_eq!(EventKind::parse("bogus"), EventKind::Other);
        assert_eq!(EventKind::parse(""), EventKind::Other);
    }

    #[test]
    fn test_aspect_ratio_parse() {
        assert_eq!(AspectRatio::parse("16_9"), AspectRatio::SixteenNine);
        assert_eq!(AspectRatio::parse("4_3"), AspectRatio::FourThree);
        assert_eq!(AspectRatio::parse("9_16"), AspectRatio::Unknown);
        assert!((AspectRatio::FourThree.scale_factor() - 4.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_json_empty_object_yields_defaults() {
        let event = RecorderEvent::from_json(&json!({}));
        assert_eq!(event.kind, EventKind::Other);
        assert_eq!(event.instant, -1);
        assert_eq!(event.ssrc, -1);
        assert_eq!(event.audio_ssrc, -1);
        assert_eq!(event.rtp_timestamp, -1);
        assert_eq!(event.duration, -1);
        assert_eq!(event.aspect_ratio, AspectRatio::Unknown);
        assert!(event.filename.is_none());
        assert!(!event.disable_other_videos_on_top);
    }

    #[test]
    fn test_from_json_ignores_type_mismatches() {
        // Strings where numbers belong, numbers where strings belong.
        let event = RecorderEvent::from_json(&json!({
            "type": "SPEAKER_CHANGED",
            "instant": "not a number",
            "ssrc": 1234,
            "audioSsrc": {"nested": true},
            "participantName": 42,
        }));
        assert_eq!(event.kind, EventKind::SpeakerChanged);
        assert_eq!(event.instant, -1);
        assert_eq!(event.ssrc, 1234);
        assert_eq!(event.audio_ssrc, -1);
        assert!(event.participant_name.is_none());
    }

    #[test]
    fn test_from_json_full_event() {
        let event = RecorderEvent::from_json(&json!({
            "type": "STREAM_ADDED",
            "instant": 1000,
            "ssrc": 200,
            "audioSsrc": 100,
            "ntpTime": 3.5,
            "rtpTimestamp": 1_234_567,
            "duration": 60000,
            "aspectRatio": "16_9",
            "filename": "video-200.webm",
            "participantName": "Alice",
            "participantDescription": "host",
            "mediaType": "video",
            "disableOtherVideosOnTop": true,
        }));
        assert_eq!(event.kind, EventKind::StreamAdded);
        assert_eq!(event.instant, 1000);
        assert_eq!(event.ssrc, 200);
        assert_eq!(event.audio_ssrc, 100);
        assert!((event.ntp_time - 3.5).abs() < f64::EPSILON);
        assert_eq!(event.rtp_timestamp, 1_234_567);
        assert_eq!(event.duration, 60000);
        assert_eq!(event.aspect_ratio, AspectRatio::SixteenNine);
        assert_eq!(event.filename.as_deref(), Some("video-200.webm"));
        assert_eq!(event.participant_name.as_deref(), Some("Alice"));
        assert_eq!(event.media_type, Some(MediaType::Video));
        assert!(event.disable_other_videos_on_top);
    }

    #[test]
    fn test_disable_other_videos_on_top_accepts_string_form() {
        let event = RecorderEvent::from_json(&json!({"disableOtherVideosOnTop": "true"}));
        assert!(event.disable_other_videos_on_top);
        let event = RecorderEvent::from_json(&json!({"disableOtherVideosOnTop": "false"}));
        assert!(!event.disable_other_videos_on_top);
    }

    #[test]
    fn test_wire_field_names() {
        let mut event = RecorderEvent::speaker_changed(100, 5000);
        event.ssrc = 200;
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "SPEAKER_CHANGED");
        assert_eq!(value["instant"], 5000);
        assert_eq!(value["ssrc"], 200);
        assert_eq!(value["audioSsrc"], 100);
        assert_eq!(value["ntpTime"], -1.0);
        assert_eq!(value["rtpTimestamp"], -1);
        assert_eq!(value["duration"], -1);
        assert_eq!(value["aspectRatio"], "UNKNOWN");
        assert_eq!(value["mediaType"], "audio");
        assert_eq!(value["disableOtherVideosOnTop"], false);
        // Unset optional strings are omitted from the line.
        assert!(value.get("filename").is_none());
        assert!(value.get("participantName").is_none());
    }

    #[test]
    fn test_serialized_line_round_trips_through_from_json() {
        let mut event = RecorderEvent::default();
        event.kind = EventKind::Started;
        event.instant = 42;
        event.media_type = Some(MediaType::Video);
        event.filename = Some("video.webm".to_string());

        let line = serde_json::to_string(&event).unwrap();
        let parsed = RecorderEvent::from_json(&serde_json::from_str(&line).unwrap());
        assert_eq!(parsed.kind, EventKind::Started);
        assert_eq!(parsed.instant, 42);
        assert_eq!(parsed.media_type, Some(MediaType::Video));
        assert_eq!(parsed.filename.as_deref(), Some("video.webm"));
    }
}
