//! Media types and transport descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// The media types a session can receive.
///
/// Used as a map key throughout the session layer; a session holds at
/// most one receive path and one recorder per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Video,
    /// The out-of-band control channel (not recorded).
    Data,
}

impl MediaType {
    /// The media types that get a receive path and a recorder.
    pub const RECORDED: [MediaType; 2] = [MediaType::Audio, MediaType::Video];

    /// Canonical lowercase name, used for recorder labels and the
    /// event wire form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Data => "data",
        }
    }

    /// Parse a media type from its canonical name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "audio" => Some(MediaType::Audio),
            "video" => Some(MediaType::Video),
            "data" => Some(MediaType::Data),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A negotiated media format and its RTP clock rate.
///
/// Paired with a dynamic payload type when configuring a receive path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaFormat {
    /// Encoding name, e.g. "opus" or "VP8".
    pub encoding: String,
    /// RTP clock rate in Hz.
    pub clock_rate: u32,
}

impl MediaFormat {
    #[must_use]
    pub fn new(encoding: impl Into<String>, clock_rate: u32) -> Self {
        Self {
            encoding: encoding.into(),
            clock_rate,
        }
    }
}

/// Local socket pair a receive path is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConnector {
    pub rtp: SocketAddr,
    pub rtcp: SocketAddr,
}

impl StreamConnector {
    #[must_use]
    pub const fn new(rtp: SocketAddr, rtcp: SocketAddr) -> Self {
        Self { rtp, rtcp }
    }
}

/// Remote address pair a receive path reads a stream from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaStreamTarget {
    pub rtp: SocketAddr,
    pub rtcp: SocketAddr,
}

impl MediaStreamTarget {
    #[must_use]
    pub const fn new(rtp: SocketAddr, rtcp: SocketAddr) -> Self {
        Self { rtp, rtcp }
    }
}
