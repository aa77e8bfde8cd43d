//! Conference roster and cross-stream SSRC correlation.
//!
//! The signaling layer replaces the roster wholesale on every
//! membership change; readers always observe either the old or the new
//! roster in full, never a mix.

use media_recording::MediaType;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// One conference participant and its per-media-type SSRCs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    id: String,
    ssrcs: HashMap<MediaType, u32>,
}

impl Endpoint {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ssrcs: HashMap::new(),
        }
    }

    /// Builder-style SSRC registration.
    #[must_use]
    pub fn with_ssrc(mut self, media_type: MediaType, ssrc: u32) -> Self {
        self.ssrcs.insert(media_type, ssrc);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The identifier with any trailing resource qualifier stripped
    /// (`"abc@conf.example/resource1"` -> `"abc@conf.example"`).
    #[must_use]
    pub fn bare_id(&self) -> &str {
        self.id.split('/').next().unwrap_or(&self.id)
    }

    #[must_use]
    pub fn ssrc(&self, media_type: MediaType) -> Option<u32> {
        self.ssrcs.get(&media_type).copied()
    }

    #[must_use]
    pub fn ssrcs(&self) -> &HashMap<MediaType, u32> {
        &self.ssrcs
    }
}

/// Lock-guarded snapshot of the current roster.
///
/// All reads and the wholesale [`replace`](Self::replace) go through
/// one mutex, so a resolution never observes a half-replaced roster.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: Mutex<Vec<Endpoint>>,
}

impl EndpointRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically swap in a new roster.
    pub fn replace(&self, roster: Vec<Endpoint>) {
        debug!(
            target: "recorder.endpoints",
            endpoints = roster.len(),
            "roster replaced"
        );
        *self.lock() = roster;
    }

    /// Map one of an endpoint's SSRCs to its SSRC for `target`.
    ///
    /// Endpoints registered with fewer than two SSRCs cannot be
    /// correlated and are skipped. First match in roster order wins.
    #[must_use]
    pub fn resolve_associated_ssrc(&self, ssrc: u32, target: MediaType) -> Option<u32> {
        let endpoints = self.lock();
        for endpoint in endpoints.iter() {
            if endpoint.ssrcs.len() < 2 {
                continue;
            }
            if endpoint.ssrcs.values().any(|&s| s == ssrc) {
                return endpoint.ssrc(target);
            }
        }
        None
    }

    /// Look up an endpoint's SSRC for `media_type` by full or bare id.
    #[must_use]
    pub fn resolve_endpoint_ssrc(&self, endpoint_id: &str, media_type: MediaType) -> Option<u32> {
        let endpoints = self.lock();
        endpoints
            .iter()
            .find(|e| e.id == endpoint_id || e.bare_id() == endpoint_id)
            .and_then(|e| e.ssrc(media_type))
    }

    /// Clone of the current roster.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Endpoint> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Endpoint>> {
        // Roster state stays usable even if a reader panicked.
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn two_stream_endpoint(id: &str, audio: u32, video: u32) -> Endpoint {
        Endpoint::new(id)
            .with_ssrc(MediaType::Audio, audio)
            .with_ssrc(MediaType::Video, video)
    }

    #[test]
    fn test_associated_ssrc_resolution() {
        let registry = EndpointRegistry::new();
        registry.replace(vec![
            two_stream_endpoint("e1@conf.example", 100, 200),
            Endpoint::new("e2@conf.example").with_ssrc(MediaType::Audio, 300),
        ]);

        assert_eq!(
            registry.resolve_associated_ssrc(100, MediaType::Video),
            Some(200)
        );
        // Works in either direction.
        assert_eq!(
            registry.resolve_associated_ssrc(200, MediaType::Audio),
            Some(100)
        );
        // Single-SSRC endpoints are never matched.
        assert_eq!(registry.resolve_associated_ssrc(300, MediaType::Video), None);
        assert_eq!(registry.resolve_associated_ssrc(999, MediaType::Video), None);
    }

    #[test]
    fn test_first_match_wins_in_roster_order() {
        let registry = EndpointRegistry::new();
        registry.replace(vec![
            two_stream_endpoint("first@conf", 100, 200),
            two_stream_endpoint("second@conf", 100, 201),
        ]);
        assert_eq!(
            registry.resolve_associated_ssrc(100, MediaType::Video),
            Some(200)
        );
    }

    #[test]
    fn test_endpoint_ssrc_matches_full_and_bare_id() {
        let registry = EndpointRegistry::new();
        registry.replace(vec![two_stream_endpoint(
            "abc@conf.example/resource1",
            100,
            200,
        )]);

        assert_eq!(
            registry.resolve_endpoint_ssrc("abc@conf.example/resource1", MediaType::Audio),
            Some(100)
        );
        assert_eq!(
            registry.resolve_endpoint_ssrc("abc@conf.example", MediaType::Audio),
            Some(100)
        );
        assert_eq!(
            registry.resolve_endpoint_ssrc("other@conf.example", MediaType::Audio),
            None
        );
    }

    #[test]
    fn test_replace_discards_previous_roster() {
        let registry = EndpointRegistry::new();
        registry.replace(vec![two_stream_endpoint("e1@conf", 100, 200)]);
        registry.replace(vec![two_stream_endpoint("e2@conf", 300, 400)]);

        assert_eq!(registry.resolve_associated_ssrc(100, MediaType::Video), None);
        assert_eq!(
            registry.resolve_associated_ssrc(300, MediaType::Video),
            Some(400)
        );
    }

    #[test]
    fn test_replacement_is_atomic_under_concurrent_reads() {
        let registry = Arc::new(EndpointRegistry::new());
        let roster_a = vec![two_stream_endpoint("e@conf", 100, 200)];
        let roster_b = vec![two_stream_endpoint("e@conf", 100, 300)];
        registry.replace(roster_a.clone());

        let writer = {
            let registry = Arc::clone(&registry);
            let (a, b) = (roster_a.clone(), roster_b.clone());
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    registry.replace(a.clone());
                    registry.replace(b.clone());
                }
            })
        };

        // Every read must see one full roster: 100 always pairs with
        // exactly 200 or 300, never "not found" or anything else.
        for _ in 0..1000 {
            let resolved = registry.resolve_associated_ssrc(100, MediaType::Video);
            assert!(resolved == Some(200) || resolved == Some(300));
        }
        writer.join().unwrap();
    }
}
