//! Audio source discovery and selection policy.
//!
//! Sources are enumerated fresh on every request. Selection prefers a
//! `RUNNING` source, then an `IDLE` one, then whatever the server listed
//! first. An empty result means "use the system default".

use tracing::{debug, instrument};

use crate::adapters::AudioServer;
use crate::domain::{AudioSource, SourceListing, SourceState};

/// Device inventory backed by an audio server adapter
pub struct DeviceInventory<'a> {
    server: &'a dyn AudioServer,
}

impl<'a> DeviceInventory<'a> {
    pub fn new(server: &'a dyn AudioServer) -> Self {
        Self { server }
    }

    /// Enumerate and classify all input sources
    #[instrument(skip(self), fields(server = self.server.name()))]
    pub async fn list_sources(&self) -> SourceListing {
        let listing = SourceListing::classify(self.server.list_sources().await);
        debug!(
            mics = listing.mic_sources.len(),
            monitors = listing.monitor_sources.len(),
            "Classified audio sources"
        );
        listing
    }

    /// Best microphone name, or empty string
    pub async fn pick_mic(&self) -> String {
        pick_source(&self.list_sources().await.mic_sources)
    }

    /// Best monitor name, or empty string
    pub async fn pick_monitor(&self) -> String {
        pick_source(&self.list_sources().await.monitor_sources)
    }
}

/// Apply the selection policy to one pool.
///
/// Suspended or otherwise-stated sources are only chosen by the final
/// "first found" fallback.
pub fn pick_source(sources: &[AudioSource]) -> String {
    sources
        .iter()
        .find(|s| s.state == SourceState::Running)
        .or_else(|| sources.iter().find(|s| s.state == SourceState::Idle))
        .or_else(|| sources.first())
        .map(|s| s.name.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(name: &str, state: SourceState) -> AudioSource {
        AudioSource::new(name, state)
    }

    #[test]
    fn test_running_preferred_over_idle() {
        let sources = vec![
            src("a", SourceState::Idle),
            src("b", SourceState::Suspended),
            src("c", SourceState::Running),
        ];
        assert_eq!(pick_source(&sources), "c");
    }

    #[test]
    fn test_idle_preferred_over_suspended() {
        let sources = vec![src("a", SourceState::Suspended), src("b", SourceState::Idle)];
        assert_eq!(pick_source(&sources), "b");
    }

    #[test]
    fn test_first_found_fallback_may_pick_suspended() {
        let sources = vec![
            src("a", SourceState::Suspended),
            src("b", SourceState::Other("UNKNOWN".into())),
        ];
        assert_eq!(pick_source(&sources), "a");
    }

    #[test]
    fn test_empty_pool() {
        assert_eq!(pick_source(&[]), "");
    }

    #[test]
    fn test_first_running_wins() {
        let sources = vec![src("a", SourceState::Running), src("b", SourceState::Running)];
        assert_eq!(pick_source(&sources), "a");
    }
}
