// Common traits for media sources

use crate::playback::{PlaybackSnapshot, Snapshots};
use crate::text_cleanup::{Blacklist, TextCleaner};
use thiserror::Error;

/// Blacklist and normalization rules handed to every source
#[derive(Debug, Clone, Copy)]
pub struct SnapshotFilter<'a> {
    pub blacklist: &'a Blacklist,
    pub cleaner: &'a TextCleaner,
}

impl SnapshotFilter<'_> {
    /// Whether a raw player identity may be reported at all
    pub fn admits(&self, player: &str) -> bool {
        if self.blacklist.is_blacklisted(player) {
            log::debug!("Ignoring blacklisted player {}", player);
            return false;
        }
        true
    }

    pub fn clean(&self, snapshot: PlaybackSnapshot) -> PlaybackSnapshot {
        self.cleaner.clean(snapshot)
    }
}

/// A failed poll, possibly carrying the snapshots read before the failure
#[derive(Debug, Error)]
#[error("{error:#}")]
pub struct PollError {
    pub partial: Snapshots,
    pub error: anyhow::Error,
}

impl PollError {
    pub fn new(error: anyhow::Error) -> Self {
        Self {
            partial: Snapshots::new(),
            error,
        }
    }
}

/// Something that can tell which players are active and what they play
pub trait Source {
    fn name(&self) -> &str;

    /// Snapshot every active, non-blacklisted player, with metadata already normalized.
    /// Player identities should be qualified by the source name.
    fn snapshots(&self, filter: &SnapshotFilter<'_>) -> Result<Snapshots, PollError>;
}
