// Common traits for scrobbling services

use crate::playback::ScrobbleEvent;
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Common trait for all scrobbling services
pub trait Scrobbler {
    /// Unique name, used in logs, notifications and on the command line
    fn name(&self) -> &str;

    /// Update "now playing" status. Called on every track change, so it must
    /// be safe to repeat.
    fn now_playing(&self, event: &ScrobbleEvent) -> Result<()>;

    /// Submit a scrobble
    fn scrobble(&self, event: &ScrobbleEvent) -> Result<()>;

    /// Most recent scrobbles in `[from, to]`, newest first
    fn recent_scrobbles(
        &self,
        _limit: usize,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<ScrobbleEvent>> {
        anyhow::bail!("{} does not support listing scrobbles", self.name())
    }
}
