// ListenBrainz scrobbler implementation
// API Documentation: https://listenbrainz.readthedocs.io/

use super::traits::Scrobbler;
use crate::config::ListenBrainzConfig;
use crate::playback::ScrobbleEvent;
use anyhow::{Context, Result};
use listenbrainz::ListenBrainz;

const DEFAULT_API_URL: &str = "https://api.listenbrainz.org";

pub struct ListenBrainzScrobbler {
    name: String,
    client: ListenBrainz,
}

impl ListenBrainzScrobbler {
    pub fn new(config: &ListenBrainzConfig) -> Result<Self> {
        if config.token.is_empty() {
            anyhow::bail!(
                "ListenBrainz token is required when enabled (instance: {})",
                config.name
            );
        }
        if config.api_url.is_empty() {
            anyhow::bail!("ListenBrainz api_url is required (instance: {})", config.name);
        }

        let mut client = if config.api_url.trim_end_matches('/') == DEFAULT_API_URL {
            ListenBrainz::new()
        } else {
            ListenBrainz::new_with_url(&config.api_url)
        };

        client
            .authenticate(&config.token)
            .with_context(|| format!("Failed to authenticate with ListenBrainz ({})", config.name))?;

        Ok(Self {
            name: format!("listenbrainz:{}", config.name),
            client,
        })
    }
}

impl Scrobbler for ListenBrainzScrobbler {
    fn name(&self) -> &str {
        &self.name
    }

    fn now_playing(&self, event: &ScrobbleEvent) -> Result<()> {
        log::debug!("Sending now playing to {}: {}", self.name, event.describe());

        self.client
            .playing_now(&event.join_artists(), &event.track, Some(event.album.as_str()))
            .with_context(|| format!("Failed to update now playing on {}", self.name))?;

        log::info!("{}: Now playing updated", self.name);
        Ok(())
    }

    fn scrobble(&self, event: &ScrobbleEvent) -> Result<()> {
        log::debug!("Scrobbling to {}: {}", self.name, event.describe());

        // listen() would stamp the current time; import() keeps when the track started
        self.client
            .import(
                &event.join_artists(),
                &event.track,
                Some(event.album.as_str()),
                event.timestamp.timestamp(),
            )
            .with_context(|| format!("Failed to scrobble to {}", self.name))?;

        log::info!("{}: Scrobbled successfully", self.name);
        Ok(())
    }
}
