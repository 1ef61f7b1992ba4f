// Last.fm scrobbler implementation
// API Documentation: https://www.last.fm/api

use super::traits::Scrobbler;
use crate::config::LastFmConfig;
use crate::playback::ScrobbleEvent;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use rustfm_scrobble_proxy::{Scrobble, Scrobbler as LastFmClient};
use serde::Deserialize;
use serde_json::Value;

pub(crate) const API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// user.getRecentTracks accepts at most 200 entries per page
const MAX_PAGE_SIZE: usize = 200;

pub struct LastFmScrobbler {
    client: LastFmClient,
    api_key: String,
    username: String,
}

impl LastFmScrobbler {
    pub fn new(config: &LastFmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            anyhow::bail!("Last.fm api_key is required when Last.fm is enabled");
        }
        if config.api_secret.is_empty() {
            anyhow::bail!("Last.fm api_secret is required when Last.fm is enabled");
        }
        if config.session_key.is_empty() || config.username.is_empty() {
            anyhow::bail!("Last.fm is enabled, but not authenticated (run `lastfm-auth`)");
        }

        let mut client = LastFmClient::new(&config.api_key, &config.api_secret);
        client.authenticate_with_session_key(&config.session_key);

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            username: config.username.clone(),
        })
    }

    fn recent_tracks_page(
        &self,
        page: u32,
        limit: usize,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<RecentTracks> {
        log::debug!("Fetching page {} of recent tracks from Last.fm", page);

        let response = call_api(&[
            ("method", "user.getrecenttracks".to_string()),
            ("user", self.username.clone()),
            ("api_key", self.api_key.clone()),
            ("limit", limit.to_string()),
            ("page", page.to_string()),
            ("from", from.timestamp().to_string()),
            ("to", to.timestamp().to_string()),
        ])?;

        let page: RecentTracksResponse =
            serde_json::from_value(response).context("Unexpected user.getRecentTracks response")?;

        Ok(page.recenttracks)
    }
}

fn to_scrobble(event: &ScrobbleEvent) -> Scrobble {
    Scrobble::new(&event.join_artists(), &event.track, Some(event.album.as_str()))
}

impl Scrobbler for LastFmScrobbler {
    fn name(&self) -> &str {
        "last.fm"
    }

    fn now_playing(&self, event: &ScrobbleEvent) -> Result<()> {
        log::debug!("Sending now playing to Last.fm: {}", event.describe());

        self.client
            .now_playing(&to_scrobble(event))
            .context("Failed to update now playing on Last.fm")?;

        log::info!("Last.fm: Now playing updated");
        Ok(())
    }

    fn scrobble(&self, event: &ScrobbleEvent) -> Result<()> {
        log::debug!("Scrobbling to Last.fm: {}", event.describe());

        let mut scrobble = to_scrobble(event);
        scrobble.with_timestamp(event.timestamp.timestamp().max(0) as u64);
        self.client
            .scrobble(&scrobble)
            .context("Failed to scrobble to Last.fm")?;

        log::info!("Last.fm: Scrobbled successfully");
        Ok(())
    }

    fn recent_scrobbles(
        &self,
        limit: usize,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScrobbleEvent>> {
        let mut scrobbles = Vec::new();
        let mut page = 1;

        loop {
            let recent = self.recent_tracks_page(page, limit.min(MAX_PAGE_SIZE), from, to)?;
            let total_pages = recent.total_pages();

            for track in recent.track.into_vec() {
                // the currently playing track has no date and is not a scrobble yet
                let Some(event) = track.into_event() else {
                    continue;
                };
                scrobbles.push(event);
                if scrobbles.len() >= limit {
                    return Ok(scrobbles);
                }
            }

            if page >= total_pages {
                return Ok(scrobbles);
            }
            page += 1;
        }
    }
}

/// GET a Last.fm API method and return the JSON body, turning API errors into `Err`
pub(crate) fn call_api(params: &[(&str, String)]) -> Result<Value> {
    let mut request = attohttpc::get(API_URL).param("format", "json");
    for (key, value) in params {
        request = request.param(key, value);
    }

    let response = request.send().context("Failed to send request to Last.fm")?;
    let status = response.status();
    let body = response.text().context("Failed to read Last.fm response")?;

    let json: Value = serde_json::from_str(&body)
        .with_context(|| format!("Last.fm returned invalid JSON ({})", status))?;

    if let Some(code) = json.get("error").and_then(Value::as_i64) {
        let message = json.get("message").and_then(Value::as_str).unwrap_or_default();
        return Err(ApiError {
            code,
            message: message.to_string(),
        }
        .into());
    }

    if !status.is_success() {
        anyhow::bail!("Last.fm API error ({}): {}", status, body);
    }

    Ok(json)
}

/// Error object returned by the Last.fm API
#[derive(Debug, thiserror::Error)]
#[error("Last.fm API error {code}: {message}")]
pub(crate) struct ApiError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct RecentTracksResponse {
    recenttracks: RecentTracks,
}

#[derive(Debug, Deserialize)]
struct RecentTracks {
    #[serde(default)]
    track: OneOrMany<RecentTrack>,
    #[serde(rename = "@attr")]
    attr: Option<PageAttr>,
}

impl RecentTracks {
    fn total_pages(&self) -> u32 {
        self.attr
            .as_ref()
            .and_then(|attr| attr.total_pages.parse().ok())
            .unwrap_or(1)
    }
}

#[derive(Debug, Deserialize)]
struct PageAttr {
    #[serde(rename = "totalPages")]
    total_pages: String,
}

/// Last.fm collapses single-element lists into a bare object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecentTrack {
    artist: TextField,
    name: String,
    #[serde(default)]
    album: Option<TextField>,
    date: Option<DateField>,
}

#[derive(Debug, Deserialize)]
struct TextField {
    #[serde(rename = "#text")]
    text: String,
}

#[derive(Debug, Deserialize)]
struct DateField {
    uts: String,
}

impl RecentTrack {
    fn into_event(self) -> Option<ScrobbleEvent> {
        let timestamp = self.date?.uts.parse().ok()?;

        Some(ScrobbleEvent {
            // Last.fm returns the joined artist string we submitted
            artists: vec![self.artist.text],
            track: self.name,
            album: self.album.map(|a| a.text).unwrap_or_default(),
            duration: TimeDelta::zero(),
            timestamp: DateTime::from_timestamp(timestamp, 0)?,
        })
    }
}
