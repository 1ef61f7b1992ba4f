// Playback snapshot model
// Point-in-time view of one player plus the event handed to scrobblers

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Snapshots reported during one tick, keyed by player identity
pub type Snapshots = BTreeMap<String, PlaybackSnapshot>;

/// Transport state of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    Playing,
    Paused,
    #[default]
    Stopped,
}

impl PlaybackState {
    /// Map an MPRIS `PlaybackStatus` string, unknown values count as stopped
    pub fn from_mpris(status: &str) -> Self {
        match status {
            "Playing" => Self::Playing,
            "Paused" => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Playing => "Playing",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// What a single player is doing right now
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackSnapshot {
    pub artists: Vec<String>,
    pub track: String,
    pub album: String,
    pub duration: TimeDelta,
    pub position: TimeDelta,
    pub state: PlaybackState,
    pub captured_at: DateTime<Utc>,
}

impl PlaybackSnapshot {
    pub fn join_artists(&self) -> String {
        self.artists.join(", ")
    }

    /// Only valid snapshots are ever compared or scrobbled
    pub fn is_valid(&self) -> bool {
        !self.join_artists().is_empty()
            && !self.track.is_empty()
            && !self.album.is_empty()
            && !self.duration.is_zero()
    }

    /// Track identity comparison: artists (in order), title and album.
    /// Duration and position are deliberately ignored.
    pub fn same_track(&self, other: &Self) -> bool {
        self.artists.len() == other.artists.len()
            && self.artists.iter().zip(&other.artists).all(|(a, b)| a == b)
            && self.track == other.track
            && self.album == other.album
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Build the event for scrobblers, stamped with when the track started
    pub fn to_event(&self, started_at: DateTime<Utc>) -> ScrobbleEvent {
        ScrobbleEvent {
            artists: self.artists.clone(),
            track: self.track.clone(),
            album: self.album.clone(),
            duration: self.duration,
            timestamp: started_at,
        }
    }
}

/// A validated snapshot with a definitive start timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrobbleEvent {
    pub artists: Vec<String>,
    pub track: String,
    pub album: String,
    #[serde(with = "duration_millis", rename = "duration_ms")]
    pub duration: TimeDelta,
    pub timestamp: DateTime<Utc>,
}

impl ScrobbleEvent {
    pub fn join_artists(&self) -> String {
        self.artists.join(", ")
    }

    /// Short "Artist - Title" form used in logs and notifications
    pub fn describe(&self) -> String {
        format!("{} - {}", self.join_artists(), self.track)
    }
}

/// Format a duration as `mm:ss`
pub fn format_duration(duration: TimeDelta) -> String {
    if duration < TimeDelta::zero() {
        return "invalid duration".to_string();
    }
    let seconds = duration.num_seconds();
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

mod duration_millis {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        i64::deserialize(deserializer).map(TimeDelta::milliseconds)
    }
}
