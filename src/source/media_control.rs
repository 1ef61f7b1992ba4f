// media-control source
// Runs an external helper that prints the system now-playing state as JSON
// https://github.com/ungive/media-control

use super::traits::{PollError, SnapshotFilter, Source};
use crate::config::MediaControlConfig;
use crate::playback::{PlaybackSnapshot, PlaybackState, Snapshots};
use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::process::Command;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct MediaControlInfo {
    title: String,
    artist: String,
    album: String,
    /// Seconds
    duration: f64,
    /// Seconds, extrapolated to the time of the query
    elapsed_time_now: Option<f64>,
    elapsed_time: f64,
    timestamp: Option<DateTime<Utc>>,
    bundle_identifier: String,
    playing: bool,
}

pub struct MediaControlSource {
    command: String,
    arguments: Vec<String>,
}

impl MediaControlSource {
    pub fn new(config: &MediaControlConfig) -> Self {
        Self {
            command: config.command.clone(),
            arguments: config.arguments.clone(),
        }
    }

    fn query(&self) -> Result<Vec<u8>> {
        log::debug!("Getting playback metadata using {}", self.command);

        let output = Command::new(&self.command)
            .args(&self.arguments)
            .output()
            .with_context(|| format!("Failed to run {}", self.command))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(output.stdout)
    }
}

/// Parse helper output; `None` when no player is active
fn parse_output(output: &[u8]) -> Result<Option<(String, PlaybackSnapshot)>> {
    let text = String::from_utf8_lossy(output);
    if text.trim().is_empty() {
        return Ok(None);
    }

    let info: Option<MediaControlInfo> =
        serde_json::from_str(&text).context("Failed to parse media-control output")?;

    let Some(info) = info.filter(|info| !info.bundle_identifier.is_empty()) else {
        return Ok(None);
    };

    let elapsed = info.elapsed_time_now.unwrap_or(info.elapsed_time);
    let snapshot = PlaybackSnapshot {
        artists: vec![info.artist],
        track: info.title,
        album: info.album,
        duration: seconds(info.duration).context("Invalid track duration")?,
        position: seconds(elapsed).context("Invalid playback position")?,
        state: if info.playing {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        },
        captured_at: info.timestamp.unwrap_or_else(Utc::now),
    };

    Ok(Some((info.bundle_identifier, snapshot)))
}

fn seconds(value: f64) -> Result<TimeDelta> {
    if !value.is_finite() {
        anyhow::bail!("{} is not a number of seconds", value);
    }
    TimeDelta::try_milliseconds((value * 1000.0).round() as i64)
        .with_context(|| format!("{} seconds is out of range", value))
}

impl Source for MediaControlSource {
    fn name(&self) -> &str {
        "media-control"
    }

    fn snapshots(&self, filter: &SnapshotFilter<'_>) -> Result<Snapshots, PollError> {
        let output = self.query().map_err(PollError::new)?;
        let parsed = parse_output(&output).map_err(PollError::new)?;

        let mut snapshots = Snapshots::new();
        match parsed {
            Some((bundle, snapshot)) if filter.admits(&bundle) => {
                snapshots.insert(format!("{}:{}", self.name(), bundle), filter.clean(snapshot));
            }
            Some(_) => {}
            None => log::debug!("media-control did not find any active players"),
        }

        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text_cleanup::{Blacklist, TextCleaner};

    const OUTPUT: &str = r#"{
        "playbackRate": 1,
        "album": "Without You I'm Nothing",
        "elapsedTimeNow": 110.4,
        "elapsedTime": 100.0,
        "timestamp": "2023-11-05T22:58:00Z",
        "bundleIdentifier": "com.apple.Music",
        "processIdentifier": 1234,
        "title": "Every You Every Me",
        "duration": 214.5,
        "artist": "Placebo",
        "playing": true
    }"#;

    #[test]
    fn parses_helper_output() {
        let (bundle, snapshot) = parse_output(OUTPUT.as_bytes()).unwrap().unwrap();

        assert_eq!(bundle, "com.apple.Music");
        assert_eq!(snapshot.artists, vec!["Placebo"]);
        assert_eq!(snapshot.track, "Every You Every Me");
        assert_eq!(snapshot.duration, TimeDelta::milliseconds(214_500));
        assert_eq!(snapshot.position, TimeDelta::milliseconds(110_400));
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.captured_at.timestamp(), 1_699_225_080);
    }

    #[test]
    fn empty_output_means_no_player() {
        assert!(parse_output(b"").unwrap().is_none());
        assert!(parse_output(b"null\n").unwrap().is_none());
        assert!(parse_output(b"{}").unwrap().is_none());
    }

    #[test]
    fn out_of_range_durations_are_errors() {
        let huge = OUTPUT.replace("214.5", "-1e300");
        assert!(parse_output(huge.as_bytes()).is_err());

        // small negative lengths reach the engine, which skips the player
        let negative = OUTPUT.replace("214.5", "-5");
        let (_, snapshot) = parse_output(negative.as_bytes()).unwrap().unwrap();
        assert_eq!(snapshot.duration, TimeDelta::seconds(-5));

        assert!(seconds(f64::NAN).is_err());
        assert!(seconds(f64::INFINITY).is_err());
    }

    #[test]
    fn garbage_output_is_an_error() {
        assert!(parse_output(b"not json").is_err());
    }

    #[test]
    fn missing_helper_is_reported_as_poll_error() {
        let source = MediaControlSource::new(&MediaControlConfig {
            enabled: true,
            command: "definitely-not-an-installed-helper".to_string(),
            arguments: Vec::new(),
        });
        let blacklist = Blacklist::default();
        let cleaner = TextCleaner::default();
        let filter = SnapshotFilter {
            blacklist: &blacklist,
            cleaner: &cleaner,
        };

        let error = source.snapshots(&filter).unwrap_err();
        assert!(error.partial.is_empty());
    }
}
