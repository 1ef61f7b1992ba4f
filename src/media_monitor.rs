// Media monitoring module
// Turns the snapshots reported by the sources into now-playing and scrobble
// events, one tick at a time

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::notify;
use crate::playback::{format_duration, PlaybackSnapshot, Snapshots};
use crate::scrobbler;
use crate::source::{self, SnapshotFilter, Source};
use crate::text_cleanup::{Blacklist, TextCleaner};
use chrono::TimeDelta;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid track length: {0}")]
    InvalidDuration(TimeDelta),
}

/// When a track counts as played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrobbleThreshold {
    /// Seconds of playback that always suffice
    pub min_duration: i64,
    /// Share of the track (in percent) that always suffices
    pub min_percent: i64,
}

/// Minimum playback time before a track is scrobbled: `min_duration` seconds
/// or `min_percent` of the track, whichever is shorter
pub fn min_play_time(
    duration: TimeDelta,
    min_duration: i64,
    min_percent: i64,
) -> Result<TimeDelta, EngineError> {
    if duration < TimeDelta::zero() {
        return Err(EngineError::InvalidDuration(duration));
    }

    let fraction = TimeDelta::milliseconds(duration.num_milliseconds().saturating_mul(min_percent) / 100);
    // an absolute limit beyond what TimeDelta holds never wins
    Ok(TimeDelta::try_seconds(min_duration).map_or(fraction, |limit| fraction.min(limit)))
}

/// Per-player memory of the decision loop. Both maps always have the same keys.
#[derive(Debug, Default)]
pub struct EngineState {
    last_snapshot: HashMap<String, PlaybackSnapshot>,
    scrobbled: HashMap<String, bool>,
}

impl EngineState {
    pub fn contains(&self, player: &str) -> bool {
        self.last_snapshot.contains_key(player)
    }

    pub fn len(&self) -> usize {
        self.last_snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_snapshot.is_empty()
    }

    /// The accepted snapshot of the current track; its `captured_at` is when the track started
    pub fn last_snapshot(&self, player: &str) -> Option<&PlaybackSnapshot> {
        self.last_snapshot.get(player)
    }

    pub fn is_scrobbled(&self, player: &str) -> bool {
        self.scrobbled.get(player).copied().unwrap_or(false)
    }

    fn track(&mut self, player: &str) {
        self.last_snapshot
            .insert(player.to_string(), PlaybackSnapshot::default());
        self.scrobbled.insert(player.to_string(), false);
    }

    fn forget(&mut self, player: &str) {
        self.last_snapshot.remove(player);
        self.scrobbled.remove(player);
    }

    fn start_track(&mut self, player: &str, snapshot: PlaybackSnapshot) {
        self.last_snapshot.insert(player.to_string(), snapshot);
        self.scrobbled.insert(player.to_string(), false);
    }

    fn mark_scrobbled(&mut self, player: &str) {
        self.scrobbled.insert(player.to_string(), true);
    }
}

pub struct MediaMonitor {
    sources: Vec<Box<dyn Source>>,
    blacklist: Blacklist,
    cleaner: TextCleaner,
    threshold: ScrobbleThreshold,
    dispatcher: Dispatcher,
    state: EngineState,
}

impl MediaMonitor {
    pub fn new(
        sources: Vec<Box<dyn Source>>,
        blacklist: Blacklist,
        cleaner: TextCleaner,
        threshold: ScrobbleThreshold,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            sources,
            blacklist,
            cleaner,
            threshold,
            dispatcher,
            state: EngineState::default(),
        }
    }

    /// Wire sources, scrobblers and notifications from configuration
    pub fn from_config(config: &Config) -> Self {
        let blacklist = Blacklist::new(&config.blacklist);
        if !blacklist.is_empty() {
            log::info!("Ignoring scrobbles from {} players", blacklist.len());
        }

        let cleaner = TextCleaner::new(&config.regex_replace);
        if !cleaner.is_empty() {
            log::info!("Using {} match/replace rules", cleaner.len());
        }

        let scrobblers = scrobbler::build_scrobblers(&config.sinks);
        if scrobblers.is_empty() {
            log::warn!("No scrobblers available, only logging what is playing");
        }

        let notifier = notify::build_notifier(config.notify_on_scrobble || config.notify_on_error);
        let dispatcher = Dispatcher::new(
            scrobblers,
            notifier,
            config.notify_on_scrobble,
            config.notify_on_error,
        );

        Self::new(
            source::build_sources(&config.sources),
            blacklist,
            cleaner,
            ScrobbleThreshold {
                min_duration: config.min_playback_duration,
                min_percent: config.min_playback_percent,
            },
            dispatcher,
        )
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Poll forever; only ends when the process is stopped
    pub fn run(&mut self, interval: Duration) -> ! {
        log::info!("Polling every {:?}", interval);
        loop {
            self.tick();
            thread::sleep(interval);
        }
    }

    /// One iteration: poll every source, then evaluate what changed
    pub fn tick(&mut self) {
        let snapshots = self.poll_sources();
        self.process(snapshots);
    }

    /// Merge the snapshots of all sources. A failing source is logged and
    /// whatever it managed to read is still used.
    pub fn poll_sources(&self) -> Snapshots {
        let filter = SnapshotFilter {
            blacklist: &self.blacklist,
            cleaner: &self.cleaner,
        };

        let mut merged = Snapshots::new();
        for source in &self.sources {
            match source.snapshots(&filter) {
                Ok(snapshots) => merged.extend(snapshots),
                Err(e) => {
                    log::error!("Failed to get playback status from {}: {}", source.name(), e);
                    merged.extend(e.partial);
                }
            }
        }
        merged
    }

    /// Evaluate one tick worth of snapshots against the remembered state
    pub fn process(&mut self, snapshots: Snapshots) {
        for player in snapshots.keys() {
            if !self.state.contains(player) {
                log::info!("New player found: {}", player);
                self.state.track(player);
            }
        }

        let gone: Vec<String> = self
            .state
            .last_snapshot
            .keys()
            .filter(|player| !snapshots.contains_key(*player))
            .cloned()
            .collect();
        for player in gone {
            log::info!("Player disappeared: {}", player);
            self.state.forget(&player);
        }
        log::debug!("Tracking {} players", self.state.len());

        for (player, snapshot) in snapshots {
            self.evaluate(&player, snapshot);
        }
    }

    fn evaluate(&mut self, player: &str, mut snapshot: PlaybackSnapshot) {
        if !snapshot.is_valid() {
            log::debug!("[{}] ignoring incomplete metadata", player);
            return;
        }

        let min_play_time = match min_play_time(
            snapshot.duration,
            self.threshold.min_duration,
            self.threshold.min_percent,
        ) {
            Ok(time) => time,
            Err(e) => {
                log::warn!(
                    "[{}] cannot calculate minimum playback time for {} by {}: {}",
                    player,
                    snapshot.track,
                    snapshot.join_artists(),
                    e
                );
                return;
            }
        };

        let Some(previous) = self.state.last_snapshot(player) else {
            return;
        };

        if !snapshot.same_track(previous) {
            log::info!(
                "[{}] started playing {} by {} ({})",
                player,
                snapshot.track,
                snapshot.join_artists(),
                snapshot.state
            );

            snapshot.position = TimeDelta::zero();
            let event = snapshot.to_event(snapshot.captured_at);
            self.state.start_track(player, snapshot);
            self.dispatcher.now_playing(player, &event);
            return;
        }

        // position and capture time drift every tick, the start stays put
        let started_at = previous.captured_at;

        if snapshot.position < min_play_time || !snapshot.is_playing() || self.state.is_scrobbled(player) {
            return;
        }

        log::info!(
            "[{}] scrobbling {} by {}, played {}/{}",
            player,
            snapshot.track,
            snapshot.join_artists(),
            format_duration(snapshot.position),
            format_duration(snapshot.duration)
        );

        self.state.mark_scrobbled(player);
        self.dispatcher.scrobble(player, &snapshot.to_event(started_at));
    }
}
