// MPRIS media source
// Polls every org.mpris.MediaPlayer2.* name on the D-Bus session bus
// https://specifications.freedesktop.org/mpris-spec/latest/

use super::traits::{PollError, SnapshotFilter, Source};
use crate::dbus::SessionBus;
use crate::playback::{PlaybackSnapshot, PlaybackState, Snapshots};
use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use std::collections::HashMap;
use zbus::blocking::fdo::DBusProxy;
use zbus::blocking::{Connection, Proxy};
use zbus::zvariant::{OwnedValue, Value};

const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";
const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";
const MPRIS_PLAYER_IFACE: &str = "org.mpris.MediaPlayer2.Player";

pub struct MprisSource {
    bus: SessionBus,
}

impl MprisSource {
    pub fn new() -> Self {
        Self {
            bus: SessionBus::new(),
        }
    }

    fn player_names(connection: &Connection) -> Result<Vec<String>> {
        let names = DBusProxy::new(connection)
            .context("Failed to create D-Bus proxy")?
            .list_names()
            .context("Failed to list D-Bus names")?;

        Ok(names
            .into_iter()
            .map(|name| name.to_string())
            .filter(|name| name.starts_with(MPRIS_PREFIX))
            .collect())
    }

    fn read_player(connection: &Connection, bus_name: &str) -> Result<PlaybackSnapshot> {
        let proxy = Proxy::new(connection, bus_name, MPRIS_PATH, MPRIS_PLAYER_IFACE)
            .context("Failed to create player proxy")?;

        let metadata: HashMap<String, OwnedValue> = proxy
            .get_property("Metadata")
            .context("Failed to read Metadata")?;
        let status: String = proxy
            .get_property("PlaybackStatus")
            .context("Failed to read PlaybackStatus")?;
        let position: i64 = proxy
            .get_property("Position")
            .context("Failed to read Position")?;

        let artists = metadata
            .get("xesam:artist")
            .and_then(|v| value_strings(v))
            .context("Missing xesam:artist")?;
        let track = metadata
            .get("xesam:title")
            .and_then(|v| value_string(v))
            .context("Missing xesam:title")?;
        let album = metadata
            .get("xesam:album")
            .and_then(|v| value_string(v))
            .context("Missing xesam:album")?;
        let length = metadata
            .get("mpris:length")
            .and_then(|v| value_i64(v))
            .context("Missing mpris:length")?;

        Ok(PlaybackSnapshot {
            artists,
            track,
            album,
            duration: TimeDelta::microseconds(length),
            position: TimeDelta::microseconds(position),
            state: PlaybackState::from_mpris(&status),
            captured_at: Utc::now(),
        })
    }
}

impl Default for MprisSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Source for MprisSource {
    fn name(&self) -> &str {
        "mpris"
    }

    fn snapshots(&self, filter: &SnapshotFilter<'_>) -> Result<Snapshots, PollError> {
        let connection = self.bus.connection().map_err(PollError::new)?;

        let names = match Self::player_names(&connection) {
            Ok(names) => names,
            Err(e) => {
                self.bus.reset();
                return Err(PollError::new(e));
            }
        };

        let mut snapshots = Snapshots::new();
        for bus_name in names.iter().filter(|name| filter.admits(name)) {
            match Self::read_player(&connection, bus_name) {
                Ok(snapshot) => {
                    snapshots.insert(format!("{}:{}", self.name(), bus_name), filter.clean(snapshot));
                }
                Err(e) => log::warn!("Failed to read MPRIS player {}: {:#}", bus_name, e),
            }
        }

        Ok(snapshots)
    }
}

fn value_string(value: &Value<'_>) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.to_string()),
        Value::Value(inner) => value_string(inner),
        _ => None,
    }
}

/// `xesam:artist` is a list, but some players send a plain string
fn value_strings(value: &Value<'_>) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(items.iter().filter_map(value_string).collect()),
        Value::Str(s) => Some(vec![s.to_string()]),
        Value::Value(inner) => value_strings(inner),
        _ => None,
    }
}

fn value_i64(value: &Value<'_>) -> Option<i64> {
    match value {
        Value::I64(v) => Some(*v),
        Value::U64(v) => i64::try_from(*v).ok(),
        Value::I32(v) => Some(i64::from(*v)),
        Value::U32(v) => Some(i64::from(*v)),
        // some browsers report fractional lengths
        Value::F64(v) => v.is_finite().then(|| *v as i64),
        Value::Value(inner) => value_i64(inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_plain_and_nested_strings() {
        assert_eq!(value_string(&Value::from("Placebo")), Some("Placebo".to_string()));
        let nested = Value::Value(Box::new(Value::from("Meds")));
        assert_eq!(value_string(&nested), Some("Meds".to_string()));
        assert_eq!(value_string(&Value::from(3_i64)), None);
    }

    #[test]
    fn reads_artist_lists() {
        let list = Value::from(vec!["Placebo", "David Bowie"]);
        assert_eq!(
            value_strings(&list),
            Some(vec!["Placebo".to_string(), "David Bowie".to_string()])
        );
        assert_eq!(value_strings(&Value::from("Placebo")), Some(vec!["Placebo".to_string()]));
    }

    #[test]
    fn reads_lengths_of_any_integer_width() {
        assert_eq!(value_i64(&Value::from(251_000_000_i64)), Some(251_000_000));
        assert_eq!(value_i64(&Value::from(251_000_000_u64)), Some(251_000_000));
        assert_eq!(value_i64(&Value::from(42_u32)), Some(42));
        assert_eq!(value_i64(&Value::from("251")), None);
        assert_eq!(value_i64(&Value::from(251_000_000.4_f64)), Some(251_000_000));
        assert_eq!(value_i64(&Value::from(f64::NAN)), None);
        assert_eq!(value_i64(&Value::from(f64::INFINITY)), None);
    }
}
