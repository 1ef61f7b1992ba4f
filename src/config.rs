// Configuration management module
// Handles loading, saving, and validating configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = "desktop-scrobbler";

const DEFAULT_POLL_INTERVAL: i64 = 2;
// https://www.last.fm/api/scrobbling#when-is-a-scrobble-a-scrobble
const DEFAULT_MIN_PLAYBACK_DURATION: i64 = 4 * 60;
const DEFAULT_MIN_PLAYBACK_PERCENT: i64 = 50;
const MAX_MIN_PLAYBACK_DURATION: i64 = 24 * 60 * 60;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between two polls of the media sources
    pub poll_interval: i64,

    /// Scrobble after this many seconds of playback...
    pub min_playback_duration: i64,

    /// ...or after this percentage of the track, whichever comes first
    pub min_playback_percent: i64,

    /// Show a desktop notification for now playing updates and scrobbles
    pub notify_on_scrobble: bool,

    /// Show a desktop notification when a sink rejects an update
    pub notify_on_error: bool,

    /// Regex patterns matched against player identities; matching players are ignored
    pub blacklist: Vec<String>,

    /// Match/replace rules applied in order to track metadata
    pub regex_replace: Vec<RegexReplaceConfig>,

    pub sources: SourcesConfig,

    pub sinks: SinksConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexReplaceConfig {
    #[serde(rename = "match")]
    pub pattern: String,
    #[serde(default)]
    pub replace: String,
    #[serde(default)]
    pub artist: bool,
    #[serde(default)]
    pub track: bool,
    #[serde(default)]
    pub album: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub mpris: MprisSourceConfig,
    pub media_control: MediaControlConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            mpris: MprisSourceConfig {
                enabled: cfg!(target_os = "linux"),
            },
            media_control: MediaControlConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MprisSourceConfig {
    pub enabled: bool,
}

/// External helper printing the system now-playing state as JSON
/// (https://github.com/ungive/media-control)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaControlConfig {
    pub enabled: bool,
    pub command: String,
    pub arguments: Vec<String>,
}

impl Default for MediaControlConfig {
    fn default() -> Self {
        Self {
            enabled: cfg!(target_os = "macos"),
            command: "media-control".to_string(),
            arguments: vec!["get".to_string(), "--now".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinksConfig {
    /// Last.fm configuration
    pub lastfm: Option<LastFmConfig>,

    /// ListenBrainz configurations (can have multiple instances)
    pub listenbrainz: Vec<ListenBrainzConfig>,

    /// Local scrobble log
    pub file: Option<FileSinkConfig>,
}

impl Default for SinksConfig {
    fn default() -> Self {
        Self {
            lastfm: Some(LastFmConfig {
                enabled: false,
                api_key: String::new(),
                api_secret: String::new(),
                session_key: String::new(),
                username: String::new(),
            }),
            listenbrainz: vec![ListenBrainzConfig {
                enabled: false,
                name: "Primary".to_string(),
                token: String::new(),
                api_url: "https://api.listenbrainz.org".to_string(),
            }],
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastFmConfig {
    pub enabled: bool,
    pub api_key: String,
    pub api_secret: String,
    /// Filled in by `lastfm-auth`
    #[serde(default)]
    pub session_key: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenBrainzConfig {
    pub enabled: bool,
    pub name: String,
    pub token: String,
    pub api_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSinkConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            min_playback_duration: DEFAULT_MIN_PLAYBACK_DURATION,
            min_playback_percent: DEFAULT_MIN_PLAYBACK_PERCENT,
            notify_on_scrobble: true,
            notify_on_error: true,
            blacklist: Vec::new(),
            regex_replace: Vec::new(),
            sources: SourcesConfig::default(),
            sinks: SinksConfig::default(),
        }
    }
}

impl Config {
    /// Directory holding the configuration file
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;

        Ok(config_dir.join(CONFIG_DIR_NAME))
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(DEFAULT_CONFIG_FILE_NAME))
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            log::info!("Config file not found, creating default at {:?}", config_path);
            let default_config = Self::default();
            default_config.save(config_path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {:?}", config_path))?;

        Self::parse(&content)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content).context("Failed to parse config file")?;

        config.validate();

        Ok(config)
    }

    /// Save configuration to file, readable by the owner only
    pub fn save(&self, config_path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, content).context("Failed to write config file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(config_path, fs::Permissions::from_mode(0o600))
                .context("Failed to restrict config file permissions")?;
        }

        log::info!("Config saved to {:?}", config_path);

        Ok(())
    }

    /// Clamp out-of-range values back to their defaults
    pub fn validate(&mut self) {
        if self.poll_interval <= 0 {
            log::warn!(
                "poll_interval must be greater than 0, using {}",
                DEFAULT_POLL_INTERVAL
            );
            self.poll_interval = DEFAULT_POLL_INTERVAL;
        }

        if self.min_playback_duration <= 0 || self.min_playback_duration > MAX_MIN_PLAYBACK_DURATION {
            log::warn!(
                "min_playback_duration must be between 1 and {}, using {}",
                MAX_MIN_PLAYBACK_DURATION,
                DEFAULT_MIN_PLAYBACK_DURATION
            );
            self.min_playback_duration = DEFAULT_MIN_PLAYBACK_DURATION;
        }

        if self.min_playback_percent <= 0 || self.min_playback_percent > 100 {
            log::warn!(
                "min_playback_percent must be between 1 and 100, using {}",
                DEFAULT_MIN_PLAYBACK_PERCENT
            );
            self.min_playback_percent = DEFAULT_MIN_PLAYBACK_PERCENT;
        }

        if !self.sources.mpris.enabled && !self.sources.media_control.enabled {
            log::warn!("No media sources are enabled");
        }

        let lastfm_enabled = self.sinks.lastfm.as_ref().is_some_and(|l| l.enabled);
        let listenbrainz_enabled = self.sinks.listenbrainz.iter().any(|l| l.enabled);
        let file_enabled = self.sinks.file.as_ref().is_some_and(|f| f.enabled);

        if !lastfm_enabled && !listenbrainz_enabled && !file_enabled {
            log::warn!("No scrobbling services are enabled, this is probably not what you want");
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed = Config::parse(&text).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn validate_clamps_out_of_range_values() {
        let mut config = Config {
            poll_interval: -20,
            min_playback_duration: -20,
            min_playback_percent: 200,
            ..Config::default()
        };
        config.validate();

        assert_eq!(config.poll_interval, 2);
        assert_eq!(config.min_playback_duration, 4 * 60);
        assert_eq!(config.min_playback_percent, 50);
    }

    #[test]
    fn validate_caps_min_playback_duration() {
        let config = Config::parse("min_playback_duration = 10000000000000000").unwrap();
        assert_eq!(config.min_playback_duration, 4 * 60);

        let config = Config::parse("min_playback_duration = 86400").unwrap();
        assert_eq!(config.min_playback_duration, 86_400);
    }

    #[test]
    fn parses_rules_and_sinks() {
        let config = Config::parse(
            r#"
            min_playback_percent = 60
            blacklist = ["firefox", "chromium"]

            [[regex_replace]]
            match = '\s*\(Remastered\)'
            replace = ""
            track = true
            album = true

            [sinks.file]
            enabled = true
            path = "/tmp/scrobbles.jsonl"
            "#,
        )
        .unwrap();

        assert_eq!(config.poll_interval, 2);
        assert_eq!(config.min_playback_percent, 60);
        assert_eq!(config.blacklist, vec!["firefox", "chromium"]);
        assert_eq!(config.regex_replace.len(), 1);
        assert!(config.regex_replace[0].track);
        assert!(!config.regex_replace[0].artist);
        assert_eq!(
            config.sinks.file,
            Some(FileSinkConfig {
                enabled: true,
                path: PathBuf::from("/tmp/scrobbles.jsonl"),
            })
        );
        assert!(!config.sinks.lastfm.is_some_and(|l| l.enabled));
    }

    #[test]
    fn load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(DEFAULT_CONFIG_FILE_NAME);

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());

        let metadata = fs::metadata(&path).unwrap();
        assert!(metadata.is_file());
        assert!(metadata.len() > 100);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(metadata.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    fn save_then_load_keeps_session_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE_NAME);

        let mut config = Config::default();
        if let Some(lastfm) = config.sinks.lastfm.as_mut() {
            lastfm.session_key = "abc".to_string();
            lastfm.username = "someone".to_string();
        }
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
