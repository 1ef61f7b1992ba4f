use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

mod config;
mod dbus;
mod dispatch;
mod media_monitor;
mod notify;
mod playback;
mod scrobbler;
mod source;
mod text_cleanup;

use config::Config;
use media_monitor::MediaMonitor;
use playback::format_duration;

/// Window shown by `scrobbles` when no start is given
const DEFAULT_HISTORY_DAYS: i64 = 14;

#[derive(Parser)]
#[command(name = "desktop-scrobbler")]
#[command(author, version, about = "Scrobbles what your desktop media players play")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Log one JSON object per line
    #[arg(short, long, global = true)]
    json: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch media players and scrobble (runs in foreground)
    Run,

    /// Show recent scrobbles recorded by a sink
    Scrobbles {
        /// Sink name as printed by `list-sinks`
        sink: String,

        /// Number of scrobbles to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Start of the window (RFC 3339 or YYYY-MM-DD), defaults to 14 days ago
        #[arg(long, value_parser = parse_time)]
        from: Option<DateTime<Utc>>,

        /// End of the window (RFC 3339 or YYYY-MM-DD), defaults to now
        #[arg(long, value_parser = parse_time)]
        to: Option<DateTime<Utc>>,
    },

    /// List the configured sinks
    ListSinks,

    /// Authenticate with Last.fm and store the session in the config file
    LastfmAuth,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logger(cli.debug, cli.json);

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::config_path()?,
    };
    log::debug!("Using config file {}", config_path.display());
    let config = Config::load(&config_path)?;

    match cli.command {
        Commands::Run => run(&config),
        Commands::Scrobbles {
            sink,
            limit,
            from,
            to,
        } => {
            let to = to.unwrap_or_else(Utc::now);
            let from = from.unwrap_or_else(|| to - TimeDelta::days(DEFAULT_HISTORY_DAYS));
            show_scrobbles(&config, &sink, limit, from, to)
        }
        Commands::ListSinks => {
            for scrobbler in scrobbler::build_scrobblers(&config.sinks) {
                println!("{}", scrobbler.name());
            }
            Ok(())
        }
        Commands::LastfmAuth => lastfm_auth(config, &config_path),
    }
}

fn setup_logger(debug: bool, json: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).parse_default_env();

    if json {
        builder.write_style(env_logger::WriteStyle::Never).format(|buf, record| {
            let line = serde_json::json!({
                "timestamp": Utc::now().to_rfc3339(),
                "level": record.level().to_string(),
                "target": record.target(),
                "message": record.args().to_string(),
            });
            writeln!(buf, "{}", line)
        });
    } else if atty::is(atty::Stream::Stderr) {
        builder.write_style(env_logger::WriteStyle::Always);
    } else {
        builder.write_style(env_logger::WriteStyle::Never);
    }

    builder.init();
}

fn run(config: &Config) -> Result<()> {
    log::info!(
        "Starting desktop-scrobbler {} (minimum playback {}s or {}%)",
        env!("CARGO_PKG_VERSION"),
        config.min_playback_duration,
        config.min_playback_percent
    );

    let mut monitor = MediaMonitor::from_config(config);
    monitor.run(config.poll_interval())
}

fn show_scrobbles(
    config: &Config,
    sink: &str,
    limit: usize,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<()> {
    let scrobblers = scrobbler::build_scrobblers(&config.sinks);
    let scrobbler = scrobblers
        .iter()
        .find(|s| s.name() == sink)
        .with_context(|| format!("No enabled sink named '{}' (see `list-sinks`)", sink))?;

    let scrobbles = scrobbler
        .recent_scrobbles(limit, from, to)
        .with_context(|| format!("Failed to fetch scrobbles from {}", sink))?;

    if scrobbles.is_empty() {
        println!("No scrobbles between {} and {}", from.with_timezone(&Local), to.with_timezone(&Local));
        return Ok(());
    }

    println!(
        "{:<30} {:<40} {:<30} {:>8}  {}",
        "Artists", "Track", "Album", "Duration", "Timestamp"
    );
    for event in scrobbles {
        println!(
            "{:<30} {:<40} {:<30} {:>8}  {}",
            truncate(&event.join_artists(), 30),
            truncate(&event.track, 40),
            truncate(&event.album, 30),
            format_duration(event.duration),
            event.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

fn lastfm_auth(mut config: Config, config_path: &std::path::Path) -> Result<()> {
    let lastfm = config
        .sinks
        .lastfm
        .as_mut()
        .context("No [sinks.lastfm] section in the config file")?;
    if lastfm.api_key.is_empty() || lastfm.api_secret.is_empty() {
        anyhow::bail!("Set api_key and api_secret in [sinks.lastfm] first");
    }

    let session = scrobbler::lastfm_auth::authenticate(&lastfm.api_key, &lastfm.api_secret)?;
    lastfm.session_key = session.key;
    lastfm.username = session.name;
    lastfm.enabled = true;

    config.save(config_path)?;
    println!("Saved Last.fm session to {}", config_path.display());
    Ok(())
}

/// Accepts RFC 3339 timestamps or plain dates (midnight UTC)
fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|time| time.and_utc())
        .ok_or_else(|| format!("'{}' is neither RFC 3339 nor YYYY-MM-DD", value))
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut short: String = text.chars().take(width.saturating_sub(1)).collect();
    short.push('…');
    short
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_times() {
        assert_eq!(
            parse_time("2023-11-05T23:18:00Z"),
            Ok(DateTime::from_timestamp(1_699_226_280, 0).unwrap())
        );
        assert_eq!(
            parse_time("2023-11-05T23:18:00+01:00"),
            Ok(DateTime::from_timestamp(1_699_222_680, 0).unwrap())
        );
        assert_eq!(
            parse_time("2023-11-05"),
            Ok(DateTime::from_timestamp(1_699_142_400, 0).unwrap())
        );
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn truncates_long_columns() {
        assert_eq!(truncate("Placebo", 30), "Placebo");
        assert_eq!(truncate("Without You I'm Nothing", 8), "Without…");
    }

    #[test]
    fn parses_command_line() {
        let cli = Cli::try_parse_from([
            "desktop-scrobbler",
            "scrobbles",
            "file",
            "--limit",
            "5",
            "--from",
            "2023-11-01",
            "-d",
        ])
        .unwrap();

        assert!(cli.debug);
        assert!(!cli.json);
        match cli.command {
            Commands::Scrobbles { sink, limit, from, to } => {
                assert_eq!(sink, "file");
                assert_eq!(limit, 5);
                assert!(from.is_some());
                assert!(to.is_none());
            }
            _ => panic!("expected the scrobbles command"),
        }

        let cli = Cli::try_parse_from(["desktop-scrobbler", "--json", "--config", "/tmp/c.toml", "run"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Run));

        assert!(Cli::try_parse_from(["desktop-scrobbler", "scrobbles"]).is_err());
    }
}
