// Local file scrobbler
// Appends one JSON object per scrobble (JSON Lines)

use super::traits::Scrobbler;
use crate::playback::ScrobbleEvent;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

pub struct FileScrobbler {
    path: PathBuf,
}

impl FileScrobbler {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Scrobbler for FileScrobbler {
    fn name(&self) -> &str {
        "file"
    }

    fn now_playing(&self, _event: &ScrobbleEvent) -> Result<()> {
        Ok(())
    }

    fn scrobble(&self, event: &ScrobbleEvent) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let mut line = serde_json::to_string(event).context("Failed to serialize scrobble")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {:?}", self.path))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to write scrobble to {:?}", self.path))?;

        log::info!("file: Scrobbled to {:?}", self.path);
        Ok(())
    }

    fn recent_scrobbles(
        &self,
        limit: usize,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScrobbleEvent>> {
        log::debug!("Reading scrobbles from {:?}", self.path);

        let file = fs::File::open(&self.path)
            .with_context(|| format!("Failed to open {:?}", self.path))?;

        let mut events = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read {:?}", self.path))?;
            if line.trim().is_empty() {
                continue;
            }
            let event: ScrobbleEvent = serde_json::from_str(&line)
                .with_context(|| format!("Invalid scrobble on line {} of {:?}", number + 1, self.path))?;
            events.push(event);
        }

        Ok(events
            .into_iter()
            .rev()
            .filter(|e| e.timestamp >= from && e.timestamp <= to)
            .take(limit)
            .collect())
    }
}
