// Source module
// Contains implementations for the supported media player integrations

pub mod media_control;
pub mod mpris;
pub mod traits;

pub use traits::{PollError, SnapshotFilter, Source};

use crate::config::SourcesConfig;

/// Create every enabled source
pub fn build_sources(config: &SourcesConfig) -> Vec<Box<dyn Source>> {
    let mut sources: Vec<Box<dyn Source>> = Vec::new();

    if config.mpris.enabled {
        sources.push(Box::new(mpris::MprisSource::new()));
    }

    if config.media_control.enabled {
        sources.push(Box::new(media_control::MediaControlSource::new(
            &config.media_control,
        )));
    }

    for source in &sources {
        log::info!("Watching {} players", source.name());
    }

    sources
}
