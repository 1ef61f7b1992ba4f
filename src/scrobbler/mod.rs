// Scrobbler module
// Contains implementations for various scrobbling services

pub mod file;
pub mod lastfm;
pub mod lastfm_auth;
pub mod listenbrainz;
pub mod traits;

pub use traits::Scrobbler;

use crate::config::SinksConfig;

/// Create every enabled scrobbler. A misconfigured service is logged and
/// left out so the others keep working.
pub fn build_scrobblers(config: &SinksConfig) -> Vec<Box<dyn Scrobbler>> {
    let mut scrobblers: Vec<Box<dyn Scrobbler>> = Vec::new();

    if let Some(lastfm) = config.lastfm.as_ref().filter(|l| l.enabled) {
        match lastfm::LastFmScrobbler::new(lastfm) {
            Ok(scrobbler) => scrobblers.push(Box::new(scrobbler)),
            Err(e) => log::error!("Skipping Last.fm: {:#}", e),
        }
    }

    for lb in config.listenbrainz.iter().filter(|l| l.enabled) {
        match listenbrainz::ListenBrainzScrobbler::new(lb) {
            Ok(scrobbler) => scrobblers.push(Box::new(scrobbler)),
            Err(e) => log::error!("Skipping ListenBrainz ({}): {:#}", lb.name, e),
        }
    }

    if let Some(file) = config.file.as_ref().filter(|f| f.enabled) {
        scrobblers.push(Box::new(file::FileScrobbler::new(file.path.clone())));
    }

    scrobblers
}
