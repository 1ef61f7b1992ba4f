// Dispatch layer
// Fans now-playing and scrobble events out to every scrobbler, isolating
// failures per service and reporting outcomes through the notifier

use crate::notify::Notifier;
use crate::playback::ScrobbleEvent;
use crate::scrobbler::Scrobbler;

/// Send a now-playing update to one scrobbler. Returns whether it was accepted.
pub fn send_now_playing(
    player: &str,
    scrobbler: &dyn Scrobbler,
    event: &ScrobbleEvent,
    notify_on_error: bool,
    notifier: &dyn Notifier,
) -> bool {
    match scrobbler.now_playing(event) {
        Ok(()) => true,
        Err(e) => {
            log::error!(
                "[{}] {}: error updating now playing status: {:#}",
                player,
                scrobbler.name(),
                e
            );
            if notify_on_error {
                notify_logged(
                    notifier,
                    0,
                    &format!("Error updating now playing on {}", scrobbler.name()),
                    &format!("{:#}", e),
                );
            }
            false
        }
    }
}

/// Send a scrobble to one scrobbler. Returns whether it was accepted.
pub fn send_scrobble(
    player: &str,
    scrobbler: &dyn Scrobbler,
    event: &ScrobbleEvent,
    notify_on_error: bool,
    notifier: &dyn Notifier,
) -> bool {
    match scrobbler.scrobble(event) {
        Ok(()) => true,
        Err(e) => {
            log::error!("[{}] {}: error scrobbling: {:#}", player, scrobbler.name(), e);
            if notify_on_error {
                notify_logged(
                    notifier,
                    0,
                    &format!("Error scrobbling to {}", scrobbler.name()),
                    &format!("{:#}", e),
                );
            }
            false
        }
    }
}

/// Show a notification; failures are logged and otherwise ignored
fn notify_logged(notifier: &dyn Notifier, replace_id: u32, summary: &str, body: &str) -> Option<u32> {
    match notifier.notify(replace_id, summary, body) {
        Ok(id) => Some(id),
        Err(e) => {
            log::warn!("Failed to show notification '{}': {:#}", summary, e);
            None
        }
    }
}

pub struct Dispatcher {
    scrobblers: Vec<Box<dyn Scrobbler>>,
    notifier: Box<dyn Notifier>,
    notify_on_scrobble: bool,
    notify_on_error: bool,
    /// Id of the visible now-playing notification, so updates replace it
    now_playing_id: u32,
}

impl Dispatcher {
    pub fn new(
        scrobblers: Vec<Box<dyn Scrobbler>>,
        notifier: Box<dyn Notifier>,
        notify_on_scrobble: bool,
        notify_on_error: bool,
    ) -> Self {
        Self {
            scrobblers,
            notifier,
            notify_on_scrobble,
            notify_on_error,
            now_playing_id: 0,
        }
    }

    /// Tell every scrobbler a new track started
    pub fn now_playing(&mut self, player: &str, event: &ScrobbleEvent) {
        for scrobbler in &self.scrobblers {
            send_now_playing(
                player,
                scrobbler.as_ref(),
                event,
                self.notify_on_error,
                self.notifier.as_ref(),
            );
        }

        if self.notify_on_scrobble {
            if let Some(id) = notify_logged(
                self.notifier.as_ref(),
                self.now_playing_id,
                "Now playing",
                &event.describe(),
            ) {
                self.now_playing_id = id;
            }
        }
    }

    /// Submit a scrobble to every scrobbler
    pub fn scrobble(&mut self, player: &str, event: &ScrobbleEvent) {
        let mut accepted = Vec::new();
        for scrobbler in &self.scrobblers {
            if send_scrobble(
                player,
                scrobbler.as_ref(),
                event,
                self.notify_on_error,
                self.notifier.as_ref(),
            ) {
                accepted.push(scrobbler.name());
            }
        }

        if self.notify_on_scrobble && !accepted.is_empty() {
            notify_logged(
                self.notifier.as_ref(),
                0,
                "Scrobbled",
                &format!("{}\n({})", event.describe(), accepted.join(", ")),
            );
        }
    }
}
