// Desktop notifications
// https://specifications.freedesktop.org/notification-spec/1.3/

use anyhow::{Context, Result};

const APP_NAME: &str = "desktop-scrobbler";

/// Shows user-visible notifications. Never used for control flow.
pub trait Notifier {
    /// Show a notification, replacing `replace_id` when it is non-zero.
    /// Returns the id of the shown notification.
    fn notify(&self, replace_id: u32, summary: &str, body: &str) -> Result<u32>;
}

/// Used when notifications are switched off
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, replace_id: u32, _summary: &str, _body: &str) -> Result<u32> {
        Ok(replace_id)
    }
}

/// `org.freedesktop.Notifications` over the session bus
#[cfg(not(target_os = "macos"))]
pub struct DesktopNotifier {
    bus: crate::dbus::SessionBus,
}

#[cfg(not(target_os = "macos"))]
impl DesktopNotifier {
    // https://specifications.freedesktop.org/icon-naming-spec/latest/
    const ICON: &'static str = "audio-x-generic";

    pub fn new() -> Self {
        Self {
            bus: crate::dbus::SessionBus::new(),
        }
    }
}

#[cfg(not(target_os = "macos"))]
impl Notifier for DesktopNotifier {
    fn notify(&self, replace_id: u32, summary: &str, body: &str) -> Result<u32> {
        use std::collections::HashMap;
        use zbus::zvariant::Value;

        let connection = self.bus.connection()?;
        let proxy = zbus::blocking::Proxy::new(
            &connection,
            "org.freedesktop.Notifications",
            "/org/freedesktop/Notifications",
            "org.freedesktop.Notifications",
        )
        .context("Failed to create notifications proxy")?;

        let actions: Vec<&str> = Vec::new();
        let hints: HashMap<&str, Value<'_>> = HashMap::new();
        let expire_timeout = -1_i32;

        log::debug!("Sending desktop notification '{}' (replaces {})", summary, replace_id);

        let id: u32 = proxy
            .call(
                "Notify",
                &(APP_NAME, replace_id, Self::ICON, summary, body, actions, hints, expire_timeout),
            )
            .map_err(|e| {
                self.bus.reset();
                e
            })
            .context("Failed to send desktop notification")?;

        log::debug!("Sent desktop notification {}", id);
        Ok(id)
    }
}

/// https://github.com/julienXX/terminal-notifier
#[cfg(target_os = "macos")]
pub struct DesktopNotifier;

#[cfg(target_os = "macos")]
impl DesktopNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "macos")]
impl Notifier for DesktopNotifier {
    fn notify(&self, _replace_id: u32, summary: &str, body: &str) -> Result<u32> {
        let status = std::process::Command::new("terminal-notifier")
            .args(["-title", APP_NAME, "-subtitle", summary, "-message", body])
            .status()
            .context("Failed to run terminal-notifier")?;

        if !status.success() {
            anyhow::bail!("terminal-notifier exited with {}", status);
        }
        // terminal-notifier cannot replace notifications
        Ok(0)
    }
}

/// Pick the notifier for the configured notification flags
pub fn build_notifier(enabled: bool) -> Box<dyn Notifier> {
    if enabled {
        Box::new(DesktopNotifier::new())
    } else {
        Box::new(NoopNotifier)
    }
}
