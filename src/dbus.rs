// D-Bus session bus handle
// Connects lazily and reconnects after a failure was reported

use anyhow::{Context, Result};
use std::sync::{Mutex, PoisonError};
use zbus::blocking::Connection;

#[derive(Default)]
pub struct SessionBus {
    connection: Mutex<Option<Connection>>,
}

impl SessionBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(&self) -> Result<Connection> {
        let mut guard = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(connection) = guard.as_ref() {
            return Ok(connection.clone());
        }

        let connection = Connection::session().context("Failed to connect to the D-Bus session bus")?;
        log::debug!("Connected to the D-Bus session bus");
        *guard = Some(connection.clone());
        Ok(connection)
    }

    /// Forget the current connection; the next call reconnects
    pub fn reset(&self) {
        *self.connection.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
