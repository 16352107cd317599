// src/storage/settings.rs

//! Persistent module settings store
//!
//! The lifecycle core writes through the [`SettingsStore`] on every
//! non-transient start and stop: after such a call, the in-memory
//! settings of a module equal the persisted ones. The store is keyed by
//! install location so settings survive a module's id changing across
//! container restarts.
//!
//! `SqliteSettingsStore` is the database-backed implementation; the
//! in-memory store backs tests and throwaway containers.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::Result;
use crate::module::{Module, Settings};

/// Settings as loaded back from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedSettings {
    pub settings: Settings,
    pub start_level: i32,
}

/// Write-through persistence for module settings and start levels
///
/// Implementations must be safe for concurrent calls; the core
/// serializes calls per module through the state-change lock.
pub trait SettingsStore: Send + Sync {
    /// Writes the module's settings and start level through to storage
    fn persist(&self, module: &Module, settings: Settings) -> Result<()>;

    /// Loads the settings persisted for an install location, if any
    fn load(&self, location: &str) -> Result<Option<PersistedSettings>>;

    /// Deletes everything persisted for an install location
    fn remove(&self, location: &str) -> Result<()>;
}

/// In-memory settings store
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    entries: Mutex<HashMap<String, PersistedSettings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of locations with persisted settings
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn persist(&self, module: &Module, settings: Settings) -> Result<()> {
        self.entries.lock().insert(
            module.location().to_string(),
            PersistedSettings {
                settings,
                start_level: module.start_level(),
            },
        );
        Ok(())
    }

    fn load(&self, location: &str) -> Result<Option<PersistedSettings>> {
        Ok(self.entries.lock().get(location).copied())
    }

    fn remove(&self, location: &str) -> Result<()> {
        self.entries.lock().remove(location);
        Ok(())
    }
}

/// SQLite-backed settings store, one row per install location
pub struct SqliteSettingsStore {
    conn: Mutex<Connection>,
}

impl SqliteSettingsStore {
    /// Opens (creating if needed) the settings database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS module_settings (
                location TEXT PRIMARY KEY,
                auto_start INTEGER NOT NULL,
                use_activation_policy INTEGER NOT NULL,
                start_level INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn persist(&self, module: &Module, settings: Settings) -> Result<()> {
        debug!(
            "persisting settings {settings:?} for module at {}",
            module.location()
        );
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO module_settings
                (location, auto_start, use_activation_policy, start_level)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                module.location(),
                settings.contains(Settings::AUTO_START) as i32,
                settings.contains(Settings::USE_ACTIVATION_POLICY) as i32,
                module.start_level(),
            ],
        )?;
        Ok(())
    }

    fn load(&self, location: &str) -> Result<Option<PersistedSettings>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT auto_start, use_activation_policy, start_level
                 FROM module_settings WHERE location = ?1",
                params![location],
                |row| {
                    let auto_start: i32 = row.get(0)?;
                    let use_policy: i32 = row.get(1)?;
                    let start_level: i32 = row.get(2)?;
                    Ok((auto_start != 0, use_policy != 0, start_level))
                },
            )
            .optional()?;
        Ok(row.map(|(auto_start, use_policy, start_level)| {
            let mut settings = Settings::empty();
            settings.set(Settings::AUTO_START, auto_start);
            settings.set(Settings::USE_ACTIVATION_POLICY, use_policy);
            PersistedSettings {
                settings,
                start_level,
            }
        }))
    }

    fn remove(&self, location: &str) -> Result<()> {
        self.conn.lock().execute(
            "DELETE FROM module_settings WHERE location = ?1",
            params![location],
        )?;
        Ok(())
    }
}
