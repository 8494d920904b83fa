//! Durable record of the single active session.
//!
//! The store is the only source of truth for "is a session running". Nothing
//! about a session is trusted from process memory: the clock and the
//! transition handler reload from here on every call.
//!
//! Alongside the record the store keeps a progress cursor, the index of the
//! last transition that was handled, so duplicate or out-of-order callbacks can
//! be recognised and ignored.

use std::sync::Mutex;

use tracing::warn;

use super::database::{kv_delete, kv_get, kv_set, Database};
use crate::error::{DatabaseError, Result};
use crate::timer::{build_timeline, Millis, RawStep, SessionRecord, Timeline};

const KEY_SESSION_JSON: &str = "session_json";
const KEY_SESSION_START: &str = "session_start_millis";
const KEY_SESSION_CURSOR: &str = "session_cursor";

pub trait SessionStore {
    /// Persist `record`, replacing any previous session and resetting the
    /// progress cursor.
    fn save(&self, record: &SessionRecord) -> Result<()>;

    /// Load the active session. Missing or unreadable state yields `None`.
    fn load(&self) -> Option<SessionRecord>;

    /// Forget the active session. After this `load()` returns `None`.
    fn clear(&self) -> Result<()>;

    /// Index of the last transition already handled for the active session.
    fn last_fired(&self) -> Option<usize>;

    /// Move the progress cursor forward to `index`.
    ///
    /// Returns `false` without writing if there is no active session or the
    /// cursor is already at or past `index`. The check and the write happen
    /// atomically.
    fn advance_cursor(&self, index: usize) -> Result<bool>;
}

/// Encode a timeline as compact `[{"t": .., "d": ..}]` pairs.
pub fn encode_timeline(timeline: &Timeline) -> Result<String> {
    Ok(serde_json::to_string(&timeline.to_raw())?)
}

/// Decode persisted state. Any malformation collapses to `None`.
pub fn decode_record(steps_json: &str, start_time_ms: Millis) -> Option<SessionRecord> {
    if start_time_ms == 0 {
        return None;
    }
    let raw: Vec<RawStep> = match serde_json::from_str(steps_json) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "Discarding unparseable persisted session");
            return None;
        }
    };
    match build_timeline(&raw) {
        Ok(timeline) => Some(SessionRecord::new(timeline, start_time_ms)),
        Err(err) => {
            warn!(error = %err, "Discarding persisted session with no usable steps");
            None
        }
    }
}

/// SQLite-backed store, surviving process restarts.
pub struct KvSessionStore {
    db: Database,
}

impl KvSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the store on the default database file.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub fn open() -> Result<Self> {
        Ok(Self::new(Database::open()?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn read_record(&self) -> Result<Option<SessionRecord>, rusqlite::Error> {
        let Some(json) = self.db.kv_get(KEY_SESSION_JSON)? else {
            return Ok(None);
        };
        let start = match self.db.kv_get(KEY_SESSION_START)? {
            Some(value) => value.parse::<Millis>().unwrap_or(0),
            None => 0,
        };
        Ok(decode_record(&json, start))
    }
}

impl SessionStore for KvSessionStore {
    fn save(&self, record: &SessionRecord) -> Result<()> {
        let json = encode_timeline(&record.timeline)?;
        let tx = self.db.begin_write()?;
        kv_set(&tx, KEY_SESSION_JSON, &json)?;
        kv_set(&tx, KEY_SESSION_START, &record.start_time_ms.to_string())?;
        kv_delete(&tx, KEY_SESSION_CURSOR)?;
        tx.commit()?;
        Ok(())
    }

    fn load(&self) -> Option<SessionRecord> {
        match self.read_record() {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "Failed to read persisted session");
                None
            }
        }
    }

    fn clear(&self) -> Result<()> {
        let tx = self.db.begin_write()?;
        kv_delete(&tx, KEY_SESSION_JSON)?;
        kv_delete(&tx, KEY_SESSION_START)?;
        kv_delete(&tx, KEY_SESSION_CURSOR)?;
        tx.commit()?;
        Ok(())
    }

    fn last_fired(&self) -> Option<usize> {
        match self.db.kv_get(KEY_SESSION_CURSOR) {
            Ok(value) => value.and_then(|v| v.parse().ok()),
            Err(err) => {
                warn!(error = %err, "Failed to read session cursor");
                None
            }
        }
    }

    fn advance_cursor(&self, index: usize) -> Result<bool> {
        let tx = self.db.begin_write()?;
        if kv_get(&tx, KEY_SESSION_JSON)?.is_none() {
            return Ok(false);
        }
        let current: Option<usize> = kv_get(&tx, KEY_SESSION_CURSOR)?.and_then(|v| v.parse().ok());
        if current.is_some_and(|c| c >= index) {
            return Ok(false);
        }
        kv_set(&tx, KEY_SESSION_CURSOR, &index.to_string())?;
        tx.commit()?;
        Ok(true)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    record: Option<SessionRecord>,
    cursor: Option<usize>,
}

/// In-process store for tests and hosts that embed the core without a
/// database.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    state: Mutex<MemoryState>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, record: &SessionRecord) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| DatabaseError::Poisoned)?;
        state.record = Some(record.clone());
        state.cursor = None;
        Ok(())
    }

    fn load(&self) -> Option<SessionRecord> {
        self.state.lock().ok()?.record.clone()
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| DatabaseError::Poisoned)?;
        *state = MemoryState::default();
        Ok(())
    }

    fn last_fired(&self) -> Option<usize> {
        self.state.lock().ok()?.cursor
    }

    fn advance_cursor(&self, index: usize) -> Result<bool> {
        let mut state = self.state.lock().map_err(|_| DatabaseError::Poisoned)?;
        if state.record.is_none() || state.cursor.is_some_and(|c| c >= index) {
            return Ok(false);
        }
        state.cursor = Some(index);
        Ok(true)
    }
}
