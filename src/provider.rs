//! SQLite-backed scanner provider
//!
//! Stores the scan state, the media catalog and the scan trigger channel in
//! one database. Triggers bump a per-table version in `change_log` on every
//! write, from this process or any other, and a watcher thread turns version
//! bumps into change notifications for registered observers.

use chrono::{DateTime, TimeZone, Utc};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::ClientConfig;
use crate::context::{ContentObserver, ObserverId, ProviderContext, RowSet};
use crate::error::ClientError;
use crate::models::ScanState;
use crate::selection::Selection;

const SCAN_STATE_TABLE: &str = "scan_state";
const MEDIA_TABLE: &str = "media";
const OBSERVED_TABLES: [&str; 2] = [SCAN_STATE_TABLE, MEDIA_TABLE];

/// A scan trigger signal waiting for the scanner service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signal {
    /// Row id in the signals table
    pub id: i64,
    /// Broadcast action
    pub action: String,
    /// When the signal was sent
    pub sent_at: DateTime<Utc>,
}

struct ObserverEntry {
    id: ObserverId,
    uri: String,
    observer: Arc<dyn ContentObserver>,
}

struct ProviderInner {
    conn: Mutex<Connection>,
    observers: Mutex<Vec<ObserverEntry>>,
    next_observer_id: AtomicU64,
    /// URI -> table
    tables: HashMap<String, &'static str>,
}

struct Watcher {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Scanner provider over a SQLite database
pub struct SqliteProvider {
    inner: Arc<ProviderInner>,
    watcher: Mutex<Option<Watcher>>,
}

impl SqliteProvider {
    /// Open or create a provider database
    pub fn open(path: &Path, config: &ClientConfig) -> Result<Self, ClientError> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::with_connection(conn, config)
    }

    /// Open an in-memory provider (for testing)
    pub fn open_memory(config: &ClientConfig) -> Result<Self, ClientError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, config)
    }

    fn with_connection(conn: Connection, config: &ClientConfig) -> Result<Self, ClientError> {
        conn.busy_timeout(config.busy_timeout())?;
        init_schema(&conn)?;

        let tables = HashMap::from([
            (config.scan_state_uri(), SCAN_STATE_TABLE),
            (config.media_uri(), MEDIA_TABLE),
        ]);
        let inner = Arc::new(ProviderInner {
            conn: Mutex::new(conn),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(1),
            tables,
        });
        let watcher = spawn_watcher(Arc::clone(&inner), config.poll_interval())?;

        Ok(Self {
            inner,
            watcher: Mutex::new(Some(watcher)),
        })
    }

    /// Write the scan state row
    pub fn set_scan_state(&self, state: ScanState) -> Result<(), ClientError> {
        self.inner.conn()?.execute(
            "INSERT INTO scan_state (id, state) VALUES (0, ?1)
             ON CONFLICT(id) DO UPDATE SET state = excluded.state",
            [state.code()],
        )?;
        Ok(())
    }

    /// Write a raw state code, including values other than 0 and 1
    pub fn set_scan_state_code(&self, state: i64) -> Result<(), ClientError> {
        self.inner.conn()?.execute(
            "INSERT INTO scan_state (id, state) VALUES (0, ?1)
             ON CONFLICT(id) DO UPDATE SET state = excluded.state",
            [state],
        )?;
        Ok(())
    }

    /// Remove the scan state row
    pub fn clear_scan_state(&self) -> Result<(), ClientError> {
        self.inner.conn()?.execute("DELETE FROM scan_state", [])?;
        Ok(())
    }

    /// Add a media row
    pub fn insert_media(&self, path: &str, type_code: i64) -> Result<(), ClientError> {
        self.inner.conn()?.execute(
            "INSERT OR REPLACE INTO media (path, type, added_at) VALUES (?1, ?2, ?3)",
            params![path, type_code, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Add many media rows in one transaction
    pub fn insert_media_batch(&self, entries: &[(&str, i64)]) -> Result<(), ClientError> {
        let mut conn = self.inner.conn()?;
        let now = Utc::now().timestamp();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO media (path, type, added_at) VALUES (?1, ?2, ?3)",
            )?;
            for (path, type_code) in entries {
                stmt.execute(params![path, type_code, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove every media row
    pub fn clear_media(&self) -> Result<u64, ClientError> {
        let count = self.inner.conn()?.execute("DELETE FROM media", [])?;
        Ok(count as u64)
    }

    /// Scan trigger signals not yet taken by the scanner service
    pub fn pending_signals(&self) -> Result<Vec<Signal>, ClientError> {
        let conn = self.inner.conn()?;
        load_signals(&conn)
    }

    /// Take and remove all pending scan trigger signals
    pub fn take_signals(&self) -> Result<Vec<Signal>, ClientError> {
        let mut conn = self.inner.conn()?;
        let tx = conn.transaction()?;
        let signals = load_signals(&tx)?;
        tx.execute("DELETE FROM signals", [])?;
        tx.commit()?;
        Ok(signals)
    }

    /// Signal a change at `uri` to its observers right away
    pub fn notify_change(&self, uri: &str) {
        self.inner.dispatch(uri);
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        lock(&self.inner.observers).len()
    }
}

impl ProviderContext for SqliteProvider {
    fn query(&self, uri: &str, selection: &Selection) -> Result<RowSet, ClientError> {
        let table = self
            .inner
            .tables
            .get(uri)
            .ok_or_else(|| ClientError::unavailable(uri, "Unknown resource"))?;

        let mut sql = format!("SELECT * FROM {}", table);
        if let Some(predicate) = selection.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate);
        }
        sql.push_str(" ORDER BY rowid");

        let conn = self.inner.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = stmt.query(params_from_iter(selection.args()))?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            let record = (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<Result<Vec<_>, _>>()?;
            values.push(record);
        }

        debug!("Query {} returned {} rows", uri, values.len());
        Ok(RowSet::new(columns, values))
    }

    fn register_observer(&self, uri: &str, observer: Arc<dyn ContentObserver>) -> ObserverId {
        let id = ObserverId(self.inner.next_observer_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.inner.observers).push(ObserverEntry {
            id,
            uri: uri.to_string(),
            observer,
        });
        debug!("Registered observer {:?} for {}", id, uri);
        id
    }

    fn unregister_observer(&self, id: ObserverId) {
        lock(&self.inner.observers).retain(|entry| entry.id != id);
        debug!("Unregistered observer {:?}", id);
    }

    fn send_broadcast(&self, action: &str) -> Result<(), ClientError> {
        self.inner.conn()?.execute(
            "INSERT INTO signals (action, sent_at) VALUES (?1, ?2)",
            params![action, Utc::now().timestamp_millis()],
        )?;
        info!("Broadcast {}", action);
        Ok(())
    }
}

impl Drop for SqliteProvider {
    fn drop(&mut self) {
        if let Some(watcher) = lock(&self.watcher).take() {
            let _ = watcher.stop_tx.send(());
            if watcher.handle.join().is_err() {
                warn!("Provider watcher thread panicked");
            }
        }
    }
}

impl ProviderInner {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ClientError> {
        self.conn
            .lock()
            .map_err(|_| ClientError::database_error("Provider connection lock poisoned"))
    }

    fn change_versions(&self) -> Result<HashMap<String, i64>, ClientError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, version FROM change_log")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut versions = HashMap::new();
        for row in rows {
            let (name, version) = row?;
            versions.insert(name, version);
        }
        Ok(versions)
    }

    fn uri_for_table(&self, table: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|(_, t)| **t == table)
            .map(|(uri, _)| uri.as_str())
    }

    fn dispatch(&self, uri: &str) {
        let targets: Vec<Arc<dyn ContentObserver>> = lock(&self.observers)
            .iter()
            .filter(|entry| entry.uri == uri)
            .map(|entry| Arc::clone(&entry.observer))
            .collect();

        debug!("Change at {} -> {} observers", uri, targets.len());
        for observer in targets {
            observer.on_change(uri);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn init_schema(conn: &Connection) -> Result<(), ClientError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS scan_state (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            state INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS media (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE,
            type INTEGER NOT NULL,
            added_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_media_type ON media(type);

        CREATE TABLE IF NOT EXISTS signals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            action TEXT NOT NULL,
            sent_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS change_log (
            name TEXT PRIMARY KEY,
            version INTEGER NOT NULL DEFAULT 0
        );
        ",
    )?;

    for table in OBSERVED_TABLES {
        conn.execute(
            "INSERT OR IGNORE INTO change_log (name, version) VALUES (?1, 0)",
            [table],
        )?;
        for op in ["INSERT", "UPDATE", "DELETE"] {
            conn.execute_batch(&format!(
                "CREATE TRIGGER IF NOT EXISTS {table}_{op}_changed AFTER {op} ON {table}
                 BEGIN
                     UPDATE change_log SET version = version + 1 WHERE name = '{table}';
                 END;",
                table = table,
                op = op.to_lowercase(),
            ))?;
        }
    }
    Ok(())
}

fn load_signals(conn: &Connection) -> Result<Vec<Signal>, ClientError> {
    let mut stmt = conn.prepare("SELECT id, action, sent_at FROM signals ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        let sent_at: i64 = row.get(2)?;
        Ok(Signal {
            id: row.get(0)?,
            action: row.get(1)?,
            sent_at: Utc
                .timestamp_millis_opt(sent_at)
                .single()
                .unwrap_or_default(),
        })
    })?;

    let mut signals = Vec::new();
    for row in rows {
        signals.push(row?);
    }
    Ok(signals)
}

fn spawn_watcher(inner: Arc<ProviderInner>, interval: Duration) -> Result<Watcher, ClientError> {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let mut seen = inner.change_versions()?;

    let handle = thread::Builder::new()
        .name("provider-watcher".to_string())
        .spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            let current = match inner.change_versions() {
                Ok(versions) => versions,
                Err(e) => {
                    warn!("Failed to poll change log: {}", e);
                    continue;
                }
            };

            for (table, version) in &current {
                if seen.get(table) == Some(version) {
                    continue;
                }
                if let Some(uri) = inner.uri_for_table(table) {
                    inner.dispatch(uri);
                }
            }
            seen = current;
        })?;

    Ok(Watcher { stop_tx, handle })
}
