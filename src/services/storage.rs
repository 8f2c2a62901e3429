//! TimescaleDB connection lifecycle and the insert path.
//!
//! One `StorageConnector` wraps one database session. The session is owned by
//! a dedicated writer thread; `write` hands a row to that thread over an mpsc
//! channel and returns immediately, so the event path never blocks on the
//! database. Insert failures (including duplicate-key collisions) are logged
//! by the writer and the row is discarded; there is no retry queue.
//!
//! Schema provisioning happens at connect time and is idempotent end to end:
//! `CREATE TABLE IF NOT EXISTS`, `create_hypertable(..., if_not_exists)`,
//! compression settings and the 7-day compression policy. Hypertable and
//! compression failures are non-fatal; ingestion then runs against a plain
//! table.

use crate::db::models::NewEntry;
use crate::schema;
use diesel::prelude::*;
use diesel::{Connection, PgConnection};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const CREATE_TABLE_SQL: &str = "\
CREATE TABLE IF NOT EXISTS homey (
    homey_id VARCHAR(24) NOT NULL,
    device_id VARCHAR(36) NOT NULL,
    capability_id VARCHAR(1000) NOT NULL,
    time TIMESTAMPTZ NOT NULL,
    value DECIMAL,
    PRIMARY KEY (homey_id, device_id, capability_id, time)
)";

const CREATE_HYPERTABLE_SQL: &str = "SELECT create_hypertable('homey', 'time', if_not_exists => TRUE)";

const ENABLE_COMPRESSION_SQL: &str = "ALTER TABLE homey SET (timescaledb.compress, \
     timescaledb.compress_segmentby = 'homey_id, device_id, capability_id')";

const COMPRESSION_POLICY_SQL: &str =
    "SELECT add_compression_policy('homey', INTERVAL '7 days', if_not_exists => TRUE)";

/// The process-wide "current connection" cell.
///
/// Written only by the config coordinator (always a wholesale replacement),
/// read by every capability subscription. `None` means writes are dropped.
pub type ActiveConnection = Arc<RwLock<Option<StorageConnector>>>;

pub fn new_active_connection() -> ActiveConnection {
    Arc::new(RwLock::new(None))
}

#[derive(Debug)]
pub enum StorageError {
    /// Authentication or network-level connection failure.
    Connection(diesel::ConnectionError),
    /// The base table could not be provisioned.
    Provisioning(diesel::result::Error),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Connection(e) => write!(f, "connection failed: {}", e),
            StorageError::Provisioning(e) => write!(f, "schema provisioning failed: {}", e),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StorageError::Connection(e) => Some(e),
            StorageError::Provisioning(e) => Some(e),
        }
    }
}

impl From<diesel::ConnectionError> for StorageError {
    fn from(value: diesel::ConnectionError) -> Self {
        StorageError::Connection(value)
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum WriterCommand {
    Insert(NewEntry),
    Shutdown,
}

/// Handle to one live store connection.
///
/// Dropping the handle (or calling [`disconnect`](Self::disconnect)) shuts
/// the writer down and closes the session. Rows already handed to the writer
/// are still attempted; rows submitted after teardown began are dropped.
pub struct StorageConnector {
    tx: Sender<WriterCommand>,
    worker: Option<JoinHandle<()>>,
}

impl StorageConnector {
    /// Connect to the store at `uri` and provision the schema.
    ///
    /// `connect_timeout` is passed down as a libpq `connect_timeout`
    /// parameter so an unreachable host fails within a bounded time instead
    /// of hanging the caller.
    pub fn connect(uri: &str, connect_timeout: Duration) -> Result<Self, StorageError> {
        let mut conn = PgConnection::establish(&with_connect_timeout(uri, connect_timeout))?;
        info!("Connected to TimescaleDB");

        provision(&mut conn)?;

        let (tx, rx) = mpsc::channel();
        let worker = thread::spawn(move || writer_loop(conn, rx));
        Ok(StorageConnector { tx, worker: Some(worker) })
    }

    /// Fire-and-forget insert: enqueue the row and return immediately.
    ///
    /// Never blocks and never reports failure to the caller; the writer
    /// thread logs and discards rows it cannot persist.
    pub fn write(&self, row: NewEntry) {
        if self.tx.send(WriterCommand::Insert(row)).is_err() {
            // Writer already gone; the row is dropped by design.
            warn!("Entry dropped: storage writer has shut down");
        }
    }

    /// Tear the connection down: flush queued rows, close the session.
    pub fn disconnect(self) {
        drop(self);
    }

    #[cfg(test)]
    pub(crate) fn stub() -> (Self, Receiver<WriterCommand>) {
        let (tx, rx) = mpsc::channel();
        (StorageConnector { tx, worker: None }, rx)
    }
}

impl Drop for StorageConnector {
    fn drop(&mut self) {
        let _ = self.tx.send(WriterCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        info!("Disconnected from TimescaleDB");
    }
}

/// Connect seam, so the coordinator can be exercised without a live store.
pub trait StorageConnect: Send {
    fn connect(&self, uri: &str, connect_timeout: Duration) -> Result<StorageConnector, StorageError>;
}

/// The real thing: blocking libpq connection via Diesel.
pub struct PgStorageConnect;

impl StorageConnect for PgStorageConnect {
    fn connect(&self, uri: &str, connect_timeout: Duration) -> Result<StorageConnector, StorageError> {
        StorageConnector::connect(uri, connect_timeout)
    }
}

fn provision(conn: &mut PgConnection) -> Result<(), StorageError> {
    diesel::sql_query(CREATE_TABLE_SQL)
        .execute(conn)
        .map_err(StorageError::Provisioning)?;
    info!("Homey table is ready");

    // Hypertable conversion and compression are degraded-mode features:
    // without the timescaledb extension the statements fail and ingestion
    // continues against the plain table.
    match diesel::sql_query(CREATE_HYPERTABLE_SQL).execute(conn) {
        Ok(_) => info!("Homey table is a hypertable"),
        Err(e) => warn!("Error creating hypertable (continuing without partitioning): {}", e),
    }

    match diesel::sql_query(ENABLE_COMPRESSION_SQL)
        .execute(conn)
        .and_then(|_| diesel::sql_query(COMPRESSION_POLICY_SQL).execute(conn))
    {
        Ok(_) => info!("Compression enabled on Homey table"),
        Err(e) => warn!("Error enabling compression (continuing uncompressed): {}", e),
    }

    Ok(())
}

fn writer_loop(mut conn: PgConnection, rx: Receiver<WriterCommand>) {
    for command in rx {
        match command {
            WriterCommand::Insert(row) => insert_entry(&mut conn, &row),
            WriterCommand::Shutdown => break,
        }
    }
    // `conn` drops here, closing the session.
}

fn insert_entry(conn: &mut PgConnection, row: &NewEntry) {
    use schema::homey::dsl as H;

    let result = diesel::insert_into(H::homey)
        .values(row)
        .on_conflict((H::homey_id, H::device_id, H::capability_id, H::time))
        .do_nothing()
        .execute(conn);

    match result {
        Ok(0) => debug!(
            "[Device:{}][Capability:{}] Duplicate entry at {} ignored",
            row.device_id, row.capability_id, row.time
        ),
        Ok(_) => {}
        Err(e) => error!("Error inserting entry: {}", e),
    }
}

/// Inject the application-level connect timeout as a libpq URI parameter,
/// unless the operator already set one explicitly.
fn with_connect_timeout(uri: &str, timeout: Duration) -> String {
    if timeout.is_zero() || uri.contains("connect_timeout=") {
        return uri.to_string();
    }
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!("{}{}connect_timeout={}", uri, separator, timeout.as_secs().max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::Utc;

    #[test]
    fn connect_timeout_is_appended() {
        assert_eq!(
            with_connect_timeout("postgres://u:p@h:5432/db", Duration::from_secs(10)),
            "postgres://u:p@h:5432/db?connect_timeout=10"
        );
        assert_eq!(
            with_connect_timeout("postgres://u:p@h:5432/db?sslmode=require", Duration::from_secs(10)),
            "postgres://u:p@h:5432/db?sslmode=require&connect_timeout=10"
        );
    }

    #[test]
    fn connect_timeout_is_not_overridden_or_forced() {
        assert_eq!(
            with_connect_timeout("postgres://u:p@h:5432/db?connect_timeout=3", Duration::from_secs(10)),
            "postgres://u:p@h:5432/db?connect_timeout=3"
        );
        assert_eq!(
            with_connect_timeout("postgres://u:p@h:5432/db", Duration::ZERO),
            "postgres://u:p@h:5432/db"
        );
    }

    #[test]
    fn sub_second_timeouts_round_up_to_one_second() {
        assert_eq!(
            with_connect_timeout("postgres://u:p@h:5432/db", Duration::from_millis(100)),
            "postgres://u:p@h:5432/db?connect_timeout=1"
        );
    }

    #[test]
    fn stub_write_enqueues_and_drop_signals_shutdown() {
        let (connector, rx) = StorageConnector::stub();
        let row = NewEntry::new("abc123", "dev-1", "onoff", Utc::now(), BigDecimal::from(1));
        connector.write(row.clone());
        assert_eq!(rx.recv().unwrap(), WriterCommand::Insert(row));

        connector.disconnect();
        assert_eq!(rx.recv().unwrap(), WriterCommand::Shutdown);
        assert!(rx.recv().is_err());
    }
}
