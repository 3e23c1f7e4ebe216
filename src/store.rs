// Membership Store - transactional boundary for the admission engine
// The engine never touches a connection directly: it receives a scoped
// transaction handle, reads a consistent snapshot, appends its rows, and
// the whole unit commits or rolls back together.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, TransactionBehavior};
use std::fmt;
use std::path::Path;

use crate::db::{self, Member, PaymentRecord, SignInRecord, WaiverRecord, WarningRecord};
use crate::identifier::MemberId;

// ============================================================================
// ERRORS
// ============================================================================

/// Transient store failure - distinct from every business outcome.
///
/// Any variant means the evaluation was rolled back and left zero rows
/// behind; the caller may safely retry the whole evaluation.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying database failure (connection loss, lock conflict)
    Database(rusqlite::Error),
    /// Transaction aborted before commit
    Aborted(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "membership store failure, try again: {}", e),
            StoreError::Aborted(reason) => write!(f, "evaluation aborted: {}", reason),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            StoreError::Aborted(_) => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e)
    }
}

// ============================================================================
// TRANSACTION INTERFACE
// ============================================================================

/// Operations available to one admission evaluation, all executed against
/// the same transaction snapshot.
///
/// Lookups return explicit optionals; presence is never inferred from
/// collection emptiness.
pub trait AdmissionTx {
    fn member(&mut self, id: &MemberId) -> Result<Option<Member>, StoreError>;

    /// Latest waiver with valid_until >= `today`, if any.
    fn current_waiver(
        &mut self,
        id: &MemberId,
        today: NaiveDate,
    ) -> Result<Option<WaiverRecord>, StoreError>;

    /// Latest payment with valid_until >= `today`, if any.
    fn current_payment(
        &mut self,
        id: &MemberId,
        today: NaiveDate,
    ) -> Result<Option<PaymentRecord>, StoreError>;

    /// Most recent warning regardless of age, if any.
    fn latest_warning(&mut self, id: &MemberId) -> Result<Option<WarningRecord>, StoreError>;

    fn insert_warning(
        &mut self,
        id: &MemberId,
        issued_at: DateTime<Utc>,
    ) -> Result<WarningRecord, StoreError>;

    fn insert_sign_in(
        &mut self,
        id: &MemberId,
        timestamp: DateTime<Utc>,
        admitted: bool,
    ) -> Result<SignInRecord, StoreError>;
}

/// A store that can run one admission evaluation as an atomic unit.
///
/// The closure runs inside a single transaction: commit happens only when
/// it returns `Ok`; any `Err` exit rolls everything back, so a half-written
/// Warning/SignIn pair is unreachable.
pub trait MembershipStore {
    fn with_admission_tx<T, F>(&mut self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn AdmissionTx) -> Result<T, StoreError>;
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// Production store over a SQLite connection.
///
/// Transactions are opened with immediate behavior so the
/// check-then-insert sequence on warnings cannot interleave with another
/// writer on the same database.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Wrap an existing connection. The schema must already be set up.
    pub fn new(conn: Connection) -> Self {
        SqliteStore { conn }
    }

    /// Open (creating if needed) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        db::setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    /// In-memory store with a fresh schema.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        db::setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    /// Direct connection access for the non-engine collaborators
    /// (registration, terms, reports).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

struct SqliteAdmissionTx<'a> {
    tx: &'a rusqlite::Transaction<'a>,
}

impl AdmissionTx for SqliteAdmissionTx<'_> {
    fn member(&mut self, id: &MemberId) -> Result<Option<Member>, StoreError> {
        Ok(db::get_member(self.tx, id)?)
    }

    fn current_waiver(
        &mut self,
        id: &MemberId,
        today: NaiveDate,
    ) -> Result<Option<WaiverRecord>, StoreError> {
        Ok(db::current_waiver(self.tx, id, today)?)
    }

    fn current_payment(
        &mut self,
        id: &MemberId,
        today: NaiveDate,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        Ok(db::current_payment(self.tx, id, today)?)
    }

    fn latest_warning(&mut self, id: &MemberId) -> Result<Option<WarningRecord>, StoreError> {
        Ok(db::latest_warning(self.tx, id)?)
    }

    fn insert_warning(
        &mut self,
        id: &MemberId,
        issued_at: DateTime<Utc>,
    ) -> Result<WarningRecord, StoreError> {
        Ok(db::insert_warning(self.tx, id, issued_at)?)
    }

    fn insert_sign_in(
        &mut self,
        id: &MemberId,
        timestamp: DateTime<Utc>,
        admitted: bool,
    ) -> Result<SignInRecord, StoreError> {
        Ok(db::insert_sign_in(self.tx, id, timestamp, admitted)?)
    }
}

impl MembershipStore for SqliteStore {
    fn with_admission_tx<T, F>(&mut self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn AdmissionTx) -> Result<T, StoreError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let outcome = {
            let mut scope = SqliteAdmissionTx { tx: &tx };
            f(&mut scope)
        };

        match outcome {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            // Dropping the uncommitted transaction rolls it back; no
            // partial Warning/SignIn pair can remain.
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
