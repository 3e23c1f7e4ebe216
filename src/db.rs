// Admission Desk - Membership Store schema and queries
// Five record collections back the admission decision engine: members,
// waivers, payments, warnings, signins. Waiver/payment/warning/signin rows
// are append-only; only member profile fields are ever updated.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result};
use serde::{Deserialize, Serialize};

use crate::identifier::MemberId;

// ============================================================================
// RECORD TYPES
// ============================================================================

/// Member profile row
///
/// Created and updated by the registration path; read-only to the
/// decision engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub member_id: MemberId,
    pub name: String,
    pub email: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// Waiver row (append-only)
///
/// "Current" = most recent row whose valid_until is today or later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaiverRecord {
    /// Stable record identity (UUID) - rows are never edited or deleted
    pub id: String,
    pub member_id: MemberId,
    pub valid_until: NaiveDate,
    pub signed_on: DateTime<Utc>,
}

/// Payment row (append-only), same currency rule as waivers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: String,
    pub member_id: MemberId,
    pub amount: f64,
    pub paid_on: DateTime<Utc>,
    pub valid_until: NaiveDate,
}

/// Warning row (append-only)
///
/// Only the latest warning per member is consulted; its age against the
/// evaluation instant gates the waiver-only grace window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningRecord {
    pub id: String,
    pub member_id: MemberId,
    pub issued_at: DateTime<Utc>,
}

/// Sign-in row (append-only audit log)
///
/// Written exactly once per evaluation, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRecord {
    pub id: String,
    pub member_id: MemberId,
    pub timestamp: DateTime<Utc>,
    pub admitted: bool,
}

/// One line of the attendance report: sign-in joined with member name.
/// The name is absent when the identifier never registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub name: Option<String>,
    pub member_id: MemberId,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS members (
            member_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            registered_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS waivers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_uuid TEXT UNIQUE NOT NULL,
            member_id TEXT NOT NULL,
            valid_until TEXT NOT NULL,
            signed_on TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_uuid TEXT UNIQUE NOT NULL,
            member_id TEXT NOT NULL,
            amount REAL NOT NULL,
            paid_on TEXT NOT NULL,
            valid_until TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS warnings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_uuid TEXT UNIQUE NOT NULL,
            member_id TEXT NOT NULL,
            issued_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS signins (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_uuid TEXT UNIQUE NOT NULL,
            member_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            admitted INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS waiver_terms (
            name TEXT PRIMARY KEY,
            valid_until TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payment_terms (
            name TEXT PRIMARY KEY,
            amount REAL NOT NULL,
            valid_until TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_waivers_member ON waivers(member_id, valid_until)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_member ON payments(member_id, valid_until)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_warnings_member ON warnings(member_id, issued_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_signins_member ON signins(member_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_signins_timestamp ON signins(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// COLUMN PARSING
// ============================================================================

pub(crate) fn parse_timestamp(idx: usize, raw: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_date(idx: usize, raw: String) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_member_id(idx: usize, raw: String) -> Result<MemberId> {
    MemberId::parse(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// ============================================================================
// MEMBERS
// ============================================================================

pub fn get_member(conn: &Connection, id: &MemberId) -> Result<Option<Member>> {
    conn.query_row(
        "SELECT member_id, name, email, registered_at FROM members WHERE member_id = ?1",
        params![id.as_str()],
        |row| {
            Ok(Member {
                member_id: parse_member_id(0, row.get(0)?)?,
                name: row.get(1)?,
                email: row.get(2)?,
                registered_at: parse_timestamp(3, row.get(3)?)?,
            })
        },
    )
    .optional()
}

pub fn insert_member(
    conn: &Connection,
    id: &MemberId,
    name: &str,
    email: Option<&str>,
    registered_at: DateTime<Utc>,
) -> Result<Member> {
    conn.execute(
        "INSERT INTO members (member_id, name, email, registered_at) VALUES (?1, ?2, ?3, ?4)",
        params![id.as_str(), name, email, registered_at.to_rfc3339()],
    )?;

    Ok(Member {
        member_id: id.clone(),
        name: name.to_string(),
        email: email.map(|e| e.to_string()),
        registered_at,
    })
}

/// Update only the provided profile fields; absent fields keep their value.
/// Returns the number of rows changed (0 when the member does not exist).
pub fn update_member(
    conn: &Connection,
    id: &MemberId,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<usize> {
    conn.execute(
        "UPDATE members
         SET name = COALESCE(?2, name),
             email = COALESCE(?3, email)
         WHERE member_id = ?1",
        params![id.as_str(), name, email],
    )
}

// ============================================================================
// WAIVERS & PAYMENTS
// ============================================================================

/// Latest waiver whose valid_until is `today` or later, if any.
pub fn current_waiver(
    conn: &Connection,
    id: &MemberId,
    today: NaiveDate,
) -> Result<Option<WaiverRecord>> {
    conn.query_row(
        "SELECT record_uuid, member_id, valid_until, signed_on
         FROM waivers
         WHERE member_id = ?1 AND valid_until >= ?2
         ORDER BY signed_on DESC, id DESC
         LIMIT 1",
        params![id.as_str(), today.to_string()],
        |row| {
            Ok(WaiverRecord {
                id: row.get(0)?,
                member_id: parse_member_id(1, row.get(1)?)?,
                valid_until: parse_date(2, row.get(2)?)?,
                signed_on: parse_timestamp(3, row.get(3)?)?,
            })
        },
    )
    .optional()
}

pub fn insert_waiver(
    conn: &Connection,
    id: &MemberId,
    valid_until: NaiveDate,
    signed_on: DateTime<Utc>,
) -> Result<WaiverRecord> {
    let record_uuid = uuid::Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO waivers (record_uuid, member_id, valid_until, signed_on)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            record_uuid,
            id.as_str(),
            valid_until.to_string(),
            signed_on.to_rfc3339()
        ],
    )?;

    Ok(WaiverRecord {
        id: record_uuid,
        member_id: id.clone(),
        valid_until,
        signed_on,
    })
}

/// Latest payment whose valid_until is `today` or later, if any.
pub fn current_payment(
    conn: &Connection,
    id: &MemberId,
    today: NaiveDate,
) -> Result<Option<PaymentRecord>> {
    conn.query_row(
        "SELECT record_uuid, member_id, amount, paid_on, valid_until
         FROM payments
         WHERE member_id = ?1 AND valid_until >= ?2
         ORDER BY paid_on DESC, id DESC
         LIMIT 1",
        params![id.as_str(), today.to_string()],
        |row| {
            Ok(PaymentRecord {
                id: row.get(0)?,
                member_id: parse_member_id(1, row.get(1)?)?,
                amount: row.get(2)?,
                paid_on: parse_timestamp(3, row.get(3)?)?,
                valid_until: parse_date(4, row.get(4)?)?,
            })
        },
    )
    .optional()
}

pub fn insert_payment(
    conn: &Connection,
    id: &MemberId,
    amount: f64,
    paid_on: DateTime<Utc>,
    valid_until: NaiveDate,
) -> Result<PaymentRecord> {
    let record_uuid = uuid::Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO payments (record_uuid, member_id, amount, paid_on, valid_until)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record_uuid,
            id.as_str(),
            amount,
            paid_on.to_rfc3339(),
            valid_until.to_string()
        ],
    )?;

    Ok(PaymentRecord {
        id: record_uuid,
        member_id: id.clone(),
        amount,
        paid_on,
        valid_until,
    })
}

// ============================================================================
// WARNINGS & SIGN-INS
// ============================================================================

/// Most recent warning for a member regardless of age, if any.
pub fn latest_warning(conn: &Connection, id: &MemberId) -> Result<Option<WarningRecord>> {
    conn.query_row(
        "SELECT record_uuid, member_id, issued_at
         FROM warnings
         WHERE member_id = ?1
         ORDER BY issued_at DESC, id DESC
         LIMIT 1",
        params![id.as_str()],
        |row| {
            Ok(WarningRecord {
                id: row.get(0)?,
                member_id: parse_member_id(1, row.get(1)?)?,
                issued_at: parse_timestamp(2, row.get(2)?)?,
            })
        },
    )
    .optional()
}

pub fn insert_warning(
    conn: &Connection,
    id: &MemberId,
    issued_at: DateTime<Utc>,
) -> Result<WarningRecord> {
    let record_uuid = uuid::Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO warnings (record_uuid, member_id, issued_at) VALUES (?1, ?2, ?3)",
        params![record_uuid, id.as_str(), issued_at.to_rfc3339()],
    )?;

    Ok(WarningRecord {
        id: record_uuid,
        member_id: id.clone(),
        issued_at,
    })
}

pub fn insert_sign_in(
    conn: &Connection,
    id: &MemberId,
    timestamp: DateTime<Utc>,
    admitted: bool,
) -> Result<SignInRecord> {
    let record_uuid = uuid::Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO signins (record_uuid, member_id, timestamp, admitted)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            record_uuid,
            id.as_str(),
            timestamp.to_rfc3339(),
            admitted
        ],
    )?;

    Ok(SignInRecord {
        id: record_uuid,
        member_id: id.clone(),
        timestamp,
        admitted,
    })
}

// ============================================================================
// REPORTS & COUNTS
// ============================================================================

/// All sign-ins on a given UTC date, joined with member names, in
/// timestamp order. Identifiers that never registered appear with no name.
pub fn attendance_on(conn: &Connection, date: NaiveDate) -> Result<Vec<AttendanceEntry>> {
    let mut stmt = conn.prepare(
        "SELECT m.name, s.member_id, s.timestamp
         FROM signins s
         LEFT JOIN members m ON s.member_id = m.member_id
         WHERE substr(s.timestamp, 1, 10) = ?1
         ORDER BY s.timestamp, s.id",
    )?;

    let entries = stmt
        .query_map(params![date.to_string()], |row| {
            Ok(AttendanceEntry {
                name: row.get(0)?,
                member_id: parse_member_id(1, row.get(1)?)?,
                timestamp: parse_timestamp(2, row.get(2)?)?,
            })
        })?
        .collect::<Result<Vec<_>>>()?;

    Ok(entries)
}

/// Full sign-in history for one member, newest first.
pub fn sign_ins_for_member(conn: &Connection, id: &MemberId) -> Result<Vec<SignInRecord>> {
    let mut stmt = conn.prepare(
        "SELECT record_uuid, member_id, timestamp, admitted
         FROM signins
         WHERE member_id = ?1
         ORDER BY timestamp DESC, id DESC",
    )?;

    let records = stmt
        .query_map(params![id.as_str()], |row| {
            Ok(SignInRecord {
                id: row.get(0)?,
                member_id: parse_member_id(1, row.get(1)?)?,
                timestamp: parse_timestamp(2, row.get(2)?)?,
                admitted: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>>>()?;

    Ok(records)
}

pub fn sign_in_count(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM signins", [], |row| row.get(0))
}

pub fn warning_count(conn: &Connection, id: &MemberId) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM warnings WHERE member_id = ?1",
        params![id.as_str()],
        |row| row.get(0),
    )
}

// ============================================================================
// TESTS
// ============================================================================
