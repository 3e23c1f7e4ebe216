// Term Lookup - named waiver/payment terms
// A term maps a name (e.g. "Fall 2026") to the validity end-date stamped
// onto waiver/payment rows at creation time. The decision engine never
// resolves terms; it only consumes the rows they produced.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Result};
use serde::{Deserialize, Serialize};

use crate::db::parse_date;

// ============================================================================
// TERM TYPES
// ============================================================================

/// A named waiver term. `valid_until = None` means the term itself never
/// stops being offered; it cannot be used to create waiver rows (see
/// registration).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaiverTerm {
    pub name: String,
    pub valid_until: Option<NaiveDate>,
}

/// A named payment term: price plus validity end-date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTerm {
    pub name: String,
    pub amount: f64,
    pub valid_until: Option<NaiveDate>,
}

// ============================================================================
// CATALOG QUERIES
// ============================================================================

pub fn add_waiver_term(
    conn: &Connection,
    name: &str,
    valid_until: Option<NaiveDate>,
) -> Result<WaiverTerm> {
    conn.execute(
        "INSERT INTO waiver_terms (name, valid_until) VALUES (?1, ?2)",
        params![name, valid_until.map(|d| d.to_string())],
    )?;

    Ok(WaiverTerm {
        name: name.to_string(),
        valid_until,
    })
}

pub fn add_payment_term(
    conn: &Connection,
    name: &str,
    amount: f64,
    valid_until: Option<NaiveDate>,
) -> Result<PaymentTerm> {
    conn.execute(
        "INSERT INTO payment_terms (name, amount, valid_until) VALUES (?1, ?2, ?3)",
        params![name, amount, valid_until.map(|d| d.to_string())],
    )?;

    Ok(PaymentTerm {
        name: name.to_string(),
        amount,
        valid_until,
    })
}

pub fn waiver_term(conn: &Connection, name: &str) -> Result<Option<WaiverTerm>> {
    conn.query_row(
        "SELECT name, valid_until FROM waiver_terms WHERE name = ?1",
        params![name],
        |row| {
            Ok(WaiverTerm {
                name: row.get(0)?,
                valid_until: row
                    .get::<_, Option<String>>(1)?
                    .map(|raw| parse_date(1, raw))
                    .transpose()?,
            })
        },
    )
    .optional()
}

pub fn payment_term(conn: &Connection, name: &str) -> Result<Option<PaymentTerm>> {
    conn.query_row(
        "SELECT name, amount, valid_until FROM payment_terms WHERE name = ?1",
        params![name],
        |row| {
            Ok(PaymentTerm {
                name: row.get(0)?,
                amount: row.get(1)?,
                valid_until: row
                    .get::<_, Option<String>>(2)?
                    .map(|raw| parse_date(2, raw))
                    .transpose()?,
            })
        },
    )
    .optional()
}

/// Waiver terms still offerable today: open-ended or not yet lapsed.
pub fn current_waiver_terms(conn: &Connection, today: NaiveDate) -> Result<Vec<WaiverTerm>> {
    let mut stmt = conn.prepare(
        "SELECT name, valid_until FROM waiver_terms
         WHERE valid_until IS NULL OR valid_until >= ?1
         ORDER BY name",
    )?;

    let terms = stmt
        .query_map(params![today.to_string()], |row| {
            Ok(WaiverTerm {
                name: row.get(0)?,
                valid_until: row
                    .get::<_, Option<String>>(1)?
                    .map(|raw| parse_date(1, raw))
                    .transpose()?,
            })
        })?
        .collect::<Result<Vec<_>>>()?;

    Ok(terms)
}

/// Payment terms still offerable today.
pub fn current_payment_terms(conn: &Connection, today: NaiveDate) -> Result<Vec<PaymentTerm>> {
    let mut stmt = conn.prepare(
        "SELECT name, amount, valid_until FROM payment_terms
         WHERE valid_until IS NULL OR valid_until >= ?1
         ORDER BY name",
    )?;

    let terms = stmt
        .query_map(params![today.to_string()], |row| {
            Ok(PaymentTerm {
                name: row.get(0)?,
                amount: row.get(1)?,
                valid_until: row
                    .get::<_, Option<String>>(2)?
                    .map(|raw| parse_date(2, raw))
                    .transpose()?,
            })
        })?
        .collect::<Result<Vec<_>>>()?;

    Ok(terms)
}

// ============================================================================
// TESTS
// ============================================================================
