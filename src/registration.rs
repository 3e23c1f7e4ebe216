// Registration - member upsert and waiver/payment row creation
// These are the write paths that feed the decision engine's reads. Waiver
// and payment rows are stamped with the validity end-date of the term they
// were created under; the rows never change afterwards.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::fmt;

use crate::db::{self, Member, PaymentRecord, WaiverRecord};
use crate::identifier::MemberId;
use crate::terms;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum RegistrationError {
    /// No waiver term with this name
    UnknownWaiverTerm(String),
    /// No payment term with this name
    UnknownPaymentTerm(String),
    /// The term has no validity end-date, so no record can be stamped
    OpenEndedTerm(String),
    /// Creating a new member requires a display name
    MissingName,
    /// Underlying database failure
    Db(rusqlite::Error),
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::UnknownWaiverTerm(name) => {
                write!(f, "waiver term not found: {}", name)
            }
            RegistrationError::UnknownPaymentTerm(name) => {
                write!(f, "payment term not found: {}", name)
            }
            RegistrationError::OpenEndedTerm(name) => {
                write!(f, "term '{}' has no validity end-date", name)
            }
            RegistrationError::MissingName => write!(f, "a name is required to create a member"),
            RegistrationError::Db(e) => write!(f, "database error: {}", e),
        }
    }
}

impl std::error::Error for RegistrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistrationError::Db(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for RegistrationError {
    fn from(e: rusqlite::Error) -> Self {
        RegistrationError::Db(e)
    }
}

// ============================================================================
// MEMBER UPSERT
// ============================================================================

/// What the upsert did to the member row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberChange {
    Created,
    Updated,
    Unchanged,
}

impl MemberChange {
    pub fn message(&self) -> &'static str {
        match self {
            MemberChange::Created => "New member created",
            MemberChange::Updated => "Member updated",
            MemberChange::Unchanged => "No updates required",
        }
    }
}

/// Create the member when absent (name required), otherwise update only
/// the provided profile fields.
pub fn upsert_member(
    conn: &Connection,
    id: &MemberId,
    name: Option<&str>,
    email: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(MemberChange, Member), RegistrationError> {
    match db::get_member(conn, id)? {
        None => {
            let name = name.ok_or(RegistrationError::MissingName)?;
            let member = db::insert_member(conn, id, name, email, now)?;
            Ok((MemberChange::Created, member))
        }
        Some(existing) => {
            if name.is_none() && email.is_none() {
                return Ok((MemberChange::Unchanged, existing));
            }

            db::update_member(conn, id, name, email)?;
            let member = db::get_member(conn, id)?.ok_or_else(|| {
                // The row was just updated; losing it mid-call is a store
                // problem, not a registration one.
                RegistrationError::Db(rusqlite::Error::QueryReturnedNoRows)
            })?;
            Ok((MemberChange::Updated, member))
        }
    }
}

// ============================================================================
// WAIVER & PAYMENT CREATION
// ============================================================================

/// Append a waiver row for the member under the named term.
///
/// The member row does not have to exist yet; lifecycle ordering is the
/// caller's concern.
pub fn record_waiver(
    conn: &Connection,
    id: &MemberId,
    term_name: &str,
    signed_on: DateTime<Utc>,
) -> Result<WaiverRecord, RegistrationError> {
    let term = terms::waiver_term(conn, term_name)?
        .ok_or_else(|| RegistrationError::UnknownWaiverTerm(term_name.to_string()))?;
    let valid_until = term
        .valid_until
        .ok_or_else(|| RegistrationError::OpenEndedTerm(term_name.to_string()))?;

    Ok(db::insert_waiver(conn, id, valid_until, signed_on)?)
}

/// Append a payment row for the member under the named term, carrying the
/// term's amount and validity end-date.
pub fn record_payment(
    conn: &Connection,
    id: &MemberId,
    term_name: &str,
    paid_on: DateTime<Utc>,
) -> Result<PaymentRecord, RegistrationError> {
    let term = terms::payment_term(conn, term_name)?
        .ok_or_else(|| RegistrationError::UnknownPaymentTerm(term_name.to_string()))?;
    let valid_until = term
        .valid_until
        .ok_or_else(|| RegistrationError::OpenEndedTerm(term_name.to_string()))?;

    Ok(db::insert_payment(conn, id, term.amount, paid_on, valid_until)?)
}

// ============================================================================
// TESTS
// ============================================================================
