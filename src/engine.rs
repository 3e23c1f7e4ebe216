// Admission Decision Engine
// Given a member identifier, read waiver/payment/warning state inside one
// transaction, record the visit, and return a fixed admission outcome.
//
// The waiver-only branch is the escalating-warning sub-machine: one
// no-warning-needed grace entry, then a 24-hour repeat-entry window, then
// lockout until payment resumes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier::MemberId;
use crate::store::{AdmissionTx, MembershipStore, StoreError};

/// Repeat grace admissions are allowed while the latest warning is at most
/// this old.
pub const WARNING_GRACE_HOURS: i64 = 24;

// ============================================================================
// OUTCOMES
// ============================================================================

/// The fixed set of admission statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStatus {
    NotFound,
    Active,
    NoWaiver,
    Inactive,
    WarningIssued,
    WarningActive,
    WarningExpired,
}

impl AdmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionStatus::NotFound => "not_found",
            AdmissionStatus::Active => "active",
            AdmissionStatus::NoWaiver => "no_waiver",
            AdmissionStatus::Inactive => "inactive",
            AdmissionStatus::WarningIssued => "warning_issued",
            AdmissionStatus::WarningActive => "warning_active",
            AdmissionStatus::WarningExpired => "warning_expired",
        }
    }

    /// Door-facing message for this status.
    pub fn message(&self) -> &'static str {
        match self {
            AdmissionStatus::NotFound => "Member not found. Please sign a waiver.",
            AdmissionStatus::Active => "Member has a valid waiver and payment.",
            AdmissionStatus::NoWaiver => "Member has paid but needs to sign a waiver.",
            AdmissionStatus::Inactive => "Member needs to sign a waiver and pay.",
            AdmissionStatus::WarningIssued => {
                "Warning issued. Member allowed entry this time. Please pay soon."
            }
            AdmissionStatus::WarningActive => "Member admitted. Please pay soon.",
            AdmissionStatus::WarningExpired => {
                "Previous warning expired. Entry not allowed. Please pay to regain access."
            }
        }
    }

    /// Whether this status grants entry. The sign-in row's admitted flag
    /// always equals this.
    pub fn admitted(&self) -> bool {
        matches!(
            self,
            AdmissionStatus::Active
                | AdmissionStatus::WarningIssued
                | AdmissionStatus::WarningActive
        )
    }
}

/// Result of one admission evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionOutcome {
    pub status: AdmissionStatus,
    pub message: String,
    /// Display name, present whenever the member row exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AdmissionOutcome {
    fn new(status: AdmissionStatus, name: Option<String>) -> Self {
        AdmissionOutcome {
            status,
            message: status.message().to_string(),
            name,
        }
    }

    pub fn admitted(&self) -> bool {
        self.status.admitted()
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// The decision engine over an injected membership store.
///
/// Each call runs as one atomic transaction: either the full read/decide/
/// write sequence commits, or the caller gets a `StoreError` and nothing
/// was persisted for the attempt.
pub struct AdmissionEngine<S: MembershipStore> {
    store: S,
}

impl<S: MembershipStore> AdmissionEngine<S> {
    pub fn new(store: S) -> Self {
        AdmissionEngine { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Evaluate against the real clock.
    pub fn evaluate(&mut self, id: &MemberId) -> Result<AdmissionOutcome, StoreError> {
        self.evaluate_at(id, Utc::now())
    }

    /// Evaluate at an explicit instant. Waiver/payment currency is judged
    /// against the instant's UTC date; warning age against the instant
    /// itself.
    pub fn evaluate_at(
        &mut self,
        id: &MemberId,
        now: DateTime<Utc>,
    ) -> Result<AdmissionOutcome, StoreError> {
        self.store.with_admission_tx(|tx| decide(tx, id, now))
    }
}

/// The fixed decision procedure. Every branch writes exactly one sign-in
/// row; only the no-prior-warning branch writes a warning row.
fn decide(
    tx: &mut dyn AdmissionTx,
    id: &MemberId,
    now: DateTime<Utc>,
) -> Result<AdmissionOutcome, StoreError> {
    let today = now.date_naive();

    let member = match tx.member(id)? {
        Some(member) => member,
        None => {
            tx.insert_sign_in(id, now, false)?;
            return Ok(AdmissionOutcome::new(AdmissionStatus::NotFound, None));
        }
    };

    let has_valid_waiver = tx.current_waiver(id, today)?.is_some();
    let has_valid_payment = tx.current_payment(id, today)?.is_some();

    // Waiver only: route through the warning sub-machine.
    if has_valid_waiver && !has_valid_payment {
        let status = match tx.latest_warning(id)? {
            None => {
                // One-time grace admission
                tx.insert_warning(id, now)?;
                AdmissionStatus::WarningIssued
            }
            Some(warning) => {
                let age = now.signed_duration_since(warning.issued_at);
                if age <= Duration::hours(WARNING_GRACE_HOURS) {
                    AdmissionStatus::WarningActive
                } else {
                    AdmissionStatus::WarningExpired
                }
            }
        };

        tx.insert_sign_in(id, now, status.admitted())?;
        return Ok(AdmissionOutcome::new(status, Some(member.name)));
    }

    let status = if has_valid_waiver && has_valid_payment {
        AdmissionStatus::Active
    } else if has_valid_payment {
        AdmissionStatus::NoWaiver
    } else {
        AdmissionStatus::Inactive
    };

    tx.insert_sign_in(id, now, status.admitted())?;
    Ok(AdmissionOutcome::new(status, Some(member.name)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::store::SqliteStore;
    use chrono::{NaiveDate, TimeZone};
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn id(n: &str) -> MemberId {
        MemberId::normalize(n).unwrap()
    }

    fn ts(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    fn date(y: i32, mo: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap()
    }

    /// Evaluation instant used throughout: 2026-08-08 19:00 UTC.
    fn now() -> DateTime<Utc> {
        ts(2026, 8, 8, 19)
    }

    fn engine() -> AdmissionEngine<SqliteStore> {
        AdmissionEngine::new(SqliteStore::open_in_memory().unwrap())
    }

    fn seed_member(conn: &Connection, member_id: &MemberId, name: &str) {
        db::insert_member(conn, member_id, name, None, ts(2026, 1, 1, 9)).unwrap();
    }

    fn seed_valid_waiver(conn: &Connection, member_id: &MemberId) {
        db::insert_waiver(conn, member_id, date(2026, 12, 31), ts(2026, 6, 1, 12)).unwrap();
    }

    fn seed_valid_payment(conn: &Connection, member_id: &MemberId) {
        db::insert_payment(conn, member_id, 25.0, ts(2026, 7, 1, 12), date(2026, 12, 31)).unwrap();
    }

    fn table_count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn test_not_found_writes_failed_sign_in() {
        let mut engine = engine();
        let member_id = id("404");

        let outcome = engine.evaluate_at(&member_id, now()).unwrap();

        assert_eq!(outcome.status, AdmissionStatus::NotFound);
        assert_eq!(outcome.message, "Member not found. Please sign a waiver.");
        assert!(outcome.name.is_none());
        assert!(!outcome.admitted());

        let conn = engine.store().connection();
        let history = db::sign_ins_for_member(conn, &member_id).unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].admitted);
    }

    #[test]
    fn test_not_found_ignores_stray_rows() {
        // Waiver/payment/warning rows without a member row must not
        // change the short-circuit.
        let mut engine = engine();
        let member_id = id("404");
        {
            let conn = engine.store().connection();
            seed_valid_waiver(conn, &member_id);
            seed_valid_payment(conn, &member_id);
            db::insert_warning(conn, &member_id, ts(2026, 8, 8, 10)).unwrap();
        }

        let outcome = engine.evaluate_at(&member_id, now()).unwrap();

        assert_eq!(outcome.status, AdmissionStatus::NotFound);
        let conn = engine.store().connection();
        assert_eq!(db::warning_count(conn, &member_id).unwrap(), 1);
        assert_eq!(db::sign_in_count(conn).unwrap(), 1);
    }

    #[test]
    fn test_active_member_admitted() {
        let mut engine = engine();
        let member_id = id("1");
        {
            let conn = engine.store().connection();
            seed_member(conn, &member_id, "Ada Lovelace");
            seed_valid_waiver(conn, &member_id);
            seed_valid_payment(conn, &member_id);
        }

        let outcome = engine.evaluate_at(&member_id, now()).unwrap();

        assert_eq!(outcome.status, AdmissionStatus::Active);
        assert_eq!(outcome.message, "Member has a valid waiver and payment.");
        assert_eq!(outcome.name.as_deref(), Some("Ada Lovelace"));
        assert!(outcome.admitted());

        let conn = engine.store().connection();
        let history = db::sign_ins_for_member(conn, &member_id).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].admitted);
        // No warning on the happy path
        assert_eq!(db::warning_count(conn, &member_id).unwrap(), 0);
    }

    #[test]
    fn test_payment_only_needs_waiver() {
        let mut engine = engine();
        let member_id = id("2");
        {
            let conn = engine.store().connection();
            seed_member(conn, &member_id, "Grace Hopper");
            seed_valid_payment(conn, &member_id);
        }

        let outcome = engine.evaluate_at(&member_id, now()).unwrap();

        assert_eq!(outcome.status, AdmissionStatus::NoWaiver);
        assert_eq!(
            outcome.message,
            "Member has paid but needs to sign a waiver."
        );
        assert!(!outcome.admitted());

        let conn = engine.store().connection();
        let history = db::sign_ins_for_member(conn, &member_id).unwrap();
        assert!(!history[0].admitted);
    }

    #[test]
    fn test_neither_valid_is_inactive() {
        let mut engine = engine();
        let member_id = id("3");
        {
            let conn = engine.store().connection();
            seed_member(conn, &member_id, "Alan Turing");
            // Both lapsed well before the evaluation date
            db::insert_waiver(conn, &member_id, date(2026, 1, 31), ts(2025, 12, 1, 12)).unwrap();
            db::insert_payment(conn, &member_id, 25.0, ts(2025, 12, 1, 12), date(2026, 1, 31))
                .unwrap();
        }

        let outcome = engine.evaluate_at(&member_id, now()).unwrap();

        assert_eq!(outcome.status, AdmissionStatus::Inactive);
        assert_eq!(outcome.message, "Member needs to sign a waiver and pay.");
        assert!(!outcome.admitted());
        assert_eq!(outcome.name.as_deref(), Some("Alan Turing"));
    }

    #[test]
    fn test_waiver_only_first_visit_issues_warning() {
        let mut engine = engine();
        let member_id = id("4");
        {
            let conn = engine.store().connection();
            seed_member(conn, &member_id, "Ada Lovelace");
            seed_valid_waiver(conn, &member_id);
        }

        let outcome = engine.evaluate_at(&member_id, now()).unwrap();

        assert_eq!(outcome.status, AdmissionStatus::WarningIssued);
        assert_eq!(
            outcome.message,
            "Warning issued. Member allowed entry this time. Please pay soon."
        );
        assert!(outcome.admitted());

        let conn = engine.store().connection();
        assert_eq!(db::warning_count(conn, &member_id).unwrap(), 1);
        let warning = db::latest_warning(conn, &member_id).unwrap().unwrap();
        assert_eq!(warning.issued_at, now());
    }

    #[test]
    fn test_warning_ladder_issued_active_expired() {
        let mut engine = engine();
        let member_id = id("4");
        {
            let conn = engine.store().connection();
            seed_member(conn, &member_id, "Ada Lovelace");
            seed_valid_waiver(conn, &member_id);
        }

        // First visit: warning issued, admitted
        let first = engine.evaluate_at(&member_id, now()).unwrap();
        assert_eq!(first.status, AdmissionStatus::WarningIssued);

        // One hour later: still inside the grace window, no new warning
        let second = engine
            .evaluate_at(&member_id, now() + Duration::hours(1))
            .unwrap();
        assert_eq!(second.status, AdmissionStatus::WarningActive);
        assert_eq!(second.message, "Member admitted. Please pay soon.");
        assert!(second.admitted());
        assert_eq!(
            db::warning_count(engine.store().connection(), &member_id).unwrap(),
            1
        );

        // 25 hours after the warning: grace spent, locked out
        let third = engine
            .evaluate_at(&member_id, now() + Duration::hours(25))
            .unwrap();
        assert_eq!(third.status, AdmissionStatus::WarningExpired);
        assert_eq!(
            third.message,
            "Previous warning expired. Entry not allowed. Please pay to regain access."
        );
        assert!(!third.admitted());

        let conn = engine.store().connection();
        // Still exactly one warning; the expired branch never re-issues
        assert_eq!(db::warning_count(conn, &member_id).unwrap(), 1);
        let history = db::sign_ins_for_member(conn, &member_id).unwrap();
        assert_eq!(history.len(), 3);
        assert!(!history[0].admitted);
        assert!(history[1].admitted);
        assert!(history[2].admitted);
    }

    #[test]
    fn test_warning_age_boundary_is_inclusive() {
        let mut engine = engine();
        let member_id = id("4");
        {
            let conn = engine.store().connection();
            seed_member(conn, &member_id, "Ada Lovelace");
            seed_valid_waiver(conn, &member_id);
        }

        engine.evaluate_at(&member_id, now()).unwrap();

        // Exactly 24 hours old: still inside the window
        let at_limit = engine
            .evaluate_at(&member_id, now() + Duration::hours(WARNING_GRACE_HOURS))
            .unwrap();
        assert_eq!(at_limit.status, AdmissionStatus::WarningActive);

        // One second past: expired
        let past_limit = engine
            .evaluate_at(
                &member_id,
                now() + Duration::hours(WARNING_GRACE_HOURS) + Duration::seconds(1),
            )
            .unwrap();
        assert_eq!(past_limit.status, AdmissionStatus::WarningExpired);
    }

    #[test]
    fn test_lockout_repeats_until_payment() {
        let mut engine = engine();
        let member_id = id("4");
        {
            let conn = engine.store().connection();
            seed_member(conn, &member_id, "Ada Lovelace");
            seed_valid_waiver(conn, &member_id);
        }

        engine.evaluate_at(&member_id, now()).unwrap();

        // Locked out on day 3 and day 4 alike; no new warnings appear
        for days in [3, 4] {
            let outcome = engine
                .evaluate_at(&member_id, now() + Duration::days(days))
                .unwrap();
            assert_eq!(outcome.status, AdmissionStatus::WarningExpired);
        }
        assert_eq!(
            db::warning_count(engine.store().connection(), &member_id).unwrap(),
            1
        );

        // Payment resumes: back to the happy path
        seed_valid_payment(engine.store().connection(), &member_id);
        let outcome = engine
            .evaluate_at(&member_id, now() + Duration::days(5))
            .unwrap();
        assert_eq!(outcome.status, AdmissionStatus::Active);
        assert!(outcome.admitted());
    }

    #[test]
    fn test_stale_warning_never_consulted_once_paid() {
        // A warning left over from a lapsed-payment spell does not block a
        // member whose waiver and payment are both current again.
        let mut engine = engine();
        let member_id = id("6");
        {
            let conn = engine.store().connection();
            seed_member(conn, &member_id, "Ada Lovelace");
            seed_valid_waiver(conn, &member_id);
            seed_valid_payment(conn, &member_id);
            db::insert_warning(conn, &member_id, now() - Duration::hours(50)).unwrap();
        }

        let outcome = engine.evaluate_at(&member_id, now()).unwrap();
        assert_eq!(outcome.status, AdmissionStatus::Active);
        assert!(outcome.admitted());
    }

    #[test]
    fn test_evaluation_only_grows_audit_collections() {
        let mut engine = engine();
        let member_id = id("7");
        {
            let conn = engine.store().connection();
            seed_member(conn, &member_id, "Ada Lovelace");
            seed_valid_waiver(conn, &member_id);
            seed_valid_payment(conn, &member_id);
        }

        let before_members = table_count(engine.store().connection(), "members");
        let before_waivers = table_count(engine.store().connection(), "waivers");
        let before_payments = table_count(engine.store().connection(), "payments");

        for hour in 0..4 {
            engine
                .evaluate_at(&member_id, now() + Duration::hours(hour))
                .unwrap();
        }

        let conn = engine.store().connection();
        assert_eq!(table_count(conn, "members"), before_members);
        assert_eq!(table_count(conn, "waivers"), before_waivers);
        assert_eq!(table_count(conn, "payments"), before_payments);
        assert_eq!(table_count(conn, "signins"), 4);
    }

    #[test]
    fn test_concurrent_evaluations_issue_one_warning() {
        let setup = engine();
        let member_id = id("8");
        {
            let conn = setup.store().connection();
            seed_member(conn, &member_id, "Ada Lovelace");
            seed_valid_waiver(conn, &member_id);
        }

        let shared = Arc::new(Mutex::new(setup));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let shared = Arc::clone(&shared);
            let member_id = member_id.clone();
            handles.push(thread::spawn(move || {
                let mut engine = shared.lock().unwrap();
                engine.evaluate_at(&member_id, now()).unwrap()
            }));
        }

        let outcomes: Vec<AdmissionOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let issued = outcomes
            .iter()
            .filter(|o| o.status == AdmissionStatus::WarningIssued)
            .count();
        let active = outcomes
            .iter()
            .filter(|o| o.status == AdmissionStatus::WarningActive)
            .count();

        // Exactly one evaluation observed "no warning" and issued one;
        // every other one rode the grace window it created.
        assert_eq!(issued, 1);
        assert_eq!(active, 7);
        assert!(outcomes.iter().all(|o| o.admitted()));

        let engine = shared.lock().unwrap();
        let conn = engine.store().connection();
        assert_eq!(db::warning_count(conn, &member_id).unwrap(), 1);
        assert_eq!(db::sign_in_count(conn).unwrap(), 8);
    }

    // ========================================================================
    // Forced-failure double: the sign-in insert fails after the warning
    // insert succeeded, so the whole evaluation must roll back.
    // ========================================================================

    struct SignInFailure<'a> {
        inner: &'a mut dyn AdmissionTx,
    }

    impl AdmissionTx for SignInFailure<'_> {
        fn member(
            &mut self,
            id: &MemberId,
        ) -> Result<Option<db::Member>, StoreError> {
            self.inner.member(id)
        }

        fn current_waiver(
            &mut self,
            id: &MemberId,
            today: NaiveDate,
        ) -> Result<Option<db::WaiverRecord>, StoreError> {
            self.inner.current_waiver(id, today)
        }

        fn current_payment(
            &mut self,
            id: &MemberId,
            today: NaiveDate,
        ) -> Result<Option<db::PaymentRecord>, StoreError> {
            self.inner.current_payment(id, today)
        }

        fn latest_warning(
            &mut self,
            id: &MemberId,
        ) -> Result<Option<db::WarningRecord>, StoreError> {
            self.inner.latest_warning(id)
        }

        fn insert_warning(
            &mut self,
            id: &MemberId,
            issued_at: DateTime<Utc>,
        ) -> Result<db::WarningRecord, StoreError> {
            self.inner.insert_warning(id, issued_at)
        }

        fn insert_sign_in(
            &mut self,
            _id: &MemberId,
            _timestamp: DateTime<Utc>,
            _admitted: bool,
        ) -> Result<db::SignInRecord, StoreError> {
            Err(StoreError::Aborted("sign-in insert failed".to_string()))
        }
    }

    struct FailingStore {
        inner: SqliteStore,
    }

    impl MembershipStore for FailingStore {
        fn with_admission_tx<T, F>(&mut self, f: F) -> Result<T, StoreError>
        where
            F: FnOnce(&mut dyn AdmissionTx) -> Result<T, StoreError>,
        {
            self.inner.with_admission_tx(|tx| {
                let mut wrapped = SignInFailure { inner: tx };
                f(&mut wrapped)
            })
        }
    }

    #[test]
    fn test_failure_after_warning_insert_rolls_back_everything() {
        let store = SqliteStore::open_in_memory().unwrap();
        let member_id = id("9");
        {
            let conn = store.connection();
            seed_member(conn, &member_id, "Ada Lovelace");
            seed_valid_waiver(conn, &member_id);
        }

        let mut engine = AdmissionEngine::new(FailingStore { inner: store });
        let result = engine.evaluate_at(&member_id, now());
        assert!(result.is_err());

        let store = engine.into_store().inner;
        let conn = store.connection();
        assert_eq!(db::warning_count(conn, &member_id).unwrap(), 0);
        assert_eq!(db::sign_in_count(conn).unwrap(), 0);
    }

    #[test]
    fn test_status_serializes_as_snake_case() {
        let outcome = AdmissionOutcome::new(
            AdmissionStatus::WarningIssued,
            Some("Ada Lovelace".to_string()),
        );

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "warning_issued");
        assert_eq!(json["name"], "Ada Lovelace");

        // Absent name is omitted, matching the wire shape
        let not_found = AdmissionOutcome::new(AdmissionStatus::NotFound, None);
        let json = serde_json::to_value(&not_found).unwrap();
        assert!(json.get("name").is_none());
    }

    #[test]
    fn test_status_strings_cover_every_variant() {
        let all = [
            (AdmissionStatus::NotFound, "not_found"),
            (AdmissionStatus::Active, "active"),
            (AdmissionStatus::NoWaiver, "no_waiver"),
            (AdmissionStatus::Inactive, "inactive"),
            (AdmissionStatus::WarningIssued, "warning_issued"),
            (AdmissionStatus::WarningActive, "warning_active"),
            (AdmissionStatus::WarningExpired, "warning_expired"),
        ];

        for (status, expected) in all {
            assert_eq!(status.as_str(), expected);
            assert!(!status.message().is_empty());
        }
    }
}
