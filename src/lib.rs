// Admission Desk - Core Library
// Exposes all modules for use in the CLI, API server, and tests

pub mod db;
pub mod engine;
pub mod identifier;
pub mod registration;
pub mod store;
pub mod terms;

// Re-export commonly used types
pub use db::{
    attendance_on, setup_database, sign_in_count, sign_ins_for_member,
    AttendanceEntry, Member, PaymentRecord, SignInRecord, WaiverRecord, WarningRecord,
};
pub use engine::{
    AdmissionEngine, AdmissionOutcome, AdmissionStatus, WARNING_GRACE_HOURS,
};
pub use identifier::{IdError, MemberId, ID_WIDTH};
pub use registration::{
    record_payment, record_waiver, upsert_member, MemberChange, RegistrationError,
};
pub use store::{AdmissionTx, MembershipStore, SqliteStore, StoreError};
pub use terms::{
    add_payment_term, add_waiver_term, current_payment_terms, current_waiver_terms,
    payment_term, waiver_term, PaymentTerm, WaiverTerm,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
