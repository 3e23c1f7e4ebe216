// Member Identifier - fixed-width numeric key
// Every record in the system is keyed by a 10-digit, left-zero-padded
// member identifier. Free-form input (badge scans, keyboard entry) is
// normalized here before anything downstream sees it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of the canonical identifier
pub const ID_WIDTH: usize = 10;

// ============================================================================
// ERRORS
// ============================================================================

/// Rejection reasons for malformed identifier input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// Input was empty after trimming
    Empty,
    /// Input contained a character outside 0-9
    NonDigit(char),
    /// Input was longer than the canonical width
    TooLong(usize),
    /// Input was not exactly the canonical width (strict parse only)
    WrongWidth(usize),
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdError::Empty => write!(f, "identifier is empty"),
            IdError::NonDigit(c) => write!(f, "identifier contains non-digit character '{}'", c),
            IdError::TooLong(len) => write!(
                f,
                "identifier has {} digits, cannot be longer than {}",
                len, ID_WIDTH
            ),
            IdError::WrongWidth(len) => write!(
                f,
                "identifier has {} characters, expected exactly {}",
                len, ID_WIDTH
            ),
        }
    }
}

impl std::error::Error for IdError {}

// ============================================================================
// MEMBER ID
// ============================================================================

/// Canonical 10-digit member identifier
///
/// Construction goes through `normalize` (free-form input, pads short
/// entries) or `parse` (already-canonical input only). The inner string is
/// guaranteed to be exactly 10 ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    /// Normalize free-form input to the canonical form.
    ///
    /// Trims surrounding whitespace, requires 1..=10 ASCII digits, and
    /// left-pads with zeros. `"42"` becomes `"0000000042"`.
    pub fn normalize(input: &str) -> Result<Self, IdError> {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return Err(IdError::Empty);
        }
        if let Some(c) = trimmed.chars().find(|c| !c.is_ascii_digit()) {
            return Err(IdError::NonDigit(c));
        }
        if trimmed.len() > ID_WIDTH {
            return Err(IdError::TooLong(trimmed.len()));
        }

        Ok(MemberId(format!("{:0>width$}", trimmed, width = ID_WIDTH)))
    }

    /// Parse an identifier that must already be in canonical form.
    ///
    /// This is the shape the decision engine requires; anything shorter or
    /// longer is rejected rather than padded.
    pub fn parse(input: &str) -> Result<Self, IdError> {
        if input.len() != ID_WIDTH {
            return Err(IdError::WrongWidth(input.len()));
        }
        if let Some(c) = input.chars().find(|c| !c.is_ascii_digit()) {
            return Err(IdError::NonDigit(c));
        }

        Ok(MemberId(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// TESTS
// ============================================================================
