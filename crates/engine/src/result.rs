use crate::error::{ErrorKind, ValidationError};
use crate::schema::{Assert, AssertKind, Severity};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// The id of the result reported for a rule whose selector failed.
pub const RULE_RESULT_ID: &str = "RULE";

/// The message of the result reported when execution was cancelled.
pub const CANCEL_MESSAGE: &str = "cancel";

/// The outcome of one assertion over every item its rule matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub id: String,
    pub severity: Severity,
    pub kind: AssertKind,
    pub message: String,
    /// Items the rule matched.
    pub total: usize,
    /// Items that satisfied the assertion before evaluation stopped.
    pub pass: usize,
    /// Present when the assertion failed, whatever the counts say.
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<ValidationError>,
    #[serde(serialize_with = "serialize_elapsed", rename = "elapsed_us")]
    pub elapsed: Duration,
    pub pattern: String,
    pub rule_context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl ValidationResult {
    pub(crate) fn for_assert(assert: &Assert, pattern: &str, rule_context: &str) -> Self {
        Self {
            id: assert.id().to_string(),
            severity: assert.severity(),
            kind: assert.kind(),
            message: assert.message().to_string(),
            total: 0,
            pass: 0,
            error: None,
            elapsed: Duration::ZERO,
            pattern: pattern.to_string(),
            rule_context: rule_context.to_string(),
            flag: assert.flag().map(str::to_string),
            role: assert.role().map(str::to_string),
        }
    }

    /// The synthetic fatal result of a rule whose selector could not be
    /// compiled or evaluated.
    pub(crate) fn rule_failure(
        pattern: &str,
        rule_context: &str,
        error: ValidationError,
        elapsed: Duration,
    ) -> Self {
        Self {
            id: RULE_RESULT_ID.to_string(),
            severity: Severity::Fatal,
            kind: AssertKind::Assert,
            message: error.to_string(),
            total: 0,
            pass: 0,
            error: Some(error),
            elapsed,
            pattern: pattern.to_string(),
            rule_context: rule_context.to_string(),
            flag: None,
            role: None,
        }
    }

    pub(crate) fn cancelled(assert: &Assert, pattern: &str, rule_context: &str) -> Self {
        Self {
            severity: Severity::Fatal,
            message: CANCEL_MESSAGE.to_string(),
            error: Some(ValidationError::Cancelled),
            ..Self::for_assert(assert, pattern, rule_context)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(ValidationError::kind)
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<ValidationError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

fn serialize_elapsed<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX))
}
