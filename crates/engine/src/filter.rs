//! Ready-made assertion filters. Any `Fn(&Assert) -> bool` works as a filter.

use crate::schema::{Assert, Severity};

/// Accepts every assertion.
pub fn all() -> impl Fn(&Assert) -> bool + Copy {
    |_| true
}

/// Rejects every assertion.
pub fn none() -> impl Fn(&Assert) -> bool + Copy {
    |_| false
}

pub fn by_id_prefix(prefix: impl Into<String>) -> impl Fn(&Assert) -> bool {
    let prefix = prefix.into();
    move |assert| assert.id().starts_with(&prefix)
}

/// Accepts assertions of the given severities.
pub fn by_severity(severities: &[Severity]) -> impl Fn(&Assert) -> bool {
    let severities = severities.to_vec();
    move |assert| severities.contains(&assert.severity())
}
