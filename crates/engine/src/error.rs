use schematic_xpath::XPathError;
use thiserror::Error;

/// Broad classes of failure, used by reports to group results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The schema graph itself is inconsistent. Raised while building it.
    Structural,
    /// An expression did not compile.
    Compile,
    /// An expression compiled but could not be evaluated.
    Resolution,
    /// A document item did not satisfy an assertion.
    Assertion,
    Cancellation,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Unknown query binding '{0}'")]
    UnknownQueryBinding(String),

    #[error("Duplicate pattern id '{0}'")]
    DuplicatePattern(String),

    #[error("Duplicate phase id '{0}'")]
    DuplicatePhase(String),

    #[error("Phase '{phase}' references unknown pattern '{pattern}'")]
    UnknownPhasePattern { phase: String, pattern: String },

    #[error("Unknown phase '{0}'")]
    UnknownPhase(String),

    #[error("Invalid execution options: {0}")]
    Options(String),

    #[error("Compile error: {0}")]
    Compile(#[source] XPathError),

    #[error("{message}: {source}")]
    Evaluation {
        message: String,
        #[source]
        source: XPathError,
    },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Execution cancelled")]
    Cancelled,
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::UnknownQueryBinding(_)
            | ValidationError::DuplicatePattern(_)
            | ValidationError::DuplicatePhase(_)
            | ValidationError::UnknownPhasePattern { .. }
            | ValidationError::UnknownPhase(_)
            | ValidationError::Options(_) => ErrorKind::Structural,
            ValidationError::Compile(_) => ErrorKind::Compile,
            ValidationError::Evaluation { .. } => ErrorKind::Resolution,
            ValidationError::Assertion(_) => ErrorKind::Assertion,
            ValidationError::Cancelled => ErrorKind::Cancellation,
        }
    }

    /// Wraps an expression error, keeping compile errors apart from runtime ones.
    pub fn from_xpath(message: impl Into<String>, error: XPathError) -> Self {
        if error.is_compile_error() {
            ValidationError::Compile(error)
        } else {
            ValidationError::Evaluation {
                message: message.into(),
                source: error,
            }
        }
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(e: serde_json::Error) -> Self {
        ValidationError::Options(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xpath_errors_are_classified() {
        let compile = ValidationError::from_xpath(
            "qty check",
            XPathError::XPathParse("@qty >".into(), "unexpected end".into()),
        );
        assert_eq!(compile.kind(), ErrorKind::Compile);

        let runtime =
            ValidationError::from_xpath("qty check", XPathError::UnknownVariable("limit".into()));
        assert_eq!(runtime.kind(), ErrorKind::Resolution);
        assert_eq!(runtime.to_string(), "qty check: Variable 'limit' not found");
    }
}
