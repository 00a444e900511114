use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XPathError {
    #[error("XPath parse error in '{0}': {1}")]
    XPathParse(String, String),

    #[error("Expression '{expression}' is not allowed here: {message}")]
    Dialect { expression: String, message: String },

    #[error("Function '{function}' error: {message}")]
    FunctionError { function: String, message: String },

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("Function '{function}' expects {expected} argument(s), got {actual}")]
    Arity {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Variable '{0}' not found")]
    UnknownVariable(String),

    #[error("Namespace prefix '{0}' is not declared")]
    UnknownPrefix(String),

    #[error("Context node required")]
    NoContextNode,

    #[error("Evaluation exceeded the maximum depth of {0}")]
    DepthExceeded(usize),
}

impl XPathError {
    pub fn function(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FunctionError {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn arity(function: impl Into<String>, expected: impl Into<String>, actual: usize) -> Self {
        Self::Arity {
            function: function.into(),
            expected: expected.into(),
            actual,
        }
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError(message.into())
    }

    /// True for errors raised while compiling an expression, as opposed to
    /// errors raised while evaluating one.
    pub fn is_compile_error(&self) -> bool {
        matches!(self, Self::XPathParse(..) | Self::Dialect { .. })
    }
}
