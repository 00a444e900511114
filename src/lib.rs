//! Schematron-style validation of XML documents.
//!
//! Build a [`Schema`] of patterns, rules and assertions, then run it against a
//! document. Results arrive lazily, one per assertion, in schema order.
//!
//! ```ignore
//! use schematic::{Schema, Severity, filter, validate_str};
//!
//! let mut schema = Schema::new("Orders", "xslt")?;
//! schema.define_let("threshold", "0")?;
//! schema
//!     .add_pattern("quantities")?
//!     .add_rule("item")
//!     .add_assert("qty-positive", Severity::Fatal, "@qty > $threshold", "Quantity {@qty} must be positive");
//!
//! let results = validate_str(&schema, "<order><item qty='3'/></order>", filter::all())?;
//! assert!(results[0].is_ok());
//! ```

pub mod error;
pub mod summary;

pub use error::Error;
pub use summary::ValidationSummary;

pub use schematic_engine::{
    ALL_PHASES, Assert, AssertKind, CANCEL_MESSAGE, CancellationToken, ErrorKind, ExecutionOptions,
    MessagePart, MessageTemplate, Pattern, Phase, RULE_RESULT_ID, Rule, RuleExecution, Schema,
    SchemaExecution, Severity, ValidationError, ValidationResult, Validator, execute, execute_rule,
    filter, list_assertions,
};
pub use schematic_xpath::{
    CompiledExpression, DataSourceNode, Dialect, Environment, QueryBinding, UserFunction,
    XPathError, XmlDocument, XmlNode,
};

/// The expression substrate, for callers that evaluate expressions directly.
pub use schematic_xpath as xpath;

/// Parses `xml` and runs every pattern of `schema` against it.
pub fn validate_str<F>(schema: &Schema, xml: &str, filter: F) -> Result<Vec<ValidationResult>, Error>
where
    F: Fn(&Assert) -> bool,
{
    validate_str_with(&Validator::new(schema), xml, filter)
}

/// Parses `xml` and runs a configured validator against it.
pub fn validate_str_with<F>(
    validator: &Validator<'_>,
    xml: &str,
    filter: F,
) -> Result<Vec<ValidationResult>, Error>
where
    F: Fn(&Assert) -> bool,
{
    let document = XmlDocument::parse(xml)?;
    let results = validator.validate(document.root_node(), filter)?;
    log::debug!("Validation produced {} result(s)", results.len());
    Ok(results)
}
