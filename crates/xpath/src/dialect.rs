//! Query bindings and dialects: which grammar a compiled expression may use.

use crate::ast::{Expression, LocationPath};
use crate::error::XPathError;
use std::fmt;

/// The expression language selected by a schema's query binding tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueryBinding {
    #[default]
    XPath1,
    XPath2,
}

impl QueryBinding {
    /// Maps a schema mode tag to a binding. An empty tag selects the default.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "" | "xslt" | "xslt1" | "xpath" => Some(QueryBinding::XPath1),
            "xslt2" | "xpath2" | "xslt3" | "xpath3" | "xpath31" => Some(QueryBinding::XPath2),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            QueryBinding::XPath1 => "xslt",
            QueryBinding::XPath2 => "xslt2",
        }
    }
}

impl fmt::Display for QueryBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// How much of the binding's grammar an expression may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// Everything the binding allows. Rule selectors, assertion tests and
    /// rule-level variables.
    #[default]
    Full,
    /// Context-free expressions only, for variables declared where no context
    /// item exists (schema and pattern level).
    Literal,
}

/// Rejects constructs the binding or dialect does not admit.
pub fn check(
    source: &str,
    expr: &Expression,
    binding: QueryBinding,
    dialect: Dialect,
) -> Result<(), XPathError> {
    if binding == QueryBinding::XPath1 {
        check_xpath1(source, expr)?;
    }
    if dialect == Dialect::Literal {
        check_literal(source, expr)?;
    }
    Ok(())
}

fn reject(source: &str, message: impl Into<String>) -> XPathError {
    XPathError::Dialect {
        expression: source.to_string(),
        message: message.into(),
    }
}

fn check_xpath1(source: &str, expr: &Expression) -> Result<(), XPathError> {
    let construct = match expr {
        Expression::IfExpr { .. } => Some("if/then/else"),
        Expression::Quantified { .. } => Some("quantified expressions"),
        Expression::Range { .. } => Some("the 'to' range operator"),
        Expression::Sequence(_) => Some("sequence constructors"),
        Expression::BinaryOp { op, .. } if op.is_value_comparison() => {
            Some("value comparisons (eq, ne, lt, le, gt, ge)")
        }
        _ => None,
    };
    if let Some(construct) = construct {
        return Err(reject(
            source,
            format!("{} require the xslt2 query binding", construct),
        ));
    }
    expr.for_each_child(|child, _| check_xpath1(source, child))
}

// Predicates get their own context item, so they are not inspected.
fn check_literal(source: &str, expr: &Expression) -> Result<(), XPathError> {
    match expr {
        Expression::LocationPath(LocationPath {
            start_point: None,
            is_absolute: false,
            ..
        }) => {
            return Err(reject(
                source,
                "relative paths need a context item and are not allowed in this declaration",
            ));
        }
        Expression::FunctionCall { name, .. } => {
            let local = name.strip_prefix("fn:").unwrap_or(name);
            if matches!(local, "position" | "last" | "current") {
                return Err(reject(
                    source,
                    format!("{}() needs a context and is not allowed in this declaration", local),
                ));
            }
        }
        _ => {}
    }
    expr.for_each_child(|child, is_predicate| {
        if is_predicate {
            Ok(())
        } else {
            check_literal(source, child)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn run(source: &str, binding: QueryBinding, dialect: Dialect) -> Result<(), XPathError> {
        let expr = parse_expression(source)?;
        check(source, &expr, binding, dialect)
    }

    #[test]
    fn test_binding_tags() {
        assert_eq!(QueryBinding::from_tag("xslt"), Some(QueryBinding::XPath1));
        assert_eq!(QueryBinding::from_tag(""), Some(QueryBinding::XPath1));
        assert_eq!(QueryBinding::from_tag("XSLT2"), Some(QueryBinding::XPath2));
        assert_eq!(QueryBinding::from_tag("xpath31"), Some(QueryBinding::XPath2));
        assert_eq!(QueryBinding::from_tag("exslt"), None);
    }

    #[test]
    fn test_xpath1_rejects_xpath2_constructs() {
        for source in [
            "if (@a) then 1 else 2",
            "some $i in item satisfies $i/@qty > 0",
            "count(1 to 3)",
            "@a eq 'x'",
            "count((1, 2))",
        ] {
            let err = run(source, QueryBinding::XPath1, Dialect::Full).unwrap_err();
            assert!(matches!(err, XPathError::Dialect { .. }), "{source}");
            assert!(run(source, QueryBinding::XPath2, Dialect::Full).is_ok(), "{source}");
        }
    }

    #[test]
    fn test_literal_dialect_rejects_context_dependence() {
        for source in ["item", ".", "..", "position()", "last() + 1", "count(@qty)"] {
            let err = run(source, QueryBinding::XPath1, Dialect::Literal).unwrap_err();
            assert!(err.is_compile_error(), "{source}");
        }
        for source in ["0", "'abc'", "count(//item)", "//item[position() = 1]", "$other * 2"] {
            assert!(run(source, QueryBinding::XPath1, Dialect::Literal).is_ok(), "{source}");
        }
    }
}
