//! Expression substrate for the schematic rule engine.
//!
//! A small XPath-flavoured language evaluated over any tree that implements
//! [`DataSourceNode`]. Values flow as [`Sequence`]s of [`Item`]s, names resolve
//! through a chain of [`Environment`]s, and expressions are compiled once into
//! a [`CompiledExpression`] under a [`QueryBinding`] and [`Dialect`].
//!
//! ```ignore
//! use schematic_xpath::{CompiledExpression, Dialect, Environment, EvaluationContext,
//!     Item, QueryBinding, Scope, XmlDocument};
//!
//! let doc = XmlDocument::parse("<order><item qty='5'/></order>")?;
//! let root = doc.root_node();
//! let env = Environment::new();
//! let namespaces = Default::default();
//! let expr = CompiledExpression::compile("count(//item)", QueryBinding::XPath1, Dialect::Full)?;
//! let ctx = EvaluationContext::new(Item::Node(root), root, Scope::Environment(&env), &namespaces);
//! assert_eq!(expr.evaluate(&ctx)?.to_number(), 1.0);
//! ```

pub mod ast;
pub mod axes;
pub mod datasource;
pub mod dialect;
pub mod engine;
pub mod environment;
pub mod error;
pub mod functions;
pub mod item;
pub mod operators;
pub mod parser;

pub use ast::{Axis, BinaryOperator, Expression, LocationPath, NameTest, NodeTest, Step};
pub use datasource::xml::{XmlDocument, XmlNode};
pub use datasource::{DataSourceNode, NodeType, QName};
pub use dialect::{Dialect, QueryBinding};
pub use engine::{CompiledExpression, DEFAULT_MAX_DEPTH, EvaluationContext, evaluate};
pub use environment::{
    Binding, Callable, Environment, Frame, FunctionStatement, Param, Scope, UserFunction,
};
pub use functions::Builtin;
pub use item::{AtomicValue, Item, Sequence};

// Re-export test utilities for integration testing in downstream crates
pub use datasource::tests;
pub use error::XPathError;
pub use parser::parse_expression;
