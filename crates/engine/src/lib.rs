//! Schema and rule execution for the schematic validator.
//!
//! A [`Schema`] groups patterns of rules; each rule selects document nodes and
//! checks its assertions against every one of them. Executing a schema yields
//! one [`ValidationResult`] per assertion, lazily and in schema order.

pub mod cancel;
pub mod config;
pub mod error;
pub mod execute;
pub mod filter;
pub mod message;
pub mod result;
pub mod rule;
pub mod schema;

pub use cancel::CancellationToken;
pub use config::{ALL_PHASES, ExecutionOptions};
pub use error::{ErrorKind, ValidationError};
pub use execute::{SchemaExecution, Validator, execute, list_assertions};
pub use message::{MessagePart, MessageTemplate};
pub use result::{CANCEL_MESSAGE, RULE_RESULT_ID, ValidationResult};
pub use rule::{RuleExecution, execute_rule};
pub use schema::{Assert, AssertKind, Pattern, Phase, Rule, Schema, Severity};
