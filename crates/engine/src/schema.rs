//! The in-memory schema graph: schema, patterns, rules and assertions.
//!
//! Patterns are created by their schema and rules by their pattern, so every
//! rule's environment encloses the environment of the pattern that owns it,
//! which in turn encloses the schema's.

use crate::error::ValidationError;
use crate::message::MessageTemplate;
use schematic_xpath::{
    CompiledExpression, Dialect, Environment, QueryBinding, UserFunction, XPathError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Fatal,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Fatal => "fatal",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fatal" | "error" => Ok(Severity::Fatal),
            "warning" | "warn" => Ok(Severity::Warning),
            "info" | "information" => Ok(Severity::Info),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Whether an assertion fails when its test is false or when it is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertKind {
    #[default]
    Assert,
    Report,
}

pub struct Schema {
    title: String,
    binding: QueryBinding,
    environment: Arc<Environment>,
    patterns: Vec<Pattern>,
    phases: Vec<Phase>,
    namespaces: HashMap<String, String>,
}

impl Schema {
    /// Creates an empty schema. `mode` is the query binding tag; an unknown tag
    /// is a structural error.
    pub fn new(title: impl Into<String>, mode: &str) -> Result<Self, ValidationError> {
        let binding = QueryBinding::from_tag(mode)
            .ok_or_else(|| ValidationError::UnknownQueryBinding(mode.to_string()))?;
        Ok(Self {
            title: title.into(),
            binding,
            environment: Arc::new(Environment::new()),
            patterns: Vec::new(),
            phases: Vec::new(),
            namespaces: HashMap::new(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn binding(&self) -> QueryBinding {
        self.binding
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn namespaces(&self) -> &HashMap<String, String> {
        &self.namespaces
    }

    /// Declares a schema-level variable. The value may not depend on a context item.
    pub fn define_let(&self, name: &str, value: &str) -> Result<(), ValidationError> {
        define_let(&self.environment, self.binding, Dialect::Literal, name, value)
    }

    pub fn define_function(&self, function: UserFunction) {
        self.environment.define_function(function);
    }

    pub fn add_namespace(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.namespaces.insert(prefix.into(), uri.into());
    }

    /// Appends a new pattern and returns it for further building.
    pub fn add_pattern(&mut self, id: impl Into<String>) -> Result<&mut Pattern, ValidationError> {
        let id = id.into();
        if self.pattern(&id).is_some() {
            return Err(ValidationError::DuplicatePattern(id));
        }
        let pattern = Pattern {
            id,
            title: None,
            binding: self.binding,
            environment: Arc::new(Environment::enclosed(&self.environment)),
            rules: Vec::new(),
        };
        self.patterns.push(pattern);
        let index = self.patterns.len() - 1;
        Ok(&mut self.patterns[index])
    }

    pub fn pattern(&self, id: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|pattern| pattern.id == id)
    }

    /// Declares a named subset of patterns. Every listed pattern must already exist.
    pub fn add_phase<I, S>(&mut self, id: impl Into<String>, active: I) -> Result<(), ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        if self.phase(&id).is_some() {
            return Err(ValidationError::DuplicatePhase(id));
        }
        let active: Vec<String> = active.into_iter().map(Into::into).collect();
        if let Some(missing) = active.iter().find(|pattern| self.pattern(pattern).is_none()) {
            return Err(ValidationError::UnknownPhasePattern {
                phase: id,
                pattern: missing.clone(),
            });
        }
        self.phases.push(Phase { id, active });
        Ok(())
    }

    pub fn phase(&self, id: &str) -> Option<&Phase> {
        self.phases.iter().find(|phase| phase.id == id)
    }

    /// The patterns a phase runs, in schema order. `None` runs every pattern.
    pub fn active_patterns(&self, phase: Option<&str>) -> Result<Vec<&Pattern>, ValidationError> {
        let Some(phase_id) = phase else {
            return Ok(self.patterns.iter().collect());
        };
        let phase = self
            .phase(phase_id)
            .ok_or_else(|| ValidationError::UnknownPhase(phase_id.to_string()))?;
        Ok(self
            .patterns
            .iter()
            .filter(|pattern| phase.active.contains(&pattern.id))
            .collect())
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("title", &self.title)
            .field("binding", &self.binding)
            .field("patterns", &self.patterns)
            .field("phases", &self.phases)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub id: String,
    pub active: Vec<String>,
}

#[derive(Debug)]
pub struct Pattern {
    id: String,
    title: Option<String>,
    binding: QueryBinding,
    environment: Arc<Environment>,
    rules: Vec<Rule>,
}

impl Pattern {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> &mut Self {
        self.title = Some(title.into());
        self
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Declares a pattern-level variable. The value may not depend on a context item.
    pub fn define_let(&self, name: &str, value: &str) -> Result<(), ValidationError> {
        define_let(&self.environment, self.binding, Dialect::Literal, name, value)
    }

    pub fn define_function(&self, function: UserFunction) {
        self.environment.define_function(function);
    }

    /// Appends a rule selecting `context`. The selector is compiled on first
    /// execution; a selector that does not compile is reported then.
    pub fn add_rule(&mut self, context: impl Into<String>) -> &mut Rule {
        self.rules.push(Rule {
            id: None,
            context: context.into(),
            binding: self.binding,
            environment: Arc::new(Environment::enclosed(&self.environment)),
            asserts: Vec::new(),
            selector: OnceLock::new(),
        });
        let index = self.rules.len() - 1;
        &mut self.rules[index]
    }
}

#[derive(Debug)]
pub struct Rule {
    id: Option<String>,
    context: String,
    binding: QueryBinding,
    environment: Arc<Environment>,
    asserts: Vec<Assert>,
    selector: OnceLock<Result<CompiledExpression, XPathError>>,
}

impl Rule {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.id = Some(id.into());
        self
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    pub fn asserts(&self) -> &[Assert] {
        &self.asserts
    }

    /// Declares a rule-level variable, evaluated against each matched item.
    pub fn define_let(&self, name: &str, value: &str) -> Result<(), ValidationError> {
        define_let(&self.environment, self.binding, Dialect::Full, name, value)
    }

    pub fn define_function(&self, function: UserFunction) {
        self.environment.define_function(function);
    }

    /// Adds an assertion that fails for items where `test` is false.
    pub fn add_assert(
        &mut self,
        id: impl Into<String>,
        severity: Severity,
        test: impl Into<String>,
        message: impl Into<MessageTemplate>,
    ) -> &mut Assert {
        self.push_assert(AssertKind::Assert, id.into(), severity, test.into(), message.into())
    }

    /// Adds a report: an assertion that fails for items where `test` is true.
    pub fn add_report(
        &mut self,
        id: impl Into<String>,
        severity: Severity,
        test: impl Into<String>,
        message: impl Into<MessageTemplate>,
    ) -> &mut Assert {
        self.push_assert(AssertKind::Report, id.into(), severity, test.into(), message.into())
    }

    fn push_assert(
        &mut self,
        kind: AssertKind,
        id: String,
        severity: Severity,
        test: String,
        message: MessageTemplate,
    ) -> &mut Assert {
        self.asserts.push(Assert {
            id,
            kind,
            severity,
            test,
            message,
            flag: None,
            role: None,
            binding: self.binding,
            compiled: OnceLock::new(),
        });
        let index = self.asserts.len() - 1;
        &mut self.asserts[index]
    }

    pub(crate) fn selector(&self) -> Result<&CompiledExpression, XPathError> {
        self.selector
            .get_or_init(|| CompiledExpression::compile_selector(&self.context, self.binding))
            .as_ref()
            .map_err(Clone::clone)
    }
}

#[derive(Debug)]
pub struct Assert {
    id: String,
    kind: AssertKind,
    severity: Severity,
    test: String,
    message: MessageTemplate,
    flag: Option<String>,
    role: Option<String>,
    binding: QueryBinding,
    compiled: OnceLock<Result<CompiledExpression, XPathError>>,
}

impl Assert {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> AssertKind {
        self.kind
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn test(&self) -> &str {
        &self.test
    }

    pub fn message(&self) -> &MessageTemplate {
        &self.message
    }

    pub fn flag(&self) -> Option<&str> {
        self.flag.as_deref()
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn set_flag(&mut self, flag: impl Into<String>) -> &mut Self {
        self.flag = Some(flag.into());
        self
    }

    pub fn set_role(&mut self, role: impl Into<String>) -> &mut Self {
        self.role = Some(role.into());
        self
    }

    pub(crate) fn binding(&self) -> QueryBinding {
        self.binding
    }

    pub(crate) fn compiled_test(&self) -> Result<&CompiledExpression, XPathError> {
        self.compiled
            .get_or_init(|| CompiledExpression::compile(&self.test, self.binding, Dialect::Full))
            .as_ref()
            .map_err(Clone::clone)
    }
}

fn define_let(
    environment: &Environment,
    binding: QueryBinding,
    dialect: Dialect,
    name: &str,
    value: &str,
) -> Result<(), ValidationError> {
    let compiled =
        CompiledExpression::compile(value, binding, dialect).map_err(ValidationError::Compile)?;
    environment.define(name, compiled);
    Ok(())
}
