//! Lazy execution of a whole schema against a document.

use crate::cancel::CancellationToken;
use crate::config::ExecutionOptions;
use crate::error::ValidationError;
use crate::result::ValidationResult;
use crate::rule::RuleExecution;
use crate::schema::{Assert, Pattern, Rule, Schema, Severity};
use schematic_xpath::DataSourceNode;
use std::time::{Duration, Instant};

/// An ordered, pull-based stream of results: patterns in order, rules in
/// order, assertions in order. Nothing is evaluated until it is pulled, and
/// dropping the iterator stops the execution.
pub struct SchemaExecution<'s, 'a, N: DataSourceNode<'a>, F> {
    schema: &'s Schema,
    root: N,
    filter: F,
    cancellation: CancellationToken,
    max_depth: usize,
    stop_on_first_failure: bool,
    rules: std::vec::IntoIter<(&'s Pattern, &'s Rule)>,
    current: Option<RuleExecution<'s, 'a, N>>,
    halted: bool,
}

impl<'s, 'a, N, F> SchemaExecution<'s, 'a, N, F>
where
    N: DataSourceNode<'a> + 'a,
    F: Fn(&Assert) -> bool,
{
    pub fn new(
        schema: &'s Schema,
        root: N,
        filter: F,
        options: &ExecutionOptions,
        cancellation: CancellationToken,
    ) -> Result<Self, ValidationError> {
        options.validate()?;
        let patterns = schema.active_patterns(options.selected_phase())?;
        Ok(Self::start(schema, patterns, root, filter, options, cancellation))
    }

    fn start(
        schema: &'s Schema,
        patterns: Vec<&'s Pattern>,
        root: N,
        filter: F,
        options: &ExecutionOptions,
        cancellation: CancellationToken,
    ) -> Self {
        log::debug!(
            "Executing schema '{}' with {} of {} pattern(s)",
            schema.title(),
            patterns.len(),
            schema.patterns().len()
        );
        let rules: Vec<_> = patterns
            .into_iter()
            .flat_map(|pattern| pattern.rules().iter().map(move |rule| (pattern, rule)))
            .collect();
        Self {
            schema,
            root,
            filter,
            cancellation,
            max_depth: options.max_depth,
            stop_on_first_failure: options.stop_on_first_failure,
            rules: rules.into_iter(),
            current: None,
            halted: false,
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl<'s, 'a, N, F> Iterator for SchemaExecution<'s, 'a, N, F>
where
    N: DataSourceNode<'a> + 'a,
    F: Fn(&Assert) -> bool,
{
    type Item = ValidationResult;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.halted {
                return None;
            }
            if let Some(rule) = self.current.as_mut() {
                if let Some(result) = rule.next_result(&self.filter, &self.cancellation) {
                    if self.stop_on_first_failure
                        && result.is_failed()
                        && result.severity == Severity::Fatal
                    {
                        log::debug!("Stopping after first fatal failure '{}'", result.id);
                        self.halted = true;
                    }
                    return Some(result);
                }
                self.current = None;
            }
            let (pattern, rule) = self.rules.next()?;
            self.current = Some(RuleExecution::new(
                self.schema,
                pattern,
                rule,
                self.root,
                self.max_depth,
            ));
        }
    }
}

/// Executes every pattern of `schema` against the document rooted at `root`,
/// yielding a result for each assertion accepted by `filter`.
pub fn execute<'s, 'a, N, F>(schema: &'s Schema, root: N, filter: F) -> SchemaExecution<'s, 'a, N, F>
where
    N: DataSourceNode<'a> + 'a,
    F: Fn(&Assert) -> bool,
{
    SchemaExecution::start(
        schema,
        schema.patterns().iter().collect(),
        root,
        filter,
        &ExecutionOptions::default(),
        CancellationToken::new(),
    )
}

/// Every assertion of the schema, in execution order. For a schema whose
/// rule contexts all compile this is exactly what an unfiltered execution
/// reports on, whatever the document.
pub fn list_assertions(schema: &Schema) -> Vec<&Assert> {
    schema
        .patterns()
        .iter()
        .flat_map(Pattern::rules)
        .flat_map(Rule::asserts)
        .collect()
}

/// Configures and runs executions of one schema.
#[derive(Debug, Clone)]
pub struct Validator<'s> {
    schema: &'s Schema,
    options: ExecutionOptions,
    cancellation: CancellationToken,
}

impl<'s> Validator<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            options: ExecutionOptions::default(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.options.phase = Some(phase.into());
        self
    }

    /// Executions observe this token; cancelling it from elsewhere stops them.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.cancellation = self.cancellation.with_deadline(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Starts a lazy execution. An unknown phase or invalid options are
    /// reported here, before any result is produced.
    pub fn execute<'a, N, F>(&self, root: N, filter: F) -> Result<SchemaExecution<'s, 'a, N, F>, ValidationError>
    where
        N: DataSourceNode<'a> + 'a,
        F: Fn(&Assert) -> bool,
    {
        SchemaExecution::new(self.schema, root, filter, &self.options, self.cancellation.clone())
    }

    /// Runs an execution to completion.
    pub fn validate<'a, N, F>(&self, root: N, filter: F) -> Result<Vec<ValidationResult>, ValidationError>
    where
        N: DataSourceNode<'a> + 'a,
        F: Fn(&Assert) -> bool,
    {
        Ok(self.execute(root, filter)?.collect())
    }
}
