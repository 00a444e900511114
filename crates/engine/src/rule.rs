//! Runs the assertions of one rule over the items its selector matches.

use crate::cancel::CancellationToken;
use crate::error::ValidationError;
use crate::result::ValidationResult;
use crate::schema::{Assert, AssertKind, Pattern, Rule, Schema};
use schematic_xpath::{CompiledExpression, DataSourceNode, EvaluationContext, Item, Scope};
use std::marker::PhantomData;
use std::time::Instant;

/// The execution of a single rule, producing one result per accepted assertion.
///
/// The rule is prepared when the first accepted assertion is reached, so a
/// rule whose assertions are all filtered out costs nothing. Preparing compiles
/// the selector and every accepted test, then selects the items; any failure
/// there ends the rule with a single `RULE` result.
pub struct RuleExecution<'s, 'a, N: DataSourceNode<'a>> {
    schema: &'s Schema,
    pattern: &'s Pattern,
    rule: &'s Rule,
    root: N,
    max_depth: usize,
    items: Option<Vec<N>>,
    next_assert: usize,
    finished: bool,
    _marker: PhantomData<&'a ()>,
}

impl<'s, 'a, N> RuleExecution<'s, 'a, N>
where
    N: DataSourceNode<'a> + 'a,
{
    pub fn new(schema: &'s Schema, pattern: &'s Pattern, rule: &'s Rule, root: N, max_depth: usize) -> Self {
        Self {
            schema,
            pattern,
            rule,
            root,
            max_depth,
            items: None,
            next_assert: 0,
            finished: false,
            _marker: PhantomData,
        }
    }

    /// Produces the result of the next assertion accepted by `filter`, or `None`
    /// once the rule is done. A rule ends early when it cannot be prepared or
    /// cancellation is observed.
    pub fn next_result(
        &mut self,
        filter: &dyn Fn(&Assert) -> bool,
        cancellation: &CancellationToken,
    ) -> Option<ValidationResult> {
        if self.finished {
            return None;
        }
        let rule = self.rule;
        while let Some(assert) = rule.asserts().get(self.next_assert) {
            self.next_assert += 1;
            if !filter(assert) {
                log::trace!("Assertion '{}' rejected by filter", assert.id());
                continue;
            }
            if cancellation.is_cancelled() {
                log::warn!(
                    "Execution cancelled at assertion '{}' of rule '{}'",
                    assert.id(),
                    rule.context()
                );
                self.finished = true;
                return Some(ValidationResult::cancelled(
                    assert,
                    self.pattern.id(),
                    rule.context(),
                ));
            }
            if self.items.is_none() {
                let started = Instant::now();
                match self.prepare(filter) {
                    Ok(items) => {
                        log::debug!(
                            "Rule '{}' in pattern '{}' matched {} item(s)",
                            rule.context(),
                            self.pattern.id(),
                            items.len()
                        );
                        self.items = Some(items);
                    }
                    Err(error) => {
                        log::warn!("Rule '{}' could not be prepared: {}", rule.context(), error);
                        self.finished = true;
                        return Some(ValidationResult::rule_failure(
                            self.pattern.id(),
                            rule.context(),
                            error,
                            started.elapsed(),
                        ));
                    }
                }
            }
            let items = self.items.as_deref().unwrap_or_default();
            return Some(self.evaluate_assertion(assert, items));
        }
        self.finished = true;
        None
    }

    fn prepare(&self, filter: &dyn Fn(&Assert) -> bool) -> Result<Vec<N>, ValidationError> {
        let selector = self.rule.selector().map_err(ValidationError::Compile)?;
        for assert in self.rule.asserts().iter().filter(|assert| filter(*assert)) {
            assert.compiled_test().map_err(ValidationError::Compile)?;
        }
        self.select_items(selector)
    }

    /// Evaluates the selector from the document root: distinct nodes in document order.
    fn select_items(&self, selector: &CompiledExpression) -> Result<Vec<N>, ValidationError> {
        let ctx = EvaluationContext::new(
            Item::Node(self.root),
            self.root,
            Scope::Environment(self.rule.environment().as_ref()),
            self.schema.namespaces(),
        )
        .with_max_depth(self.max_depth);
        let wrap = |e| ValidationError::from_xpath(format!("Rule context '{}'", self.rule.context()), e);
        let mut nodes = selector.evaluate(&ctx).map_err(wrap)?.into_nodes().map_err(wrap)?;
        nodes.sort();
        nodes.dedup();
        Ok(nodes)
    }

    fn evaluate_assertion(&self, assert: &Assert, items: &[N]) -> ValidationResult {
        let started = Instant::now();
        let mut result = ValidationResult::for_assert(assert, self.pattern.id(), self.rule.context());
        result.total = items.len();

        match self.first_failure(assert, items) {
            Ok(None) => result.pass = items.len(),
            Ok(Some((index, message))) => {
                result.pass = index;
                result.error = Some(ValidationError::Assertion(message.clone()));
                result.message = message;
            }
            Err(error) => {
                result.pass = 0;
                result.error = Some(error);
            }
        }
        result.elapsed = started.elapsed();
        log::trace!(
            "Assertion '{}': {}/{} passed{}",
            assert.id(),
            result.pass,
            result.total,
            if result.is_failed() { ", failed" } else { "" }
        );
        result
    }

    /// Walks the items in order and stops at the first one that does not
    /// satisfy the assertion, returning its index and rendered message.
    fn first_failure(
        &self,
        assert: &Assert,
        items: &[N],
    ) -> Result<Option<(usize, String)>, ValidationError> {
        let test = assert.compiled_test().map_err(ValidationError::Compile)?;
        let size = items.len();
        for (index, node) in items.iter().enumerate() {
            let ctx = EvaluationContext::new(
                Item::Node(*node),
                self.root,
                Scope::Environment(self.rule.environment().as_ref()),
                self.schema.namespaces(),
            )
            .with_position(index + 1, size)
            .with_max_depth(self.max_depth);

            let holds = test
                .evaluate(&ctx)
                .map_err(|e| ValidationError::from_xpath(assert.message().to_string(), e))?
                .effective_boolean_value();
            let satisfied = match assert.kind() {
                AssertKind::Assert => holds,
                AssertKind::Report => !holds,
            };
            if !satisfied {
                return Ok(Some((index, assert.message().render(&ctx, assert.binding()))));
            }
        }
        Ok(None)
    }
}

/// Runs one rule to completion.
pub fn execute_rule<'a, N, F>(
    schema: &Schema,
    pattern: &Pattern,
    rule: &Rule,
    root: N,
    filter: F,
    cancellation: &CancellationToken,
) -> Vec<ValidationResult>
where
    N: DataSourceNode<'a> + 'a,
    F: Fn(&Assert) -> bool,
{
    let mut execution = RuleExecution::new(schema, pattern, rule, root, schematic_xpath::DEFAULT_MAX_DEPTH);
    std::iter::from_fn(|| execution.next_result(&filter, cancellation)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::filter;
    use crate::schema::Severity;
    use schematic_xpath::XmlDocument;

    const ORDER: &str = r#"<order><item qty="5"/><item qty="-1"/><item qty="7"/></order>"#;

    fn run(schema: &Schema, xml: &str) -> Vec<ValidationResult> {
        let doc = XmlDocument::parse(xml).unwrap();
        let pattern = &schema.patterns()[0];
        let rule = &pattern.rules()[0];
        execute_rule(
            schema,
            pattern,
            rule,
            doc.root_node(),
            filter::all(),
            &CancellationToken::new(),
        )
    }

    fn single_assert(selector: &str, kind: AssertKind, test: &str) -> Schema {
        let mut schema = Schema::new("orders", "xslt").unwrap();
        let rule = schema.add_pattern("p").unwrap().add_rule(selector);
        match kind {
            AssertKind::Assert => rule.add_assert("a1", Severity::Fatal, test, "Quantity {@qty} is not positive"),
            AssertKind::Report => rule.add_report("a1", Severity::Warning, test, "Quantity {@qty} reported"),
        };
        schema
    }

    #[test]
    fn test_stops_at_first_failing_item() {
        let schema = single_assert("item", AssertKind::Assert, "@qty > 0");
        let results = run(&schema, ORDER);
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!((result.total, result.pass), (3, 1));
        assert_eq!(result.error_kind(), Some(ErrorKind::Assertion));
        assert_eq!(result.message, "Quantity -1 is not positive");
    }

    #[test]
    fn test_all_items_pass() {
        let schema = single_assert("item", AssertKind::Assert, "@qty > 0");
        let results = run(&schema, r#"<order><item qty="5"/><item qty="3"/><item qty="7"/></order>"#);
        assert_eq!((results[0].total, results[0].pass), (3, 3));
        assert!(results[0].is_ok());
        assert_eq!(results[0].message, "Quantity {@qty} is not positive");
    }

    #[test]
    fn test_report_fails_when_test_holds() {
        let schema = single_assert("item", AssertKind::Report, "@qty > 6");
        let results = run(&schema, ORDER);
        assert_eq!((results[0].total, results[0].pass), (3, 2));
        assert_eq!(results[0].message, "Quantity 7 reported");
        assert_eq!(results[0].severity, Severity::Warning);
    }

    #[test]
    fn test_selector_compile_error_yields_rule_result() {
        let schema = single_assert("@qty >", AssertKind::Assert, "true()");
        let results = run(&schema, ORDER);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "RULE");
        assert_eq!(results[0].severity, Severity::Fatal);
        assert_eq!(results[0].error_kind(), Some(ErrorKind::Compile));
    }

    #[test]
    fn test_malformed_test_yields_rule_result() {
        let mut schema = Schema::new("orders", "xslt").unwrap();
        let rule = schema.add_pattern("p").unwrap().add_rule("item");
        rule.add_assert("sane", Severity::Fatal, "@qty", "qty present");
        rule.add_assert("broken", Severity::Warning, "@qty >", "qty positive");
        let results = run(&schema, ORDER);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "RULE");
        assert_eq!(results[0].error_kind(), Some(ErrorKind::Compile));
    }

    #[test]
    fn test_selector_must_select_nodes() {
        let schema = single_assert("count(//item)", AssertKind::Assert, "true()");
        let results = run(&schema, ORDER);
        assert_eq!(results[0].id, "RULE");
        assert_eq!(results[0].error_kind(), Some(ErrorKind::Resolution));
    }

    #[test]
    fn test_evaluation_error_resets_pass_count() {
        let schema = single_assert("item", AssertKind::Assert, "@qty < 6 or $limit");
        let results = run(&schema, ORDER);
        assert_eq!((results[0].total, results[0].pass), (3, 0));
        assert_eq!(results[0].error_kind(), Some(ErrorKind::Resolution));
    }

    #[test]
    fn test_position_is_relative_to_matched_items() {
        let schema = single_assert("item", AssertKind::Assert, "position() < 3");
        let results = run(&schema, ORDER);
        assert_eq!((results[0].total, results[0].pass), (3, 2));
    }

    #[test]
    fn test_no_matches_pass_trivially() {
        let schema = single_assert("missing", AssertKind::Assert, "false()");
        let results = run(&schema, ORDER);
        assert_eq!((results[0].total, results[0].pass), (0, 0));
        assert!(results[0].is_ok());
    }
}
