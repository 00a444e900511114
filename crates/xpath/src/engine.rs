//! Compiles expressions and evaluates them against a generic `DataSourceNode`.

use super::ast::{
    Axis, BinaryOperator, Expression, LocationPath, NodeTest, NodeTypeTest, Quantifier, Step,
    UnaryOperator,
};
use super::{axes, operators};
use crate::datasource::{DataSourceNode, NodeType};
use crate::dialect::{self, Dialect, QueryBinding};
use crate::environment::{Binding, Callable, Frame, Scope};
use crate::error::XPathError;
use crate::item::{AtomicValue, Item, Sequence};
use crate::parser::parse_expression;
use std::collections::HashMap;
use std::marker::PhantomData;

/// Nesting limit for variable references and function calls.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Longest sequence a `to` range may produce.
pub const MAX_RANGE_LENGTH: i64 = 1 << 20;

// Largest integer an f64 holds exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// A parsed expression that passed the checks of its binding and dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    source: String,
    binding: QueryBinding,
    dialect: Dialect,
    ast: Expression,
}

impl CompiledExpression {
    pub fn compile(
        source: &str,
        binding: QueryBinding,
        dialect: Dialect,
    ) -> Result<Self, XPathError> {
        let ast = parse_expression(source)?;
        dialect::check(source, &ast, binding, dialect)?;
        Ok(Self {
            source: source.to_string(),
            binding,
            dialect,
            ast,
        })
    }

    /// Compiles a rule context. A relative path, or a relative branch of a
    /// union, matches anywhere in the document, so it is anchored at
    /// `/descendant-or-self::node()`.
    pub fn compile_selector(source: &str, binding: QueryBinding) -> Result<Self, XPathError> {
        let mut compiled = Self::compile(source, binding, Dialect::Full)?;
        compiled.ast = anchor_at_root(compiled.ast);
        Ok(compiled)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn binding(&self) -> QueryBinding {
        self.binding
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn ast(&self) -> &Expression {
        &self.ast
    }

    pub fn evaluate<'a, N>(
        &self,
        ctx: &EvaluationContext<'a, '_, N>,
    ) -> Result<Sequence<N>, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        evaluate(&self.ast, ctx)
    }
}

fn anchor_at_root(expr: Expression) -> Expression {
    match expr {
        Expression::LocationPath(mut path) if path.start_point.is_none() && !path.is_absolute => {
            path.is_absolute = true;
            path.steps.insert(0, Step::descendant_or_self());
            Expression::LocationPath(path)
        }
        Expression::BinaryOp {
            left,
            op: BinaryOperator::Union,
            right,
        } => Expression::BinaryOp {
            left: Box::new(anchor_at_root(*left)),
            op: BinaryOperator::Union,
            right: Box::new(anchor_at_root(*right)),
        },
        other => other,
    }
}

/// All state needed during expression evaluation.
/// `'a` is the lifetime of the underlying document.
/// `'d` is the lifetime of the scopes and namespace table borrowed for this evaluation.
pub struct EvaluationContext<'a, 'd, N: DataSourceNode<'a>> {
    pub context_item: Item<N>,
    /// The item the outermost expression started from; what `current()` returns.
    pub current_item: Item<N>,
    pub root_node: N,
    pub context_position: usize, // 1-based index
    pub context_size: usize,
    pub scope: Scope<'d, N>,
    /// Prefix to namespace URI, for prefixed name tests.
    pub namespaces: &'d HashMap<String, String>,
    pub depth: usize,
    pub max_depth: usize,
    _marker: PhantomData<&'a ()>,
}

impl<'a, 'd, N: DataSourceNode<'a>> EvaluationContext<'a, 'd, N> {
    pub fn new(
        context_item: Item<N>,
        root_node: N,
        scope: Scope<'d, N>,
        namespaces: &'d HashMap<String, String>,
    ) -> Self {
        Self {
            current_item: context_item.clone(),
            context_item,
            root_node,
            context_position: 1,
            context_size: 1,
            scope,
            namespaces,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            _marker: PhantomData,
        }
    }

    pub fn with_position(mut self, position: usize, size: usize) -> Self {
        self.context_position = position;
        self.context_size = size;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// A context focused on another item, keeping `current()` and the scope.
    pub fn with_item(&self, item: Item<N>, position: usize, size: usize) -> Self {
        Self {
            context_item: item,
            current_item: self.current_item.clone(),
            root_node: self.root_node,
            context_position: position,
            context_size: size,
            scope: self.scope,
            namespaces: self.namespaces,
            depth: self.depth,
            max_depth: self.max_depth,
            _marker: PhantomData,
        }
    }

    /// The same focus evaluated in a different scope.
    pub fn with_scope<'e>(&self, scope: Scope<'e, N>) -> EvaluationContext<'a, 'e, N>
    where
        'd: 'e,
    {
        EvaluationContext {
            context_item: self.context_item.clone(),
            current_item: self.current_item.clone(),
            root_node: self.root_node,
            context_position: self.context_position,
            context_size: self.context_size,
            scope,
            namespaces: self.namespaces,
            depth: self.depth,
            max_depth: self.max_depth,
            _marker: PhantomData,
        }
    }

    /// One level deeper into variable or function resolution.
    pub fn descend(&self) -> Result<Self, XPathError> {
        if self.depth >= self.max_depth {
            return Err(XPathError::DepthExceeded(self.max_depth));
        }
        let mut next = self.with_item(
            self.context_item.clone(),
            self.context_position,
            self.context_size,
        );
        next.depth = self.depth + 1;
        Ok(next)
    }

    pub fn context_node(&self) -> Result<N, XPathError> {
        self.context_item.as_node().ok_or(XPathError::NoContextNode)
    }
}

/// Evaluates an expression to a sequence.
pub fn evaluate<'a, N>(
    expr: &Expression,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Sequence<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    match expr {
        Expression::Literal(s) => Ok(Sequence::from_string(s.clone())),
        Expression::Number(n) => Ok(Sequence::from_number(*n)),
        Expression::LocationPath(path) => evaluate_location_path(path, e_ctx),
        Expression::Variable(name) => evaluate_variable(name, e_ctx),
        Expression::FunctionCall { name, args } => {
            let callable = Callable::resolve(name, &e_ctx.scope)
                .ok_or_else(|| XPathError::UnknownFunction(name.clone()))?;
            let evaluated_args = args
                .iter()
                .map(|arg| evaluate(arg, e_ctx))
                .collect::<Result<Vec<_>, _>>()?;
            callable.invoke(evaluated_args, e_ctx)
        }
        Expression::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            let result = evaluate(left, e_ctx)?.effective_boolean_value()
                && evaluate(right, e_ctx)?.effective_boolean_value();
            Ok(Sequence::from_bool(result))
        }
        Expression::BinaryOp {
            left,
            op: BinaryOperator::Or,
            right,
        } => {
            let result = evaluate(left, e_ctx)?.effective_boolean_value()
                || evaluate(right, e_ctx)?.effective_boolean_value();
            Ok(Sequence::from_bool(result))
        }
        Expression::BinaryOp { left, op, right } => {
            let left_val = evaluate(left, e_ctx)?;
            let right_val = evaluate(right, e_ctx)?;
            operators::evaluate(*op, left_val, right_val)
        }
        Expression::UnaryOp { op, expr } => {
            let val = evaluate(expr, e_ctx)?;
            match op {
                UnaryOperator::Minus => Ok(Sequence::from_number(-operators::numeric_operand(
                    &val,
                )?)),
            }
        }
        Expression::Filter { base, predicates } => {
            let items = evaluate(base, e_ctx)?.into_items();
            Ok(apply_predicates(items, predicates, e_ctx)?
                .into_iter()
                .collect())
        }
        Expression::Sequence(exprs) => {
            let mut result = Sequence::empty();
            for expr in exprs {
                result.extend(evaluate(expr, e_ctx)?);
            }
            Ok(result)
        }
        Expression::IfExpr {
            condition,
            then_expr,
            else_expr,
        } => {
            if evaluate(condition, e_ctx)?.effective_boolean_value() {
                evaluate(then_expr, e_ctx)
            } else {
                evaluate(else_expr, e_ctx)
            }
        }
        Expression::Quantified {
            quantifier,
            bindings,
            satisfies,
        } => Ok(Sequence::from_bool(evaluate_quantified(
            *quantifier,
            bindings,
            satisfies,
            e_ctx,
        )?)),
        Expression::Range { start, end } => evaluate_range(start, end, e_ctx),
    }
}

/// Declared variables are evaluated on every reference, in the scope that
/// declared them, against the referencing context item.
fn evaluate_variable<'a, N>(
    name: &str,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Sequence<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    match e_ctx.scope.lookup(name) {
        Some(Binding::Value(value)) => Ok(value.clone()),
        Some(Binding::Expression { expr, scope }) => {
            log::trace!("Resolving ${} to '{}' at depth {}", name, expr.source(), e_ctx.depth);
            let inner = e_ctx.descend()?;
            expr.evaluate(&inner.with_scope(Scope::Environment(scope)))
        }
        None => Err(XPathError::UnknownVariable(name.to_string())),
    }
}

fn evaluate_quantified<'a, N>(
    quantifier: Quantifier,
    bindings: &[(String, Expression)],
    satisfies: &Expression,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<bool, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let Some(((name, domain), rest)) = bindings.split_first() else {
        return Ok(evaluate(satisfies, e_ctx)?.effective_boolean_value());
    };
    for item in evaluate(domain, e_ctx)? {
        let mut frame = Frame::new(format!("${}", name), e_ctx.scope);
        frame.bind(name.clone(), Sequence::from_item(item));
        let holds = evaluate_quantified(
            quantifier,
            rest,
            satisfies,
            &e_ctx.with_scope(Scope::Call(&frame)),
        )?;
        match quantifier {
            Quantifier::Some if holds => return Ok(true),
            Quantifier::Every if !holds => return Ok(false),
            _ => {}
        }
    }
    Ok(quantifier == Quantifier::Every)
}

fn evaluate_range<'a, N>(
    start: &Expression,
    end: &Expression,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Sequence<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let bound = |expr: &Expression| -> Result<Option<i64>, XPathError> {
        match evaluate(expr, e_ctx)?.to_atomic()? {
            None => Ok(None),
            Some(value) => {
                let n = value.to_number();
                if !n.is_finite() || n.fract() != 0.0 || n.abs() > MAX_EXACT_INTEGER {
                    return Err(XPathError::type_error(format!(
                        "range bounds must be integers, got {}",
                        value.to_string_value()
                    )));
                }
                Ok(Some(n as i64))
            }
        }
    };
    match (bound(start)?, bound(end)?) {
        (Some(first), Some(last)) if last - first >= MAX_RANGE_LENGTH => {
            Err(XPathError::type_error(format!(
                "range {} to {} exceeds {} items",
                first, last, MAX_RANGE_LENGTH
            )))
        }
        (Some(first), Some(last)) => Ok((first..=last)
            .map(|n| Item::Atomic(AtomicValue::Number(n as f64)))
            .collect()),
        _ => Ok(Sequence::empty()),
    }
}

fn evaluate_location_path<'a, N>(
    path: &LocationPath,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Sequence<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let initial_context = if let Some(start_expr) = &path.start_point {
        // The path starts from the result of another expression.
        evaluate(start_expr, e_ctx)?.into_nodes()?
    } else if path.is_absolute {
        vec![e_ctx.root_node]
    } else {
        match &e_ctx.context_item {
            Item::Node(node) => vec![*node],
            // `.` over an atomic item, as in `(1, 2)[. > 1]`.
            Item::Atomic(_) if is_context_item_step(&path.steps) => {
                return Ok(Sequence::from_item(e_ctx.context_item.clone()));
            }
            Item::Atomic(_) => return Err(XPathError::NoContextNode),
        }
    };

    let mut current_nodes = initial_context;
    for step in &path.steps {
        current_nodes = evaluate_step(step, &current_nodes, e_ctx)?;
    }
    Ok(Sequence::from_nodes(current_nodes))
}

fn is_context_item_step(steps: &[Step]) -> bool {
    matches!(
        steps,
        [Step {
            axis: Axis::SelfAxis,
            node_test: NodeTest::NodeType(NodeTypeTest::Node),
            predicates,
        }] if predicates.is_empty()
    )
}

/// Evaluates one step for every context node. Predicates are applied per
/// context node in axis order; the merged result is in document order without
/// duplicates.
fn evaluate_step<'a, N>(
    step: &Step,
    context_nodes: &[N],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let test = NodeMatcher::resolve(&step.node_test, e_ctx.namespaces)?;
    let principal = match step.axis {
        Axis::Attribute => NodeType::Attribute,
        _ => NodeType::Element,
    };

    let mut result_nodes = Vec::new();
    for &node in context_nodes {
        let candidates: Vec<Item<N>> = axes::collect_axis(step.axis, node)
            .into_iter()
            .filter(|candidate| test.matches(candidate, principal))
            .map(Item::Node)
            .collect();
        let kept = apply_predicates(candidates, &step.predicates, e_ctx)?;
        result_nodes.extend(kept.iter().filter_map(Item::as_node));
    }
    result_nodes.sort();
    result_nodes.dedup();
    Ok(result_nodes)
}

/// A node test with its namespace prefix already resolved.
#[derive(Debug)]
enum NodeMatcher<'t> {
    Any,
    Local(&'t str),
    Qualified { uri: String, local: &'t str },
    Namespace(String),
    Kind(NodeTypeTest),
}

impl<'t> NodeMatcher<'t> {
    fn resolve(test: &'t NodeTest, namespaces: &HashMap<String, String>) -> Result<Self, XPathError> {
        let lookup = |prefix: &str| -> Result<String, XPathError> {
            if prefix == "xml" {
                return Ok(XML_NAMESPACE.to_string());
            }
            namespaces
                .get(prefix)
                .cloned()
                .ok_or_else(|| XPathError::UnknownPrefix(prefix.to_string()))
        };
        Ok(match test {
            NodeTest::Wildcard => NodeMatcher::Any,
            NodeTest::Name(name) => match &name.prefix {
                // Unprefixed names match on the local part, whatever the namespace.
                None => NodeMatcher::Local(&name.local),
                Some(prefix) => NodeMatcher::Qualified {
                    uri: lookup(prefix)?,
                    local: &name.local,
                },
            },
            NodeTest::PrefixWildcard(prefix) => NodeMatcher::Namespace(lookup(prefix)?),
            NodeTest::NodeType(kind) => NodeMatcher::Kind(*kind),
        })
    }

    fn matches<'a, N: DataSourceNode<'a>>(&self, node: &N, principal: NodeType) -> bool {
        match self {
            NodeMatcher::Kind(kind) => match kind {
                NodeTypeTest::Text => node.node_type() == NodeType::Text,
                NodeTypeTest::Comment => node.node_type() == NodeType::Comment,
                NodeTypeTest::ProcessingInstruction => {
                    node.node_type() == NodeType::ProcessingInstruction
                }
                NodeTypeTest::Node => true,
            },
            _ if node.node_type() != principal => false,
            NodeMatcher::Any => true,
            NodeMatcher::Local(local) => node.name().is_some_and(|q| q.local_part == *local),
            NodeMatcher::Qualified { uri, local } => node
                .name()
                .is_some_and(|q| q.local_part == *local && q.namespace_uri == Some(uri.as_str())),
            NodeMatcher::Namespace(uri) => node
                .name()
                .is_some_and(|q| q.namespace_uri == Some(uri.as_str())),
        }
    }
}

/// Filters items through each predicate in turn. A numeric singleton keeps
/// the item at that position; anything else is reduced by EBV.
fn apply_predicates<'a, N>(
    items: Vec<Item<N>>,
    predicates: &[Expression],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<Item<N>>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let mut current = items;
    for predicate in predicates {
        let context_size = current.len();
        let mut kept = Vec::with_capacity(context_size);
        for (i, item) in current.into_iter().enumerate() {
            let predicate_ctx = e_ctx.with_item(item.clone(), i + 1, context_size);
            let result = evaluate(predicate, &predicate_ctx)?;
            let keep = match result.items() {
                [Item::Atomic(AtomicValue::Number(n))] => *n == (i + 1) as f64,
                _ => result.effective_boolean_value(),
            };
            if keep {
                kept.push(item);
            }
        }
        current = kept;
    }
    Ok(current)
}
