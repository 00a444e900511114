//! Defines the Abstract Syntax Tree (AST) for rule expressions.

/// The top-level expression that can be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(String),
    Number(f64),
    LocationPath(LocationPath),
    Variable(String),
    FunctionCall {
        name: String,
        args: Vec<Expression>,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
    /// A primary expression followed by predicates, like `(//item)[1]`.
    Filter {
        base: Box<Expression>,
        predicates: Vec<Expression>,
    },
    /// A comma-separated sequence constructor, `(a, b)` or `()`.
    Sequence(Vec<Expression>),
    IfExpr {
        condition: Box<Expression>,
        then_expr: Box<Expression>,
        else_expr: Box<Expression>,
    },
    Quantified {
        quantifier: Quantifier,
        bindings: Vec<(String, Expression)>,
        satisfies: Box<Expression>,
    },
    Range {
        start: Box<Expression>,
        end: Box<Expression>,
    },
}

impl Expression {
    /// Checks if the expression is a `LocationPath` variant.
    pub fn is_location_path(&self) -> bool {
        matches!(self, Expression::LocationPath(_))
    }

    /// Checks if the expression is a `BinaryOp` variant.
    pub fn is_binary_op(&self) -> bool {
        matches!(self, Expression::BinaryOp { .. })
    }

    /// Checks if the expression is a relative location path that starts at the context node.
    pub fn is_relative_path(&self) -> bool {
        matches!(
            self,
            Expression::LocationPath(LocationPath {
                start_point: None,
                is_absolute: false,
                ..
            })
        )
    }

    /// Visits the direct sub-expressions of this node.
    ///
    /// Predicates are passed with `true` as the second argument since they are
    /// evaluated against a different context item than their owner.
    pub fn for_each_child<E>(
        &self,
        mut visit: impl FnMut(&Expression, bool) -> Result<(), E>,
    ) -> Result<(), E> {
        match self {
            Expression::Literal(_) | Expression::Number(_) | Expression::Variable(_) => Ok(()),
            Expression::LocationPath(path) => {
                if let Some(start) = &path.start_point {
                    visit(start, false)?;
                }
                for step in &path.steps {
                    for predicate in &step.predicates {
                        visit(predicate, true)?;
                    }
                }
                Ok(())
            }
            Expression::FunctionCall { args, .. } => args.iter().try_for_each(|a| visit(a, false)),
            Expression::BinaryOp { left, right, .. } => {
                visit(left, false)?;
                visit(right, false)
            }
            Expression::UnaryOp { expr, .. } => visit(expr, false),
            Expression::Filter { base, predicates } => {
                visit(base, false)?;
                predicates.iter().try_for_each(|p| visit(p, true))
            }
            Expression::Sequence(items) => items.iter().try_for_each(|e| visit(e, false)),
            Expression::IfExpr {
                condition,
                then_expr,
                else_expr,
            } => {
                visit(condition, false)?;
                visit(then_expr, false)?;
                visit(else_expr, false)
            }
            Expression::Quantified {
                bindings,
                satisfies,
                ..
            } => {
                for (_, expr) in bindings {
                    visit(expr, false)?;
                }
                visit(satisfies, false)
            }
            Expression::Range { start, end } => {
                visit(start, false)?;
                visit(end, false)
            }
        }
    }
}

/// A unary operator used in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    Every,
}

/// A binary operator used in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Logical
    Or,
    And,
    // Equality
    Equals,
    NotEquals,
    // Relational
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Value comparisons (singleton operands)
    ValueEq,
    ValueNe,
    ValueLt,
    ValueLe,
    ValueGt,
    ValueGe,
    // Additive
    Plus,
    Minus,
    // Multiplicative
    Multiply,
    Divide,
    Modulo,
    // Set
    Union,
}

impl BinaryOperator {
    pub fn is_value_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::ValueEq
                | BinaryOperator::ValueNe
                | BinaryOperator::ValueLt
                | BinaryOperator::ValueLe
                | BinaryOperator::ValueGt
                | BinaryOperator::ValueGe
        )
    }
}

/// Represents a full location path, like `/child::foo`, `descendant::bar[1]`, or `$var/item`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    /// An optional starting expression, for paths like `$var/foo` or `func()/foo`.
    /// If `None`, the path starts from the context node or root.
    pub start_point: Option<Box<Expression>>,
    /// True if the path starts from the document root (e.g., `/foo`).
    /// Meaningless if `start_point` is `Some`.
    pub is_absolute: bool,
    pub steps: Vec<Step>,
}

/// Represents a single step in a location path, like `child::foo[position() > 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expression>,
}

impl Step {
    /// The `descendant-or-self::node()` step that `//` abbreviates.
    pub fn descendant_or_self() -> Self {
        Step {
            axis: Axis::DescendantOrSelf,
            node_test: NodeTest::NodeType(NodeTypeTest::Node),
            predicates: vec![],
        }
    }
}

/// The axis of movement from the context node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
}

impl Axis {
    /// Reverse axes number their nodes nearest-first for positional predicates.
    pub fn is_reverse(&self) -> bool {
        matches!(
            self,
            Axis::Parent
                | Axis::Ancestor
                | Axis::AncestorOrSelf
                | Axis::PrecedingSibling
                | Axis::Preceding
        )
    }
}

/// A qualified name inside a node test, such as `item` or `inv:line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTest {
    pub prefix: Option<String>,
    pub local: String,
}

impl NameTest {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local: name.into(),
        }
    }
}

/// A test to apply to nodes on a given axis to see if they should be included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// A qualified name test (e.g., `foo`, `inv:line`).
    Name(NameTest),
    /// A wildcard test (`*`).
    Wildcard,
    /// A namespace wildcard (`inv:*`).
    PrefixWildcard(String),
    /// A node type test (e.g., `text()`, `node()`).
    NodeType(NodeTypeTest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeTypeTest {
    Text,
    Node,
    Comment,
    ProcessingInstruction,
}
