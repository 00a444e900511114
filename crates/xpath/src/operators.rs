//! Comparison, arithmetic and set operators over sequences.

use crate::ast::BinaryOperator;
use crate::datasource::DataSourceNode;
use crate::error::XPathError;
use crate::item::{AtomicValue, Item, Sequence};
use std::cmp::Ordering;

/// Applies a binary operator to two evaluated operands. `and`/`or` are
/// normally short-circuited by the evaluator and only land here as a fallback.
pub fn evaluate<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: Sequence<N>,
    right: Sequence<N>,
) -> Result<Sequence<N>, XPathError> {
    match op {
        BinaryOperator::Or => Ok(Sequence::from_bool(
            left.effective_boolean_value() || right.effective_boolean_value(),
        )),
        BinaryOperator::And => Ok(Sequence::from_bool(
            left.effective_boolean_value() && right.effective_boolean_value(),
        )),
        BinaryOperator::Equals
        | BinaryOperator::NotEquals
        | BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => Ok(Sequence::from_bool(general_comparison(
            op, &left, &right,
        ))),
        BinaryOperator::ValueEq
        | BinaryOperator::ValueNe
        | BinaryOperator::ValueLt
        | BinaryOperator::ValueLe
        | BinaryOperator::ValueGt
        | BinaryOperator::ValueGe => value_comparison(op, &left, &right),
        BinaryOperator::Plus => evaluate_arithmetic(&left, &right, |a, b| a + b),
        BinaryOperator::Minus => evaluate_arithmetic(&left, &right, |a, b| a - b),
        BinaryOperator::Multiply => evaluate_arithmetic(&left, &right, |a, b| a * b),
        BinaryOperator::Divide => evaluate_arithmetic(&left, &right, |a, b| a / b),
        BinaryOperator::Modulo => evaluate_arithmetic(&left, &right, |a, b| a % b),
        BinaryOperator::Union => evaluate_union(left, right),
    }
}

/// The number an arithmetic operand stands for: its single literal converted
/// to a number, or NaN when the operand is empty.
pub fn numeric_operand<'a, N: DataSourceNode<'a>>(
    operand: &Sequence<N>,
) -> Result<f64, XPathError> {
    Ok(operand
        .to_atomic()?
        .map_or(f64::NAN, |value| value.to_number()))
}

fn evaluate_arithmetic<'a, N, F>(
    left: &Sequence<N>,
    right: &Sequence<N>,
    op: F,
) -> Result<Sequence<N>, XPathError>
where
    N: DataSourceNode<'a>,
    F: Fn(f64, f64) -> f64,
{
    let l = numeric_operand(left)?;
    let r = numeric_operand(right)?;
    Ok(Sequence::from_number(op(l, r)))
}

fn evaluate_union<'a, N: DataSourceNode<'a>>(
    left: Sequence<N>,
    right: Sequence<N>,
) -> Result<Sequence<N>, XPathError> {
    let mut nodes = left.into_nodes()?;
    nodes.extend(right.into_nodes()?);
    nodes.sort();
    nodes.dedup();
    Ok(Sequence::from_nodes(nodes))
}

/// Existential comparison: true if any pair of atomized items satisfies `op`.
/// A boolean singleton on either side compares effective boolean values instead.
fn general_comparison<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: &Sequence<N>,
    right: &Sequence<N>,
) -> bool {
    let relational = !matches!(op, BinaryOperator::Equals | BinaryOperator::NotEquals);
    let is_boolean = |s: &Sequence<N>| {
        matches!(s.items(), [Item::Atomic(AtomicValue::Boolean(_))])
    };
    if is_boolean(left) || is_boolean(right) {
        let l = AtomicValue::Boolean(left.effective_boolean_value());
        let r = AtomicValue::Boolean(right.effective_boolean_value());
        return holds(op, compare_atomic(&l, &r, relational));
    }

    let left_values = left.atomize();
    let right_values = right.atomize();
    left_values.iter().any(|l| {
        right_values
            .iter()
            .any(|r| holds(op, compare_atomic(l, r, relational)))
    })
}

/// Singleton comparison: an empty operand gives an empty result, more than one
/// item is a conversion error.
fn value_comparison<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: &Sequence<N>,
    right: &Sequence<N>,
) -> Result<Sequence<N>, XPathError> {
    match (left.to_atomic()?, right.to_atomic()?) {
        (Some(l), Some(r)) => Ok(Sequence::from_bool(holds(
            op,
            compare_atomic(&l, &r, false),
        ))),
        _ => Ok(Sequence::empty()),
    }
}

/// Orders two literals. Booleans compare as booleans (or as 0/1 under a
/// relational operator), instants as instants, numbers numerically; two
/// strings compare as strings unless the operator is relational.
pub fn compare_atomic(left: &AtomicValue, right: &AtomicValue, relational: bool) -> Option<Ordering> {
    match (left, right) {
        (AtomicValue::Boolean(_), _) | (_, AtomicValue::Boolean(_)) => {
            if relational {
                left.to_number().partial_cmp(&right.to_number())
            } else {
                Some(
                    left.effective_boolean_value()
                        .cmp(&right.effective_boolean_value()),
                )
            }
        }
        (AtomicValue::Instant(_), _) | (_, AtomicValue::Instant(_)) => {
            Some(left.to_instant()?.cmp(&right.to_instant()?))
        }
        (AtomicValue::String(l), AtomicValue::String(r)) if !relational => Some(l.cmp(r)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

fn holds(op: BinaryOperator, ordering: Option<Ordering>) -> bool {
    let Some(ord) = ordering else {
        // Unordered (NaN or unconvertible): only inequality holds.
        return matches!(op, BinaryOperator::NotEquals | BinaryOperator::ValueNe);
    };
    match op {
        BinaryOperator::Equals | BinaryOperator::ValueEq => ord == Ordering::Equal,
        BinaryOperator::NotEquals | BinaryOperator::ValueNe => ord != Ordering::Equal,
        BinaryOperator::LessThan | BinaryOperator::ValueLt => ord == Ordering::Less,
        BinaryOperator::LessThanOrEqual | BinaryOperator::ValueLe => ord != Ordering::Greater,
        BinaryOperator::GreaterThan | BinaryOperator::ValueGt => ord == Ordering::Greater,
        BinaryOperator::GreaterThanOrEqual | BinaryOperator::ValueGe => ord != Ordering::Less,
        _ => false,
    }
}
