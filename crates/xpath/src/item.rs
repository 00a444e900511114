//! The value model flowing through evaluation: atomic scalars, node
//! references, and ordered sequences of both.

use crate::datasource::{DataSourceNode, NodeType};
use crate::error::XPathError;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, PartialEq)]
pub enum AtomicValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Instant(DateTime<FixedOffset>),
}

impl AtomicValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AtomicValue::String(_) => "xs:string",
            AtomicValue::Number(_) => "xs:double",
            AtomicValue::Boolean(_) => "xs:boolean",
            AtomicValue::Instant(_) => "xs:dateTime",
        }
    }

    pub fn to_string_value(&self) -> String {
        match self {
            AtomicValue::String(s) => s.clone(),
            AtomicValue::Number(n) => format_number(*n),
            AtomicValue::Boolean(b) => b.to_string(),
            AtomicValue::Instant(dt) => dt.to_rfc3339(),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            AtomicValue::Number(n) => *n,
            AtomicValue::String(s) => parse_number(s),
            AtomicValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            AtomicValue::Instant(_) => f64::NAN,
        }
    }

    /// Instants have no truth value and reduce to false.
    pub fn effective_boolean_value(&self) -> bool {
        match self {
            AtomicValue::String(s) => !s.is_empty(),
            AtomicValue::Number(n) => *n != 0.0 && !n.is_nan(),
            AtomicValue::Boolean(b) => *b,
            AtomicValue::Instant(_) => false,
        }
    }

    pub fn to_instant(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            AtomicValue::Instant(dt) => Some(*dt),
            AtomicValue::String(s) => parse_instant(s),
            AtomicValue::Number(_) | AtomicValue::Boolean(_) => None,
        }
    }
}

/// Formats a number the way string conversion expects: integral values drop
/// the fractional part, non-finite values use their spelled-out names.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}

/// Lenient numeric parse: surrounding whitespace is ignored, anything
/// unparseable is NaN.
pub fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    // Rust accepts "inf"/"nan" spellings that are not numbers here.
    if trimmed
        .chars()
        .any(|c| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
    {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

/// Parses `YYYY-MM-DDThh:mm:ss[.fff][zone]` or `YYYY-MM-DD[Z]`. Missing zones
/// are taken as UTC; a bare date is midnight.
pub fn parse_instant(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc().fixed_offset());
    }
    let date = s.strip_suffix('Z').unwrap_or(s);
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

/// One value: an atomic scalar or a reference into the document.
#[derive(Debug, Clone, PartialEq)]
pub enum Item<N> {
    Atomic(AtomicValue),
    Node(N),
}

impl<N: Copy> Item<N> {
    pub fn is_node(&self) -> bool {
        matches!(self, Item::Node(_))
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self, Item::Atomic(_))
    }

    pub fn as_node(&self) -> Option<N> {
        match self {
            Item::Node(n) => Some(*n),
            Item::Atomic(_) => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&AtomicValue> {
        match self {
            Item::Atomic(a) => Some(a),
            Item::Node(_) => None,
        }
    }
}

impl<'a, N: DataSourceNode<'a>> Item<N> {
    pub fn string_value(&self) -> String {
        match self {
            Item::Atomic(a) => a.to_string_value(),
            Item::Node(n) => n.string_value(),
        }
    }

    /// Atomizes without restriction: nodes become their string value.
    pub fn atomize(&self) -> AtomicValue {
        match self {
            Item::Atomic(a) => a.clone(),
            Item::Node(n) => AtomicValue::String(n.string_value()),
        }
    }

    /// Converts to a single literal. Only leaves convert: the document root
    /// and elements with element children are rejected.
    pub fn to_atomic(&self) -> Result<AtomicValue, XPathError> {
        match self {
            Item::Atomic(a) => Ok(a.clone()),
            Item::Node(n) => match n.node_type() {
                NodeType::Root => Err(XPathError::conversion(
                    "the document node cannot be converted to a literal",
                )),
                NodeType::Element if n.has_element_children() => {
                    Err(XPathError::conversion(format!(
                        "element '{}' is not a leaf and cannot be converted to a literal",
                        n.name().map(|q| q.lexical()).unwrap_or_default()
                    )))
                }
                _ => Ok(AtomicValue::String(n.string_value())),
            },
        }
    }
}

/// An ordered list of items. Order is document or selection order and is
/// significant.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence<N> {
    items: Vec<Item<N>>,
}

impl<N> Default for Sequence<N> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<N: Copy> Sequence<N> {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<Item<N>>) -> Self {
        Self { items }
    }

    pub fn from_item(item: Item<N>) -> Self {
        Self { items: vec![item] }
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = N>) -> Self {
        nodes.into_iter().map(Item::Node).collect()
    }

    pub fn from_atomic(value: AtomicValue) -> Self {
        Self::from_item(Item::Atomic(value))
    }

    pub fn from_bool(b: bool) -> Self {
        Self::from_atomic(AtomicValue::Boolean(b))
    }

    pub fn from_number(n: f64) -> Self {
        Self::from_atomic(AtomicValue::Number(n))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self::from_atomic(AtomicValue::String(s.into()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Item<N>] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Item<N>> {
        self.items
    }

    pub fn first(&self) -> Option<&Item<N>> {
        self.items.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item<N>> {
        self.items.iter()
    }

    pub fn push(&mut self, item: Item<N>) {
        self.items.push(item);
    }

    pub fn extend(&mut self, other: Sequence<N>) {
        self.items.extend(other.items);
    }

    /// Reduces the sequence to a single decision.
    pub fn effective_boolean_value(&self) -> bool {
        match self.items.as_slice() {
            [] => false,
            [Item::Node(_)] => true,
            [Item::Atomic(a)] => a.effective_boolean_value(),
            many => many.iter().any(Item::is_node),
        }
    }

    /// The node references of a node-only sequence.
    pub fn into_nodes(self) -> Result<Vec<N>, XPathError> {
        self.items
            .into_iter()
            .map(|item| match item {
                Item::Node(n) => Ok(n),
                Item::Atomic(a) => Err(XPathError::type_error(format!(
                    "expected a node, found {}",
                    a.type_name()
                ))),
            })
            .collect()
    }
}

impl<'a, N: DataSourceNode<'a>> Sequence<N> {
    /// String value of the first item, or the empty string.
    pub fn to_string_value(&self) -> String {
        self.items
            .first()
            .map(Item::string_value)
            .unwrap_or_default()
    }

    pub fn to_number(&self) -> f64 {
        match self.items.first() {
            Some(Item::Atomic(a)) => a.to_number(),
            Some(Item::Node(n)) => parse_number(&n.string_value()),
            None => f64::NAN,
        }
    }

    /// Atomizes every item; nodes become their string value.
    pub fn atomize(&self) -> Vec<AtomicValue> {
        self.items.iter().map(Item::atomize).collect()
    }

    /// At most one literal: `None` for the empty sequence, an error when
    /// there is more than one item or the single item is not a leaf.
    pub fn to_atomic(&self) -> Result<Option<AtomicValue>, XPathError> {
        match self.items.as_slice() {
            [] => Ok(None),
            [item] => item.to_atomic().map(Some),
            many => Err(XPathError::conversion(format!(
                "a sequence of {} items cannot be converted to a single literal",
                many.len()
            ))),
        }
    }
}

impl<N> FromIterator<Item<N>> for Sequence<N> {
    fn from_iter<I: IntoIterator<Item = Item<N>>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<N> IntoIterator for Sequence<N> {
    type Item = Item<N>;
    type IntoIter = std::vec::IntoIter<Item<N>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'s, N> IntoIterator for &'s Sequence<N> {
    type Item = &'s Item<N>;
    type IntoIter = std::slice::Iter<'s, Item<N>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, create_test_tree};

    type Seq<'a> = Sequence<MockNode<'a>>;

    #[test]
    fn test_ebv_empty_and_singletons() {
        let tree = create_test_tree();
        assert!(!Seq::empty().effective_boolean_value());
        assert!(Seq::from_nodes([tree.node(6)]).effective_boolean_value());
        assert!(Seq::from_string("x").effective_boolean_value());
        assert!(!Seq::from_string("").effective_boolean_value());
        assert!(Seq::from_number(-1.0).effective_boolean_value());
        assert!(!Seq::from_number(0.0).effective_boolean_value());
        assert!(!Seq::from_number(f64::NAN).effective_boolean_value());
        assert!(!Seq::from_bool(false).effective_boolean_value());
        let instant = parse_instant("2024-01-01").unwrap();
        assert!(!Seq::from_atomic(AtomicValue::Instant(instant)).effective_boolean_value());
    }

    #[test]
    fn test_ebv_multi_item_needs_a_node() {
        let tree = create_test_tree();
        let atoms: Seq = vec![
            Item::Atomic(AtomicValue::Boolean(true)),
            Item::Atomic(AtomicValue::Number(1.0)),
        ]
        .into_iter()
        .collect();
        assert!(!atoms.effective_boolean_value());

        let mixed: Seq = vec![
            Item::Atomic(AtomicValue::Boolean(false)),
            Item::Node(tree.node(10)),
        ]
        .into_iter()
        .collect();
        assert!(mixed.effective_boolean_value());
    }

    #[test]
    fn test_to_atomic_requires_a_leaf() {
        let tree = create_test_tree();
        let root = Item::Node(tree.node(0));
        let invoice = Item::Node(tree.node(1));
        let item = Item::Node(tree.node(2));
        let qty = Item::Node(tree.node(4));

        assert!(matches!(root.to_atomic(), Err(XPathError::Conversion(_))));
        assert!(matches!(invoice.to_atomic(), Err(XPathError::Conversion(_))));
        assert_eq!(item.to_atomic().unwrap(), AtomicValue::String("Widget".into()));
        assert_eq!(qty.to_atomic().unwrap().to_number(), 2.0);

        let two = Seq::from_nodes([tree.node(2), tree.node(6)]);
        assert!(two.to_atomic().is_err());
        assert_eq!(Seq::empty().to_atomic().unwrap(), None);
    }

    #[test]
    fn test_number_formatting_and_parsing() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(parse_number(" 12 "), 12.0);
        assert!(parse_number("inf").is_nan());
        assert!(parse_number("abc").is_nan());
    }

    #[test]
    fn test_parse_instant_forms() {
        let a = parse_instant("2024-03-01T10:00:00Z").unwrap();
        let b = parse_instant("2024-03-01T10:00:00").unwrap();
        let c = parse_instant("2024-03-01").unwrap();
        assert_eq!(a, b);
        assert!(c < a);
        assert!(parse_instant("yesterday").is_none());
    }

    #[test]
    fn test_into_nodes_rejects_atomics() {
        let tree = create_test_tree();
        assert_eq!(Seq::from_nodes([tree.node(2)]).into_nodes().unwrap().len(), 1);
        assert!(matches!(
            Seq::from_number(1.0).into_nodes(),
            Err(XPathError::TypeError(_))
        ));
    }
}
