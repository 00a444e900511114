//! The built-in function library.

use super::engine::EvaluationContext;
use crate::datasource::{DataSourceNode, QName};
use crate::error::XPathError;
use crate::item::{AtomicValue, Item, Sequence, parse_number};
use chrono::{NaiveTime, Utc};
use itertools::Itertools;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

/// A function provided by the engine itself. User functions with the same
/// name take precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    // Context
    Position,
    Last,
    Current,
    // Node
    Name,
    LocalName,
    NamespaceUri,
    Count,
    String,
    Number,
    Boolean,
    Exists,
    Empty,
    Lang,
    // String
    Concat,
    Contains,
    StartsWith,
    EndsWith,
    Substring,
    SubstringBefore,
    SubstringAfter,
    StringLength,
    NormalizeSpace,
    Translate,
    UpperCase,
    LowerCase,
    StringJoin,
    Matches,
    // Boolean
    Not,
    True,
    False,
    // Number
    Sum,
    Floor,
    Ceiling,
    Round,
    Abs,
    // Instant
    CurrentDateTime,
    CurrentDate,
    DateTime,
    Date,
}

impl Builtin {
    /// Looks a built-in up by its lexical name; the `fn:` prefix is optional.
    pub fn from_name(name: &str) -> Option<Self> {
        let local = name.strip_prefix("fn:").unwrap_or(name);
        Some(match local {
            "position" => Builtin::Position,
            "last" => Builtin::Last,
            "current" => Builtin::Current,
            "name" => Builtin::Name,
            "local-name" => Builtin::LocalName,
            "namespace-uri" => Builtin::NamespaceUri,
            "count" => Builtin::Count,
            "string" => Builtin::String,
            "number" => Builtin::Number,
            "boolean" => Builtin::Boolean,
            "exists" => Builtin::Exists,
            "empty" => Builtin::Empty,
            "lang" => Builtin::Lang,
            "concat" => Builtin::Concat,
            "contains" => Builtin::Contains,
            "starts-with" => Builtin::StartsWith,
            "ends-with" => Builtin::EndsWith,
            "substring" => Builtin::Substring,
            "substring-before" => Builtin::SubstringBefore,
            "substring-after" => Builtin::SubstringAfter,
            "string-length" => Builtin::StringLength,
            "normalize-space" => Builtin::NormalizeSpace,
            "translate" => Builtin::Translate,
            "upper-case" => Builtin::UpperCase,
            "lower-case" => Builtin::LowerCase,
            "string-join" => Builtin::StringJoin,
            "matches" => Builtin::Matches,
            "not" => Builtin::Not,
            "true" => Builtin::True,
            "false" => Builtin::False,
            "sum" => Builtin::Sum,
            "floor" => Builtin::Floor,
            "ceiling" => Builtin::Ceiling,
            "round" => Builtin::Round,
            "abs" => Builtin::Abs,
            "current-dateTime" => Builtin::CurrentDateTime,
            "current-date" => Builtin::CurrentDate,
            "xs:dateTime" => Builtin::DateTime,
            "xs:date" => Builtin::Date,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Position => "position",
            Builtin::Last => "last",
            Builtin::Current => "current",
            Builtin::Name => "name",
            Builtin::LocalName => "local-name",
            Builtin::NamespaceUri => "namespace-uri",
            Builtin::Count => "count",
            Builtin::String => "string",
            Builtin::Number => "number",
            Builtin::Boolean => "boolean",
            Builtin::Exists => "exists",
            Builtin::Empty => "empty",
            Builtin::Lang => "lang",
            Builtin::Concat => "concat",
            Builtin::Contains => "contains",
            Builtin::StartsWith => "starts-with",
            Builtin::EndsWith => "ends-with",
            Builtin::Substring => "substring",
            Builtin::SubstringBefore => "substring-before",
            Builtin::SubstringAfter => "substring-after",
            Builtin::StringLength => "string-length",
            Builtin::NormalizeSpace => "normalize-space",
            Builtin::Translate => "translate",
            Builtin::UpperCase => "upper-case",
            Builtin::LowerCase => "lower-case",
            Builtin::StringJoin => "string-join",
            Builtin::Matches => "matches",
            Builtin::Not => "not",
            Builtin::True => "true",
            Builtin::False => "false",
            Builtin::Sum => "sum",
            Builtin::Floor => "floor",
            Builtin::Ceiling => "ceiling",
            Builtin::Round => "round",
            Builtin::Abs => "abs",
            Builtin::CurrentDateTime => "current-dateTime",
            Builtin::CurrentDate => "current-date",
            Builtin::DateTime => "xs:dateTime",
            Builtin::Date => "xs:date",
        }
    }

    /// Minimum and optional maximum argument count.
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Builtin::Position
            | Builtin::Last
            | Builtin::Current
            | Builtin::True
            | Builtin::False
            | Builtin::CurrentDateTime
            | Builtin::CurrentDate => (0, Some(0)),
            Builtin::Name
            | Builtin::LocalName
            | Builtin::NamespaceUri
            | Builtin::String
            | Builtin::Number
            | Builtin::StringLength
            | Builtin::NormalizeSpace => (0, Some(1)),
            Builtin::Count
            | Builtin::Boolean
            | Builtin::Exists
            | Builtin::Empty
            | Builtin::Lang
            | Builtin::UpperCase
            | Builtin::LowerCase
            | Builtin::Not
            | Builtin::Sum
            | Builtin::Floor
            | Builtin::Ceiling
            | Builtin::Round
            | Builtin::Abs
            | Builtin::DateTime
            | Builtin::Date => (1, Some(1)),
            Builtin::StringJoin => (1, Some(2)),
            Builtin::Contains
            | Builtin::StartsWith
            | Builtin::EndsWith
            | Builtin::SubstringBefore
            | Builtin::SubstringAfter => (2, Some(2)),
            Builtin::Substring | Builtin::Matches => (2, Some(3)),
            Builtin::Translate => (3, Some(3)),
            Builtin::Concat => (2, None),
        }
    }

    fn check_arity(&self, actual: usize) -> Result<(), XPathError> {
        let (min, max) = self.arity();
        if actual >= min && max.is_none_or(|max| actual <= max) {
            return Ok(());
        }
        let expected = match max {
            Some(max) if max == min => min.to_string(),
            Some(max) => format!("{} to {}", min, max),
            None => format!("at least {}", min),
        };
        Err(XPathError::arity(self.name(), expected, actual))
    }

    /// Dispatches a call to the implementation.
    pub fn invoke<'a, N>(
        &self,
        args: Vec<Sequence<N>>,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Result<Sequence<N>, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        self.check_arity(args.len())?;
        match self {
            Builtin::Position => Ok(Sequence::from_number(e_ctx.context_position as f64)),
            Builtin::Last => Ok(Sequence::from_number(e_ctx.context_size as f64)),
            Builtin::Current => Ok(Sequence::from_item(e_ctx.current_item.clone())),
            Builtin::Name => func_name(*self, &args, e_ctx, |q| q.lexical()),
            Builtin::LocalName => func_name(*self, &args, e_ctx, |q| q.local_part.to_string()),
            Builtin::NamespaceUri => func_name(*self, &args, e_ctx, |q| {
                q.namespace_uri.unwrap_or_default().to_string()
            }),
            Builtin::Count => Ok(Sequence::from_number(args[0].len() as f64)),
            Builtin::String => Ok(Sequence::from_string(string_or_context(&args, e_ctx))),
            Builtin::Number => Ok(Sequence::from_number(match args.first() {
                Some(arg) => arg.to_number(),
                None => parse_number(&e_ctx.context_item.string_value()),
            })),
            Builtin::Boolean => Ok(Sequence::from_bool(args[0].effective_boolean_value())),
            Builtin::Exists => Ok(Sequence::from_bool(!args[0].is_empty())),
            Builtin::Empty => Ok(Sequence::from_bool(args[0].is_empty())),
            Builtin::Lang => func_lang(&args, e_ctx),
            Builtin::Concat => Ok(Sequence::from_string(
                args.iter().map(Sequence::to_string_value).collect::<String>(),
            )),
            Builtin::Contains => {
                let (s1, s2) = two_strings(&args);
                Ok(Sequence::from_bool(s1.contains(&s2)))
            }
            Builtin::StartsWith => {
                let (s1, s2) = two_strings(&args);
                Ok(Sequence::from_bool(s1.starts_with(&s2)))
            }
            Builtin::EndsWith => {
                let (s1, s2) = two_strings(&args);
                Ok(Sequence::from_bool(s1.ends_with(&s2)))
            }
            Builtin::Substring => Ok(Sequence::from_string(func_substring(&args))),
            Builtin::SubstringBefore => {
                let (s1, s2) = two_strings(&args);
                let before = s1.find(&s2).map(|index| &s1[..index]).unwrap_or_default();
                Ok(Sequence::from_string(before))
            }
            Builtin::SubstringAfter => {
                let (s1, s2) = two_strings(&args);
                let after = s1
                    .find(&s2)
                    .map(|index| &s1[index + s2.len()..])
                    .unwrap_or_default();
                Ok(Sequence::from_string(after))
            }
            Builtin::StringLength => Ok(Sequence::from_number(
                string_or_context(&args, e_ctx).chars().count() as f64,
            )),
            Builtin::NormalizeSpace => Ok(Sequence::from_string(
                string_or_context(&args, e_ctx).split_whitespace().join(" "),
            )),
            Builtin::Translate => Ok(Sequence::from_string(func_translate(&args))),
            Builtin::UpperCase => Ok(Sequence::from_string(args[0].to_string_value().to_uppercase())),
            Builtin::LowerCase => Ok(Sequence::from_string(args[0].to_string_value().to_lowercase())),
            Builtin::StringJoin => {
                let separator = args.get(1).map(Sequence::to_string_value).unwrap_or_default();
                Ok(Sequence::from_string(
                    args[0].iter().map(Item::string_value).join(&separator),
                ))
            }
            Builtin::Matches => func_matches(&args),
            Builtin::Not => Ok(Sequence::from_bool(!args[0].effective_boolean_value())),
            Builtin::True => Ok(Sequence::from_bool(true)),
            Builtin::False => Ok(Sequence::from_bool(false)),
            Builtin::Sum => Ok(Sequence::from_number(
                args[0].atomize().iter().map(AtomicValue::to_number).sum(),
            )),
            Builtin::Floor => Ok(Sequence::from_number(args[0].to_number().floor())),
            Builtin::Ceiling => Ok(Sequence::from_number(args[0].to_number().ceil())),
            Builtin::Round => Ok(Sequence::from_number(round_half_up(args[0].to_number()))),
            Builtin::Abs => Ok(Sequence::from_number(args[0].to_number().abs())),
            Builtin::CurrentDateTime => Ok(Sequence::from_atomic(AtomicValue::Instant(
                Utc::now().fixed_offset(),
            ))),
            Builtin::CurrentDate => {
                let midnight = Utc::now().date_naive().and_time(NaiveTime::MIN);
                Ok(Sequence::from_atomic(AtomicValue::Instant(
                    midnight.and_utc().fixed_offset(),
                )))
            }
            Builtin::DateTime => func_instant(*self, &args[0], false),
            Builtin::Date => func_instant(*self, &args[0], true),
        }
    }
}

// --- Helpers ---

fn two_strings<'a, N: DataSourceNode<'a>>(args: &[Sequence<N>]) -> (String, String) {
    (args[0].to_string_value(), args[1].to_string_value())
}

fn string_or_context<'a, N: DataSourceNode<'a>>(
    args: &[Sequence<N>],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> String {
    match args.first() {
        Some(arg) => arg.to_string_value(),
        None => e_ctx.context_item.string_value(),
    }
}

// --- Node Functions ---

fn func_name<'a, N, F>(
    builtin: Builtin,
    args: &[Sequence<N>],
    e_ctx: &EvaluationContext<'a, '_, N>,
    project: F,
) -> Result<Sequence<N>, XPathError>
where
    N: DataSourceNode<'a>,
    F: Fn(QName<'a>) -> String,
{
    let node = match args.first() {
        None => Some(e_ctx.context_node()?),
        Some(arg) => match arg.first() {
            None => None,
            Some(Item::Node(node)) => Some(*node),
            Some(Item::Atomic(value)) => {
                return Err(XPathError::function(
                    builtin.name(),
                    format!("expected a node, found {}", value.type_name()),
                ));
            }
        },
    };
    let name = node.and_then(|n| n.name()).map(project).unwrap_or_default();
    Ok(Sequence::from_string(name))
}

fn func_lang<'a, N: DataSourceNode<'a>>(
    args: &[Sequence<N>],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Sequence<N>, XPathError> {
    let test_lang = args[0].to_string_value().to_lowercase();
    let mut current = Some(e_ctx.context_node()?);
    while let Some(node) = current {
        let declared = node.attributes().find(|attr| {
            attr.name()
                .is_some_and(|q| q.prefix == Some("xml") && q.local_part == "lang")
        });
        if let Some(attr) = declared {
            let node_lang = attr.string_value().to_lowercase();
            // "en" matches "en-GB"; the nearest declaration decides.
            let matched =
                node_lang == test_lang || node_lang.starts_with(&format!("{}-", test_lang));
            return Ok(Sequence::from_bool(matched));
        }
        current = node.parent();
    }
    Ok(Sequence::from_bool(false))
}

// --- String Functions ---

fn func_substring<'a, N: DataSourceNode<'a>>(args: &[Sequence<N>]) -> String {
    let s = args[0].to_string_value();
    let first = round_half_up(args[1].to_number());
    let last = args
        .get(2)
        .map_or(f64::INFINITY, |length| first + round_half_up(length.to_number()));

    s.chars()
        .enumerate()
        .filter_map(|(i, c)| {
            let pos = (i + 1) as f64; // positions are 1-based
            (pos >= first && pos < last).then_some(c)
        })
        .collect()
}

fn func_translate<'a, N: DataSourceNode<'a>>(args: &[Sequence<N>]) -> String {
    let source = args[0].to_string_value();
    let from: Vec<char> = args[1].to_string_value().chars().collect();
    let to: Vec<char> = args[2].to_string_value().chars().collect();
    source
        .chars()
        .filter_map(|c| match from.iter().position(|&fc| fc == c) {
            Some(pos) => to.get(pos).copied(),
            None => Some(c),
        })
        .collect()
}

fn func_matches<'a, N: DataSourceNode<'a>>(
    args: &[Sequence<N>],
) -> Result<Sequence<N>, XPathError> {
    let input = args[0].to_string_value();
    let pattern = args[1].to_string_value();
    let flags = args.get(2).map(Sequence::to_string_value).unwrap_or_default();

    let regex = cached_regex(&pattern, &flags)?;
    Ok(Sequence::from_bool(regex.is_match(&input)))
}

const REGEX_CACHE_CAPACITY: usize = 64;

type RegexCache = RwLock<HashMap<(String, String), Regex>>;

/// Compiled `matches()` patterns keyed by pattern and flags, shared across evaluations.
fn cached_regex(pattern: &str, flags: &str) -> Result<Regex, XPathError> {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    let cache = CACHE.get_or_init(RegexCache::default);
    let key = (pattern.to_string(), flags.to_string());
    if let Some(regex) = cache.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
        return Ok(regex.clone());
    }

    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            's' => builder.dot_matches_new_line(true),
            'm' => builder.multi_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(XPathError::function(
                    "matches",
                    format!("unsupported flag '{}'", other),
                ));
            }
        };
    }
    let regex = builder
        .build()
        .map_err(|e| XPathError::function("matches", e.to_string()))?;

    let mut cache = cache.write().unwrap_or_else(PoisonError::into_inner);
    if cache.len() < REGEX_CACHE_CAPACITY {
        cache.insert(key, regex.clone());
    }
    Ok(regex)
}

// --- Number Functions ---

/// Rounds halves towards positive infinity; NaN, infinities and zero pass through.
fn round_half_up(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() || n == 0.0 {
        return n;
    }
    (n + 0.5).floor()
}

// --- Instant Functions ---

fn func_instant<'a, N: DataSourceNode<'a>>(
    builtin: Builtin,
    arg: &Sequence<N>,
    date_only: bool,
) -> Result<Sequence<N>, XPathError> {
    let Some(value) = arg.to_atomic()? else {
        return Ok(Sequence::empty());
    };
    let instant = value.to_instant().ok_or_else(|| {
        XPathError::function(
            builtin.name(),
            format!("'{}' is not a valid instant", value.to_string_value()),
        )
    })?;
    let instant = if date_only {
        instant
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_local_timezone(*instant.offset())
            .single()
            .unwrap_or(instant)
    } else {
        instant
    };
    Ok(Sequence::from_atomic(AtomicValue::Instant(instant)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::tests::{MockNode, MockTree, create_test_tree};
    use crate::dialect::{Dialect, QueryBinding};
    use crate::engine::CompiledExpression;
    use crate::environment::{Environment, Scope};
    use std::collections::HashMap;

    fn eval<'a>(tree: &'a MockTree<'a>, node: usize, source: &str) -> Sequence<MockNode<'a>> {
        try_eval(tree, node, source).unwrap()
    }

    fn try_eval<'a>(
        tree: &'a MockTree<'a>,
        node: usize,
        source: &str,
    ) -> Result<Sequence<MockNode<'a>>, XPathError> {
        let env = Environment::new();
        let namespaces = HashMap::new();
        let ctx = EvaluationContext::new(
            Item::Node(tree.node(node)),
            tree.node(0),
            Scope::Environment(&env),
            &namespaces,
        );
        CompiledExpression::compile(source, QueryBinding::XPath1, Dialect::Full)?.evaluate(&ctx)
    }

    fn text(tree: &MockTree<'_>, node: usize, source: &str) -> String {
        eval(tree, node, source).to_string_value()
    }

    fn number(tree: &MockTree<'_>, node: usize, source: &str) -> f64 {
        eval(tree, node, source).to_number()
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(Builtin::from_name("fn:count"), Some(Builtin::Count));
        assert_eq!(Builtin::from_name("xs:date"), Some(Builtin::Date));
        assert_eq!(Builtin::from_name("key"), None);
        assert_eq!(Builtin::Substring.arity(), (2, Some(3)));
    }

    #[test]
    fn test_node_functions() {
        let tree = create_test_tree();
        assert_eq!(text(&tree, 2, "name()"), "item");
        assert_eq!(text(&tree, 1, "local-name(item[2])"), "item");
        assert_eq!(text(&tree, 12, "name()"), "xml:lang");
        assert_eq!(text(&tree, 1, "name(missing)"), "");
        assert_eq!(number(&tree, 0, "count(//item)"), 2.0);
        assert_eq!(text(&tree, 2, "string()"), "Widget");
        assert_eq!(number(&tree, 4, "number()"), 2.0);
        assert!(eval(&tree, 2, "exists(@sku)").effective_boolean_value());
        assert!(eval(&tree, 2, "empty(@price)").effective_boolean_value());
        assert!(eval(&tree, 13, "lang('EN')").effective_boolean_value());
        assert!(!eval(&tree, 2, "lang('en')").effective_boolean_value());
    }

    #[test]
    fn test_string_functions() {
        let tree = create_test_tree();
        assert_eq!(text(&tree, 2, "concat(@sku, '-', @qty)"), "A1-2");
        assert!(eval(&tree, 2, "starts-with(., 'Wid')").effective_boolean_value());
        assert!(eval(&tree, 2, "ends-with(., 'get')").effective_boolean_value());
        assert!(eval(&tree, 2, "contains(., 'dge')").effective_boolean_value());
        assert_eq!(text(&tree, 0, "substring('12345', 1.5, 2.6)"), "234");
        assert_eq!(text(&tree, 0, "substring('12345', 0, 3)"), "12");
        assert_eq!(text(&tree, 0, "substring-before('1999/04/01', '/')"), "1999");
        assert_eq!(text(&tree, 0, "substring-after('1999/04/01', '/')"), "04/01");
        assert_eq!(number(&tree, 0, "string-length('héllo')"), 5.0);
        assert_eq!(text(&tree, 0, "normalize-space('  a   b ')"), "a b");
        assert_eq!(text(&tree, 0, "translate('--aaa--', 'abc-', 'ABC')"), "AAA");
        assert_eq!(text(&tree, 0, "upper-case('abc')"), "ABC");
        assert_eq!(text(&tree, 0, "string-join(//item/@sku, ', ')"), "A1, B2");
    }

    #[test]
    fn test_matches_with_flags() {
        let tree = create_test_tree();
        assert!(eval(&tree, 2, "matches(@sku, '^[A-Z][0-9]$')").effective_boolean_value());
        assert!(eval(&tree, 2, "matches(., 'WIDGET', 'i')").effective_boolean_value());
        assert!(try_eval(&tree, 2, "matches(., 'x', 'q')").is_err());
        assert!(try_eval(&tree, 2, "matches(., '(')").is_err());
    }

    #[test]
    fn test_cached_patterns_keep_their_flags() {
        let insensitive = cached_regex("^sku-[0-9]+$", "i").unwrap();
        let sensitive = cached_regex("^sku-[0-9]+$", "").unwrap();
        assert!(insensitive.is_match("SKU-12"));
        assert!(!sensitive.is_match("SKU-12"));
        assert!(cached_regex("^sku-[0-9]+$", "i").unwrap().is_match("Sku-7"));
        assert!(cached_regex("^sku", "q").is_err());
    }

    #[test]
    fn test_number_functions() {
        let tree = create_test_tree();
        assert_eq!(number(&tree, 0, "sum(//item/@qty)"), 2.0);
        assert!(number(&tree, 0, "sum(//item)").is_nan());
        assert_eq!(number(&tree, 0, "floor(2.7)"), 2.0);
        assert_eq!(number(&tree, 0, "ceiling(2.1)"), 3.0);
        assert_eq!(number(&tree, 0, "round(2.5)"), 3.0);
        assert_eq!(number(&tree, 0, "round(-2.5)"), -2.0);
        assert_eq!(number(&tree, 0, "abs(-4)"), 4.0);
    }

    #[test]
    fn test_instant_functions() {
        let tree = create_test_tree();
        assert!(
            eval(&tree, 0, "xs:date('2024-01-31') < xs:dateTime('2024-01-31T08:00:00Z')")
                .effective_boolean_value()
        );
        assert!(eval(&tree, 0, "current-date() <= current-dateTime()").effective_boolean_value());
        let err = try_eval(&tree, 0, "xs:date('soon')").unwrap_err();
        assert!(matches!(err, XPathError::FunctionError { .. }));
    }

    #[test]
    fn test_arity_and_context_errors() {
        let tree = create_test_tree();
        let err = try_eval(&tree, 0, "contains('a')").unwrap_err();
        assert_eq!(err, XPathError::arity("contains", "2", 1));
        let err = try_eval(&tree, 0, "concat('a')").unwrap_err();
        assert_eq!(err, XPathError::arity("concat", "at least 2", 1));
        assert!(try_eval(&tree, 0, "name('text')").is_err());
    }

    #[test]
    fn test_context_functions() {
        let tree = create_test_tree();
        assert_eq!(number(&tree, 1, "item[position() = last()]/@qty"), 0.0);
        assert_eq!(text(&tree, 2, "../item[@sku != current()/@sku]/@sku"), "B2");
    }
}
