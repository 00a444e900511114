//! Assertion messages with placeholders filled in from the failing item.

use schematic_xpath::{
    CompiledExpression, DataSourceNode, Dialect, EvaluationContext, Item, QueryBinding, XPathError,
};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePart {
    Text(String),
    /// The string value of an expression evaluated against the failing item.
    ValueOf(String),
    /// The name of the failing item, or of the first node an expression selects.
    Name(Option<String>),
}

/// A message built from text and placeholders.
///
/// The compact form accepted by [`MessageTemplate::parse`] writes a value-of
/// placeholder as `{expression}`; `{{` and `}}` stand for literal braces.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageTemplate {
    parts: Vec<MessagePart>,
}

impl MessageTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(source: &str) -> Self {
        let mut template = Self::new();
        let mut text = String::new();
        let mut chars = source.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    let expression = read_placeholder(&mut chars);
                    if !text.is_empty() {
                        template.parts.push(MessagePart::Text(std::mem::take(&mut text)));
                    }
                    template
                        .parts
                        .push(MessagePart::ValueOf(expression.trim().to_string()));
                }
                _ => text.push(c),
            }
        }
        if !text.is_empty() {
            template.parts.push(MessagePart::Text(text));
        }
        template
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(MessagePart::Text(text.into()));
        self
    }

    pub fn value_of(mut self, expression: impl Into<String>) -> Self {
        self.parts.push(MessagePart::ValueOf(expression.into()));
        self
    }

    pub fn name(mut self) -> Self {
        self.parts.push(MessagePart::Name(None));
        self
    }

    pub fn name_of(mut self, expression: impl Into<String>) -> Self {
        self.parts.push(MessagePart::Name(Some(expression.into())));
        self
    }

    pub fn parts(&self) -> &[MessagePart] {
        &self.parts
    }

    pub fn has_placeholders(&self) -> bool {
        self.parts
            .iter()
            .any(|part| !matches!(part, MessagePart::Text(_)))
    }

    /// Fills the placeholders in against the context item. A placeholder that
    /// cannot be evaluated renders as its source text.
    pub fn render<'a, N>(&self, ctx: &EvaluationContext<'a, '_, N>, binding: QueryBinding) -> String
    where
        N: DataSourceNode<'a> + 'a,
    {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                MessagePart::Text(text) => out.push_str(text),
                MessagePart::ValueOf(source) => match value_of(source, ctx, binding) {
                    Ok(value) => out.push_str(&value),
                    Err(e) => {
                        log::warn!("Could not render message placeholder '{}': {}", source, e);
                        out.push_str(&format!("{{{}}}", source));
                    }
                },
                MessagePart::Name(target) => match name_of(target.as_deref(), ctx, binding) {
                    Ok(name) => out.push_str(&name),
                    Err(e) => {
                        log::warn!("Could not render name placeholder: {}", e);
                    }
                },
            }
        }
        out
    }
}

fn value_of<'a, N>(
    source: &str,
    ctx: &EvaluationContext<'a, '_, N>,
    binding: QueryBinding,
) -> Result<String, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let value = CompiledExpression::compile(source, binding, Dialect::Full)?.evaluate(ctx)?;
    let strings: Vec<String> = value.iter().map(Item::string_value).collect();
    Ok(strings.join(" "))
}

fn name_of<'a, N>(
    target: Option<&str>,
    ctx: &EvaluationContext<'a, '_, N>,
    binding: QueryBinding,
) -> Result<String, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let node = match target {
        None => ctx.context_item.as_node(),
        Some(source) => CompiledExpression::compile(source, binding, Dialect::Full)?
            .evaluate(ctx)?
            .first()
            .and_then(Item::as_node),
    };
    Ok(node
        .and_then(|n| n.name())
        .map(|q| q.lexical())
        .unwrap_or_default())
}

/// Reads a placeholder body up to its closing brace. Braces inside string
/// literals or nested braces do not end it.
fn read_placeholder(chars: &mut impl Iterator<Item = char>) -> String {
    let mut expression = String::new();
    let mut depth = 1;
    let mut quote = None;
    for c in chars {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '{') => depth += 1,
            (None, '}') => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            (None, _) => {}
        }
        expression.push(c);
    }
    expression
}

impl From<&str> for MessageTemplate {
    fn from(source: &str) -> Self {
        Self::parse(source)
    }
}

impl From<String> for MessageTemplate {
    fn from(source: String) -> Self {
        Self::parse(&source)
    }
}

/// The template as written, with placeholders in their compact form.
impl fmt::Display for MessageTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                MessagePart::Text(text) => {
                    f.write_str(&text.replace('{', "{{").replace('}', "}}"))?
                }
                MessagePart::ValueOf(source) => write!(f, "{{{}}}", source)?,
                MessagePart::Name(None) => f.write_str("{name()}")?,
                MessagePart::Name(Some(source)) => write!(f, "{{name({})}}", source)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schematic_xpath::tests::create_test_tree;
    use schematic_xpath::{Environment, Scope};
    use std::collections::HashMap;

    #[test]
    fn test_parse_compact_form() {
        let template = MessageTemplate::parse("Item {@sku} has {{{count(*)}}} children");
        assert_eq!(
            template.parts(),
            &[
                MessagePart::Text("Item ".into()),
                MessagePart::ValueOf("@sku".into()),
                MessagePart::Text(" has {".into()),
                MessagePart::ValueOf("count(*)".into()),
                MessagePart::Text("} children".into()),
            ]
        );
        assert!(template.has_placeholders());
        assert!(!MessageTemplate::parse("plain").has_placeholders());
    }

    #[test]
    fn test_render_against_item() {
        let tree = create_test_tree();
        let env = Environment::new();
        let namespaces = HashMap::new();
        let item = tree.node(6);
        let ctx = EvaluationContext::new(
            Item::Node(item),
            tree.node(0),
            Scope::Environment(&env),
            &namespaces,
        );

        let template = MessageTemplate::new()
            .text("<")
            .name()
            .text("> ")
            .value_of("@sku")
            .text(" in ")
            .name_of("..")
            .text(" has quantity ")
            .value_of("@qty");
        assert_eq!(
            template.render(&ctx, QueryBinding::XPath1),
            "<item> B2 in invoice has quantity 0"
        );

        let broken = MessageTemplate::parse("qty is {$missing}");
        assert_eq!(broken.render(&ctx, QueryBinding::XPath1), "qty is {$missing}");
    }

    #[test]
    fn test_braces_inside_literals_stay_in_the_placeholder() {
        let template = MessageTemplate::parse("Expected {concat('{', @sku, \"}\")} here");
        assert_eq!(
            template.parts(),
            &[
                MessagePart::Text("Expected ".into()),
                MessagePart::ValueOf("concat('{', @sku, \"}\")".into()),
                MessagePart::Text(" here".into()),
            ]
        );

        let tree = create_test_tree();
        let env = Environment::new();
        let namespaces = HashMap::new();
        let ctx = EvaluationContext::new(
            Item::Node(tree.node(6)),
            tree.node(0),
            Scope::Environment(&env),
            &namespaces,
        );
        assert_eq!(template.render(&ctx, QueryBinding::XPath1), "Expected {B2} here");
    }

    #[test]
    fn test_display_round_trips_compact_form() {
        let source = "Item {@sku} has {{braces}}";
        assert_eq!(MessageTemplate::parse(source).to_string(), source);
    }
}
