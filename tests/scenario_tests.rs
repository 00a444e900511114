mod common;

use common::{TestResult, init_logging, order_xml, single_assertion_schema};
use schematic::xpath::{DataSourceNode, NodeType, QName};
use schematic::{
    ErrorKind, Severity, ValidationSummary, XmlDocument, XmlNode, execute, filter, validate_str,
};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Wraps a document node and records every `item` element whose attributes
/// are read, which is what evaluating `@qty` against it does.
#[derive(Debug, Clone, Copy)]
struct Recorded<'a> {
    node: XmlNode<'a, 'a>,
    visited: &'a RefCell<Vec<XmlNode<'a, 'a>>>,
}

impl<'a> Recorded<'a> {
    fn wrap(&self, node: XmlNode<'a, 'a>) -> Self {
        Self {
            node,
            visited: self.visited,
        }
    }
}

impl PartialEq for Recorded<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl Eq for Recorded<'_> {}

impl PartialOrd for Recorded<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Recorded<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.node.cmp(&other.node)
    }
}

impl Hash for Recorded<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.hash(state);
    }
}

impl<'a> DataSourceNode<'a> for Recorded<'a> {
    fn node_type(&self) -> NodeType {
        self.node.node_type()
    }

    fn name(&self) -> Option<QName<'a>> {
        self.node.name()
    }

    fn string_value(&self) -> String {
        self.node.string_value()
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        if self.node.name().is_some_and(|q| q.local_part == "item") {
            self.visited.borrow_mut().push(self.node);
        }
        let this = *self;
        Box::new(self.node.attributes().map(move |node| this.wrap(node)))
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        let this = *self;
        Box::new(self.node.children().map(move |node| this.wrap(node)))
    }

    fn parent(&self) -> Option<Self> {
        self.node.parent().map(|node| self.wrap(node))
    }
}

#[test]
fn first_failure_stops_the_assertion() -> TestResult {
    init_logging();
    let schema = single_assertion_schema("@qty > 0")?;
    let xml = order_xml(&[5, -1, 7]);
    let doc = XmlDocument::parse(&xml)?;
    let visited = RefCell::new(Vec::new());
    let root = Recorded {
        node: doc.root_node(),
        visited: &visited,
    };

    let results: Vec<_> = execute(&schema, root, filter::all()).collect();
    assert_eq!(results.len(), 1);
    assert_eq!((results[0].total, results[0].pass), (3, 1));
    assert_eq!(results[0].error_kind(), Some(ErrorKind::Assertion));

    let mut seen = visited.borrow().clone();
    seen.dedup();
    let quantities: Vec<_> = seen
        .iter()
        .filter_map(|item| item.attributes().next())
        .map(|qty| qty.string_value())
        .collect();
    assert_eq!(quantities, vec!["5", "-1"]);
    Ok(())
}

#[test]
fn all_items_passing() -> TestResult {
    let schema = single_assertion_schema("@qty > 0")?;
    let results = validate_str(&schema, &order_xml(&[5, 3, 7]), filter::all())?;
    assert_eq!(results.len(), 1);
    assert_eq!((results[0].total, results[0].pass), (3, 3));
    assert!(results[0].is_ok());
    Ok(())
}

#[test]
fn rejecting_filter_produces_no_results() -> TestResult {
    let schema = single_assertion_schema("@qty > 0")?;
    let results = validate_str(&schema, &order_xml(&[5, -1, 7]), filter::none())?;
    assert!(results.is_empty());
    let results = validate_str(&schema, &order_xml(&[5]), filter::by_id_prefix("sku"))?;
    assert!(results.is_empty());
    Ok(())
}

#[test]
fn malformed_test_reports_the_rule() -> TestResult {
    let schema = single_assertion_schema("@qty >")?;
    let results = validate_str(&schema, &order_xml(&[5, -1, 7]), filter::all())?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, schematic::RULE_RESULT_ID);
    assert_eq!(results[0].severity, Severity::Fatal);
    assert_eq!(results[0].error_kind(), Some(ErrorKind::Compile));
    Ok(())
}

#[test]
fn trailing_decimal_literal_is_honoured() -> TestResult {
    let schema = single_assertion_schema("@qty >= 2.5")?;
    let results = validate_str(&schema, &order_xml(&[3, 2, 4]), filter::all())?;
    assert_eq!((results[0].total, results[0].pass), (3, 1));
    assert_eq!(results[0].error_kind(), Some(ErrorKind::Assertion));

    let results = validate_str(&schema, &order_xml(&[3, 4]), filter::all())?;
    assert!(results[0].is_ok());
    Ok(())
}

#[test]
fn spaced_paths_and_repeated_signs_compile() -> TestResult {
    let schema = single_assertion_schema("count(.. / item) > --1 and not(//line.item)")?;
    let results = validate_str(&schema, &order_xml(&[1, 2]), filter::all())?;
    assert_eq!(results[0].id, "qty-positive");
    assert!(results[0].is_ok(), "{:?}", results[0].error);

    let results = validate_str(&schema, &order_xml(&[1]), filter::all())?;
    assert_eq!(results[0].error_kind(), Some(ErrorKind::Assertion));
    Ok(())
}

#[test]
fn schema_variable_reaches_assertions() -> TestResult {
    let schema = single_assertion_schema("@qty > $threshold")?;
    schema.define_let("threshold", "0")?;
    let results = validate_str(&schema, &order_xml(&[5, 0, 7]), filter::all())?;
    assert_eq!((results[0].total, results[0].pass), (3, 1));
    assert_eq!(results[0].error_kind(), Some(ErrorKind::Assertion));

    schema.define_let("threshold", "-1")?;
    let results = validate_str(&schema, &order_xml(&[5, 0, 7]), filter::all())?;
    assert!(results[0].is_ok());
    Ok(())
}

#[test]
fn undefined_variable_is_a_resolution_error() -> TestResult {
    let schema = single_assertion_schema("@qty > $threshold")?;
    let results = validate_str(&schema, &order_xml(&[5, 3]), filter::all())?;
    assert_eq!((results[0].total, results[0].pass), (2, 0));
    assert_eq!(results[0].error_kind(), Some(ErrorKind::Resolution));
    Ok(())
}

#[test]
fn malformed_document_is_rejected_up_front() -> TestResult {
    let schema = single_assertion_schema("@qty > 0")?;
    let err = validate_str(&schema, "<order><item></order>", filter::all()).unwrap_err();
    assert!(matches!(err, schematic::Error::Xml(_)));
    Ok(())
}

#[test]
fn summary_and_json_report() -> TestResult {
    let mut schema = single_assertion_schema("@qty > 0")?;
    let rule = schema.add_pattern("skus")?.add_rule("item");
    rule.add_assert("sku-present", Severity::Warning, "@sku", "Item {@qty} has no sku")
        .set_role("data-quality");
    rule.add_report("qty-large", Severity::Info, "@qty > 100", "Large quantity {@qty}");

    let results = validate_str(&schema, &order_xml(&[5, 500]), filter::all())?;
    let summary = ValidationSummary::from_results(&results);
    assert_eq!(
        summary,
        ValidationSummary {
            total: 3,
            passed: 1,
            failed: 2,
            fatal: 0,
            warning: 1,
            info: 1,
        }
    );
    assert!(summary.is_valid());

    let json = serde_json::to_value(&results)?;
    assert_eq!(json[1]["id"], "sku-present");
    assert_eq!(json[1]["message"], "Item 5 has no sku");
    assert_eq!(json[1]["role"], "data-quality");
    assert_eq!(json[2]["kind"], "report");
    assert_eq!(json[2]["message"], "Large quantity 500");
    assert_eq!(json[2]["pass"], 1);
    Ok(())
}

#[test]
fn documents_can_be_validated_concurrently() -> TestResult {
    let schema = single_assertion_schema("@qty > 0")?;
    let outcomes: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = [vec![1, 2], vec![3, -4]]
            .into_iter()
            .map(|quantities| {
                let schema = &schema;
                scope.spawn(move || {
                    let xml = order_xml(&quantities);
                    validate_str(schema, &xml, filter::all())
                        .map(|results| results.iter().all(|r| r.is_ok()))
                        .unwrap_or(false)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap_or(false)).collect()
    });
    assert_eq!(outcomes, vec![true, false]);
    Ok(())
}
