mod common;

use common::{TestResult, init_logging, order_xml};
use schematic::{
    CANCEL_MESSAGE, CancellationToken, ErrorKind, ExecutionOptions, Schema, Severity, Validator,
    XmlDocument, execute, filter, list_assertions,
};
use std::time::{Duration, Instant};

fn orders_schema() -> Result<Schema, schematic::ValidationError> {
    let mut schema = Schema::new("Orders", "xslt")?;
    let pattern = schema.add_pattern("items")?;
    let items = pattern.add_rule("item");
    items.add_assert("qty-present", Severity::Fatal, "@qty", "qty missing");
    items.add_assert("qty-positive", Severity::Fatal, "@qty > 0", "qty not positive");
    items.add_assert("qty-small", Severity::Warning, "@qty < 100", "qty large");
    pattern
        .add_rule("/order")
        .add_assert("not-empty", Severity::Fatal, "item", "order is empty");
    schema
        .add_pattern("audit")?
        .add_rule("order")
        .add_report("audited", Severity::Info, "@audited", "order was audited");
    schema.add_phase("structure", ["items"])?;
    Ok(schema)
}

#[test]
fn cancellation_ends_the_current_rule_only() -> TestResult {
    init_logging();
    let schema = orders_schema()?;
    let xml = order_xml(&[1, 2]);
    let doc = XmlDocument::parse(&xml)?;
    let token = CancellationToken::new();
    let mut execution = Validator::new(&schema)
        .with_cancellation(token.clone())
        .execute(doc.root_node(), filter::all())?;

    let first = execution.next().ok_or("no first result")?;
    assert_eq!(first.id, "qty-present");
    assert!(first.is_ok());

    token.cancel();
    let rest: Vec<_> = execution.collect();
    let ids: Vec<_> = rest.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["qty-positive", "not-empty", "audited"]);
    for result in &rest {
        assert_eq!(result.message, CANCEL_MESSAGE);
        assert_eq!(result.severity, Severity::Fatal);
        assert_eq!(result.error_kind(), Some(ErrorKind::Cancellation));
    }
    Ok(())
}

#[test]
fn expired_deadline_cancels_every_rule() -> TestResult {
    let schema = orders_schema()?;
    let xml = order_xml(&[1]);
    let doc = XmlDocument::parse(&xml)?;
    let results = Validator::new(&schema)
        .with_deadline(Instant::now())
        .validate(doc.root_node(), filter::all())?;
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.message == CANCEL_MESSAGE));

    let results = Validator::new(&schema)
        .with_timeout(Duration::from_secs(3600))
        .validate(doc.root_node(), filter::all())?;
    assert!(results.iter().all(|r| r.message != CANCEL_MESSAGE));
    Ok(())
}

#[test]
fn listed_assertions_match_unfiltered_results() -> TestResult {
    let schema = orders_schema()?;
    let listed: Vec<_> = list_assertions(&schema).iter().map(|a| a.id().to_string()).collect();
    assert_eq!(listed.len(), 5);

    for xml in [
        "<order/>".to_string(),
        order_xml(&[1, -2, 300]),
        r#"<order audited="yes"><item/></order>"#.to_string(),
    ] {
        let doc = XmlDocument::parse(&xml)?;
        let ids: Vec<_> = execute(&schema, doc.root_node(), filter::all())
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, listed, "{xml}");
    }
    Ok(())
}

#[test]
fn filters_select_assertions() -> TestResult {
    let schema = orders_schema()?;
    let xml = order_xml(&[1, 500]);
    let doc = XmlDocument::parse(&xml)?;

    let warnings: Vec<_> = execute(
        &schema,
        doc.root_node(),
        filter::by_severity(&[Severity::Warning]),
    )
    .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!((warnings[0].id.as_str(), warnings[0].pass), ("qty-small", 1));

    let qty: Vec<_> = execute(&schema, doc.root_node(), filter::by_id_prefix("qty-"))
        .map(|r| r.id)
        .collect();
    assert_eq!(qty, vec!["qty-present", "qty-positive", "qty-small"]);
    Ok(())
}

#[test]
fn options_from_json_select_phase_and_fail_fast() -> TestResult {
    let schema = orders_schema()?;
    let xml = order_xml(&[-1]);
    let doc = XmlDocument::parse(&xml)?;

    let options = ExecutionOptions::from_json(r#"{ "phase": "structure" }"#)?;
    let results = Validator::new(&schema)
        .with_options(options)
        .validate(doc.root_node(), filter::all())?;
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.pattern == "items"));

    let options = ExecutionOptions::from_json(r#"{ "stop_on_first_failure": true }"#)?;
    let results = Validator::new(&schema)
        .with_options(options)
        .validate(doc.root_node(), filter::all())?;
    let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["qty-present", "qty-positive"]);

    let all = Validator::new(&schema)
        .with_phase(schematic::ALL_PHASES)
        .validate(doc.root_node(), filter::all())?;
    assert_eq!(all.len(), 5);
    Ok(())
}

#[test]
fn consumers_may_stop_early() -> TestResult {
    let schema = orders_schema()?;
    let xml = order_xml(&[-1, -2]);
    let doc = XmlDocument::parse(&xml)?;
    let first_failure = execute(&schema, doc.root_node(), filter::all()).find(|r| r.is_failed());
    let first_failure = first_failure.ok_or("expected a failure")?;
    assert_eq!(first_failure.id, "qty-positive");
    assert_eq!(first_failure.pass, 0);
    Ok(())
}
