#![allow(dead_code)]

use schematic::{Schema, Severity, ValidationError};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `<order>` with one `<item qty="..."/>` per quantity.
pub fn order_xml(quantities: &[i64]) -> String {
    let items: String = quantities
        .iter()
        .map(|qty| format!(r#"<item qty="{}"/>"#, qty))
        .collect();
    format!("<order>{}</order>", items)
}

/// One pattern with one rule on `item` holding one fatal assertion.
pub fn single_assertion_schema(test: &str) -> Result<Schema, ValidationError> {
    let mut schema = Schema::new("Orders", "xslt")?;
    schema
        .add_pattern("quantities")?
        .add_rule("item")
        .add_assert("qty-positive", Severity::Fatal, test, "Quantity must be positive");
    Ok(schema)
}
