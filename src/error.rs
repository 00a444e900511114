// src/error.rs
use schematic_engine::ValidationError;
use thiserror::Error;

/// Errors raised before any result can be produced.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Document is not well-formed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Validation could not start: {0}")]
    Validation(#[from] ValidationError),
}
