//! Error types for catalog values.

use thiserror::Error;

/// Errors that can occur when constructing catalog values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The identifier string is empty.
    #[error("service id cannot be empty")]
    Empty,

    /// The identifier contains whitespace.
    #[error("service id contains whitespace: {0:?}")]
    Whitespace(String),
}
