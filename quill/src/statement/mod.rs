//! Queries and the templates they are built from.

pub mod query;
pub mod template;

pub use query::Query;
pub use template::{TemplatePart, TemplateParseError};
