//! Custom environment variable templates
//!
//! Binding requests may define extra variables whose values are templates
//! over every service context, e.g.
//!
//! ```text
//! JDBC_URL: jdbc:postgresql://{{ .db_testing.status.host }}:{{ .db_testing.status.port }}/app
//! ```

mod engine;
mod error;
mod filters;

pub use engine::TemplateEngine;
pub use error::TemplateError;
