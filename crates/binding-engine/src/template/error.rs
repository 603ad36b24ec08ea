//! Template error types

use thiserror::Error;

/// Errors that can occur while rendering a custom environment template
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template rendering failed: bad syntax, an undefined variable, or a failing filter
    #[error("template render error: {0}")]
    Render(#[from] minijinja::Error),
}
