//! Template engine for custom environment variables
//!
//! Uses minijinja with its default `{{ ... }}` / `{% ... %}` delimiters and
//! strict undefined handling. Before rendering, expressions are normalised
//! so that templates written for Go's text/template keep working:
//! - a leading `.` on a lookup is dropped (`{{ .status.host }}`)
//! - hyphens between identifier characters become underscores
//!   (`{{ db-testing.status.host }}`), matching how service names are keyed

use minijinja::{Environment, UndefinedBehavior, Value};

use super::error::TemplateError;
use super::filters;

/// Opening and closing delimiters whose content is normalised
const DELIMITERS: &[(&str, &str)] = &[("{{", "}}"), ("{%", "%}")];

/// Template engine for custom environment variables
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Create an engine with strict undefined handling and the binding filters
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        env.add_filter("default", filters::default_filter);
        env.add_filter("b64enc", filters::b64enc);
        env.add_filter("b64dec", filters::b64dec);
        env.add_filter("required", filters::required);
        env.add_filter("upper", filters::upper);
        env.add_filter("lower", filters::lower);

        Self { env }
    }

    /// Render a template string against `ctx`
    ///
    /// # Errors
    ///
    /// Returns `TemplateError` if the syntax is invalid, a referenced
    /// variable is undefined, or a filter fails.
    pub fn render(&self, template: &str, ctx: &Value) -> Result<String, TemplateError> {
        let normalized = normalize_template(template);
        self.env
            .render_str(&normalized, ctx)
            .map_err(TemplateError::from)
    }
}

/// Normalise the expressions inside every delimited block of `template`
fn normalize_template(template: &str) -> String {
    let mut result = String::with_capacity(template.len());
    let mut remaining = template;

    while let Some((start, open, close)) = next_block(remaining) {
        result.push_str(&remaining[..start + open.len()]);
        remaining = &remaining[start + open.len()..];

        if let Some(end) = remaining.find(close) {
            result.push_str(&normalize_expression(&remaining[..end]));
            result.push_str(close);
            remaining = &remaining[end + close.len()..];
        } else {
            // No closing delimiter; minijinja reports the syntax error
            result.push_str(remaining);
            remaining = "";
        }
    }

    result.push_str(remaining);
    result
}

/// Position and delimiters of the first block in `s`
fn next_block(s: &str) -> Option<(usize, &'static str, &'static str)> {
    DELIMITERS
        .iter()
        .filter_map(|(open, close)| s.find(open).map(|pos| (pos, *open, *close)))
        .min_by_key(|(pos, _, _)| *pos)
}

/// Normalise one expression, skipping quoted strings
fn normalize_expression(expr: &str) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let mut out = String::with_capacity(expr.len());
    let mut quote: Option<char> = None;

    for (i, &ch) in chars.iter().enumerate() {
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            out.push(ch);
            continue;
        }

        let prev = out.chars().last();
        let next = chars.get(i + 1).copied();
        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                out.push(ch);
            }
            '-' if prev.is_some_and(is_ident) && next.is_some_and(is_ident) => out.push('_'),
            // A dot not attached to anything starts a Go-style root lookup
            '.' if prev.map_or(true, is_boundary)
                && next.is_some_and(|c| c.is_alphabetic() || c == '_') => {}
            _ => out.push(ch),
        }
    }

    out
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_boundary(c: char) -> bool {
    c.is_whitespace() || "(,|[=".contains(c)
}
