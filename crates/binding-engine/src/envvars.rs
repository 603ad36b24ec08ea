//! Structural flattening of accumulated values into variable names
//!
//! Every leaf becomes one variable named after the keys leading to it, joined
//! with `_` and upper-cased. List elements are named by their index.
//!
//! ```text
//! {"status": {"host": "h", "ports": ["80", "443"]}}
//!   STATUS_HOST=h
//!   STATUS_PORTS_0=80
//!   STATUS_PORTS_1=443
//! ```

use std::collections::BTreeMap;

use crate::document::{Document, Value};

/// Flatten `doc` into variables, each name starting with `prefix` segments
pub fn flatten(doc: &Document, prefix: &[String]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let mut path = prefix.to_vec();
    flatten_document(doc, &mut path, &mut out);
    out
}

fn flatten_document(doc: &Document, path: &mut Vec<String>, out: &mut BTreeMap<String, String>) {
    for (key, value) in doc {
        path.push(key.clone());
        flatten_value(value, path, out);
        path.pop();
    }
}

fn flatten_value(value: &Value, path: &mut Vec<String>, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Scalar(s) => {
            out.insert(env_var_name(path), s.clone());
        }
        Value::StringMap(map) => {
            for (key, s) in map {
                path.push(key.clone());
                out.insert(env_var_name(path), s.clone());
                path.pop();
            }
        }
        Value::StringList(list) => {
            for (i, s) in list.iter().enumerate() {
                path.push(i.to_string());
                out.insert(env_var_name(path), s.clone());
                path.pop();
            }
        }
        Value::Document(doc) => flatten_document(doc, path, out),
    }
}

/// Join segments with `_` and upper-case the result
pub fn env_var_name(segments: &[String]) -> String {
    segments.join("_").to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_doc() -> Document {
        let status = Document::from([
            ("port".to_string(), Value::from("p")),
            ("host".to_string(), Value::from("h")),
        ]);
        Document::from([("status".to_string(), Value::Document(status))])
    }

    #[test]
    fn test_flatten_nested_document() {
        let vars = flatten(&status_doc(), &[]);
        let expected = BTreeMap::from([
            ("STATUS_HOST".to_string(), "h".to_string()),
            ("STATUS_PORT".to_string(), "p".to_string()),
        ]);
        assert_eq!(vars, expected);
    }

    #[test]
    fn test_flatten_is_insertion_order_independent() {
        let mut reversed = Document::new();
        let status = Document::from([
            ("host".to_string(), Value::from("h")),
            ("port".to_string(), Value::from("p")),
        ]);
        reversed.insert("status".to_string(), Value::Document(status));
        assert_eq!(flatten(&reversed, &[]), flatten(&status_doc(), &[]));
    }

    #[test]
    fn test_flatten_with_prefix() {
        let vars = flatten(&status_doc(), &["app".to_string(), "Database".to_string()]);
        assert_eq!(vars["APP_DATABASE_STATUS_HOST"], "h");
    }

    #[test]
    fn test_flatten_lists_and_maps() {
        let doc = Document::from([
            (
                "urls".to_string(),
                Value::from(vec!["a".to_string(), "b".to_string()]),
            ),
            (
                "creds".to_string(),
                Value::from(BTreeMap::from([("user".to_string(), "u".to_string())])),
            ),
        ]);
        let vars = flatten(&doc, &["db".to_string()]);
        let expected = BTreeMap::from([
            ("DB_CREDS_USER".to_string(), "u".to_string()),
            ("DB_URLS_0".to_string(), "a".to_string()),
            ("DB_URLS_1".to_string(), "b".to_string()),
        ]);
        assert_eq!(vars, expected);
    }
}
