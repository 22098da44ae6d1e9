//! Equality-based label selector matching
//!
//! Supports the `key=value[,key=value...]` form the controller uses. The
//! live client hands selectors to the API server; the mock evaluates them
//! with [`matches`].

use std::collections::BTreeMap;

/// Returns true if every `key=value` term of `selector` is present in `labels`.
/// An empty selector matches everything.
pub fn matches(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(term),
        })
}
