//! This module provides helpers and constants to deal with namespaces

/// The namespace used whenever a caller does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Returns `namespace`, or [`DEFAULT_NAMESPACE`] if it is empty.
pub fn resolve(namespace: &str) -> &str {
    if namespace.is_empty() {
        DEFAULT_NAMESPACE
    } else {
        namespace
    }
}
