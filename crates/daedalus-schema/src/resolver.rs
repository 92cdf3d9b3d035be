//! `$ref` resolution inside an OpenAPI document.
//!
//! Only document-local references (`#/...`) are supported.

use serde_json::Value;
use tracing::debug;

/// Longest `$ref` chain followed before giving up.
pub const MAX_REFERENCE_DEPTH: usize = 32;

/// Returns the `$ref` string of a reference object.
#[must_use]
pub fn reference_of(node: &Value) -> Option<&str> {
    node.get("$ref").and_then(Value::as_str)
}

/// Resolves a local JSON pointer reference such as `#/components/schemas/User`.
///
/// `~1` and `~0` escapes are honoured. Returns `None` for remote references
/// and for pointers that lead nowhere.
#[must_use]
pub fn resolve_pointer<'a>(document: &'a Value, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    if pointer.is_empty() {
        return Some(document);
    }
    document.pointer(pointer)
}

/// Follows `$ref` chains starting at `node` until a non-reference is found.
///
/// Returns `node` itself when it is not a reference, and `None` when a
/// reference is dangling or the chain loops.
#[must_use]
pub fn resolve_reference<'a>(document: &'a Value, node: &'a Value) -> Option<&'a Value> {
    let mut current = node;
    for _ in 0..MAX_REFERENCE_DEPTH {
        let Some(reference) = reference_of(current) else {
            return Some(current);
        };
        match resolve_pointer(document, reference) {
            Some(next) => current = next,
            None => {
                debug!(reference, "dangling schema reference");
                return None;
            }
        }
    }
    debug!("schema reference chain too deep or circular");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "components": {
                "schemas": {
                    "User": {"type": "object"},
                    "Alias": {"$ref": "#/components/schemas/User"},
                    "Loop": {"$ref": "#/components/schemas/Loop"},
                    "a/b": {"type": "string"},
                    "m~n": {"type": "number"}
                }
            }
        })
    }

    #[test]
    fn test_resolve_pointer() {
        let doc = document();
        assert_eq!(
            resolve_pointer(&doc, "#/components/schemas/User"),
            Some(&json!({"type": "object"}))
        );
        assert_eq!(resolve_pointer(&doc, "#"), Some(&doc));
        assert!(resolve_pointer(&doc, "#/components/schemas/Missing").is_none());
        assert!(resolve_pointer(&doc, "https://example.com/schema.json").is_none());
    }

    #[test]
    fn test_resolve_pointer_escapes() {
        let doc = document();
        assert_eq!(
            resolve_pointer(&doc, "#/components/schemas/a~1b"),
            Some(&json!({"type": "string"}))
        );
        assert_eq!(
            resolve_pointer(&doc, "#/components/schemas/m~0n"),
            Some(&json!({"type": "number"}))
        );
    }

    #[test]
    fn test_resolve_reference_chains() {
        let doc = document();
        let node = json!({"$ref": "#/components/schemas/Alias"});
        assert_eq!(resolve_reference(&doc, &node), Some(&json!({"type": "object"})));

        let inline = json!({"type": "integer"});
        assert_eq!(resolve_reference(&doc, &inline), Some(&inline));
    }

    #[test]
    fn test_resolve_reference_failures() {
        let doc = document();
        assert!(resolve_reference(&doc, &json!({"$ref": "#/nope"})).is_none());
        assert!(resolve_reference(&doc, &json!({"$ref": "#/components/schemas/Loop"})).is_none());
    }
}
