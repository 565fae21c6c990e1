//! `$variable` reference resolution against the live context.

use serde_json::Value;

use crate::Context;

/// If `s` is a `$key` reference, return the referenced key.
pub fn var_name(s: &str) -> Option<&str> {
    s.strip_prefix('$').filter(|name| !name.is_empty())
}

/// Resolve a single value: a string of the form `$key` becomes the
/// context value under `key` when present, anything else is returned
/// unchanged. Resolution is shallow for scalars and recursive through
/// objects and arrays.
pub fn resolve_value(value: &Value, context: &Context) -> Value {
    match value {
        Value::String(s) => match var_name(s).and_then(|name| context.get(name)) {
            Some(resolved) => resolved.clone(),
            None => value.clone(),
        },
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve_value(v, context)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolve every value in a map against the context.
pub fn resolve_map(map: &Context, context: &Context) -> Context {
    map.iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, context)))
        .collect()
}

/// The subset of context that `inputs` actually references, keyed by
/// the referenced context key. Used to show an approver only what is
/// relevant to the gated step.
pub fn referenced_subset(inputs: &Context, context: &Context) -> Context {
    let mut subset = Context::new();
    let mut pending: Vec<&Value> = inputs.values().collect();

    while let Some(value) = pending.pop() {
        match value {
            Value::String(s) => {
                if let Some(name) = var_name(s) {
                    if let Some(resolved) = context.get(name) {
                        subset.insert(name.to_string(), resolved.clone());
                    }
                }
            }
            Value::Array(items) => pending.extend(items.iter()),
            Value::Object(map) => pending.extend(map.values()),
            _ => {}
        }
    }

    subset
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Context {
        let mut c = Context::new();
        c.insert("name".to_string(), json!("ada"));
        c.insert("count".to_string(), json!(3));
        c
    }

    #[test]
    fn test_resolve_value_substitutes_known_refs() {
        let c = ctx();
        assert_eq!(resolve_value(&json!("$name"), &c), json!("ada"));
        assert_eq!(resolve_value(&json!("$count"), &c), json!(3));
        // Unknown refs and plain strings pass through.
        assert_eq!(resolve_value(&json!("$missing"), &c), json!("$missing"));
        assert_eq!(resolve_value(&json!("literal"), &c), json!("literal"));
    }

    #[test]
    fn test_resolve_value_recurses_into_structures() {
        let c = ctx();
        let resolved = resolve_value(&json!({"who": "$name", "list": ["$count", 1]}), &c);
        assert_eq!(resolved, json!({"who": "ada", "list": [3, 1]}));
    }

    #[test]
    fn test_referenced_subset_only_surfaces_used_keys() {
        let c = ctx();
        let mut inputs = Context::new();
        inputs.insert("user".to_string(), json!("$name"));
        inputs.insert("fixed".to_string(), json!("literal"));

        let subset = referenced_subset(&inputs, &c);
        assert_eq!(subset.len(), 1);
        assert_eq!(subset.get("name"), Some(&json!("ada")));
    }

    #[test]
    fn test_bare_dollar_is_not_a_reference() {
        assert_eq!(var_name("$"), None);
        assert_eq!(var_name("plain"), None);
        assert_eq!(var_name("$x"), Some("x"));
    }
}
