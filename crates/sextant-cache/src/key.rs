use sha2::{Digest, Sha256};

use sextant_core::types::QueryParams;

/// Canonical JSON for a value: object keys sorted at every depth, no
/// insignificant whitespace.
pub fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String(k.clone()),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        serde_json::Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

/// Normalized form of query parameters.
pub fn normalize(params: &QueryParams) -> String {
    let map: serde_json::Map<String, serde_json::Value> = params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    canonical_json(&serde_json::Value::Object(map))
}

/// `sha256(source ":" normalized_params)` as lowercase hex.
pub fn cache_key(source: &str, params: &QueryParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b":");
    hasher.update(normalize(params).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_is_order_independent() {
        let a = QueryParams::new().with("q", "x").with("n", 10);
        let b = QueryParams::new().with("n", 10).with("q", "x");
        assert_eq!(cache_key("search", &a), cache_key("search", &b));
    }

    #[test]
    fn test_nested_objects_are_sorted() {
        let a = QueryParams::new().with("filter", json!({"lang": "rust", "min_stars": 100}));
        let b = QueryParams::new().with("filter", json!({"min_stars": 100, "lang": "rust"}));
        assert_eq!(normalize(&a), normalize(&b));
        assert_eq!(normalize(&a), r#"{"filter":{"lang":"rust","min_stars":100}}"#);
    }

    #[test]
    fn test_source_is_part_of_key() {
        let p = QueryParams::new().with("q", "x");
        assert_ne!(cache_key("web_search", &p), cache_key("news_search", &p));
    }

    #[test]
    fn test_values_distinguish_keys() {
        let a = QueryParams::new().with("n", 10);
        let b = QueryParams::new().with("n", "10");
        assert_ne!(cache_key("s", &a), cache_key("s", &b));
    }

    #[test]
    fn test_key_is_hex_sha256() {
        let key = cache_key("s", &QueryParams::new());
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
