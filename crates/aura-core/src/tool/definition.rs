//! Tool schema helpers

use serde_json::{json, Value as JsonValue};

/// Helper functions for creating tool schemas
pub struct SchemaBuilder;

impl SchemaBuilder {
    /// Create an object schema with descriptions for properties
    ///
    /// # Arguments
    /// * `properties` - A list of tuples (name, type, description, required)
    ///
    /// # Example
    /// ```ignore
    /// let schema = SchemaBuilder::object_schema_with_descriptions(vec![
    ///     ("query", "string", "What to search for", true),
    /// ]);
    /// ```
    pub fn object_schema_with_descriptions(
        properties: Vec<(&str, &str, &str, bool)>,
    ) -> JsonValue {
        let props: serde_json::Map<String, JsonValue> = properties
            .iter()
            .map(|(name, type_str, desc, _)| {
                (
                    name.to_string(),
                    json!({"type": type_str, "description": desc}),
                )
            })
            .collect();

        let required: Vec<&str> = properties
            .iter()
            .filter(|(_, _, _, required)| *required)
            .map(|(name, _, _, _)| *name)
            .collect();

        json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }

    /// Property names declared by a JSON Schema object, if it declares any
    pub fn declared_properties(schema: &JsonValue) -> Option<Vec<&str>> {
        schema
            .get("properties")
            .and_then(JsonValue::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
    }

    /// Names listed under `required`
    pub fn required_properties(schema: &JsonValue) -> Vec<&str> {
        schema
            .get("required")
            .and_then(JsonValue::as_array)
            .map(|names| names.iter().filter_map(JsonValue::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_schema_with_descriptions() {
        let schema = SchemaBuilder::object_schema_with_descriptions(vec![
            ("query", "string", "The question", true),
            ("limit", "integer", "Max results", false),
        ]);

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["query"]["description"], "The question");
        assert_eq!(schema["required"], json!(["query"]));
    }

    #[test]
    fn test_declared_and_required_properties() {
        let schema = json!({
            "type": "object",
            "properties": {"symbol": {"type": "string"}, "range": {"type": "string"}},
            "required": ["symbol"]
        });

        let mut declared = SchemaBuilder::declared_properties(&schema).unwrap();
        declared.sort();
        assert_eq!(declared, vec!["range", "symbol"]);
        assert_eq!(SchemaBuilder::required_properties(&schema), vec!["symbol"]);

        assert!(SchemaBuilder::declared_properties(&json!({})).is_none());
        assert!(SchemaBuilder::required_properties(&json!({})).is_empty());
    }
}
