//! Stage 1: turn a conversation into schema-conformant API parameters

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::llm::{DelegateOracle, Message, OracleRequest};
use crate::tool::{ExternalApiSpec, SchemaBuilder};
use crate::{Error, Result};

/// Parameters after validation against the tool's `parameter_schema`
pub type ExtractedParameters = Map<String, JsonValue>;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\s*```$").expect("valid fence regex")
});

/// Remove a surrounding markdown code fence (```json ... ``` or ``` ... ```)
///
/// Text without a complete surrounding fence is returned trimmed.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    match CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// Check extracted JSON against a tool schema
///
/// The value must be an object. When the schema declares `properties`,
/// undeclared keys are dropped. Every `required` key must be present; an
/// explicit `null` counts as present.
pub fn validate_parameters(value: JsonValue, schema: &JsonValue) -> Result<ExtractedParameters> {
    let JsonValue::Object(mut params) = value else {
        return Err(Error::ParameterExtraction(format!(
            "expected a JSON object, got {}",
            value
        )));
    };

    if let Some(declared) = SchemaBuilder::declared_properties(schema) {
        params.retain(|key, _| {
            let known = declared.contains(&key.as_str());
            if !known {
                debug!("Dropping undeclared parameter '{}'", key);
            }
            known
        });
    }

    let missing: Vec<&str> = SchemaBuilder::required_properties(schema)
        .into_iter()
        .filter(|name| !params.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(Error::ParameterExtraction(format!(
            "missing required parameters: {}",
            missing.join(", ")
        )));
    }

    Ok(params)
}

/// Extraction stage of the custom-tool pipeline
#[derive(Clone)]
pub struct ParameterExtractor {
    oracle: Arc<dyn DelegateOracle>,
}

impl ParameterExtractor {
    pub fn new(oracle: Arc<dyn DelegateOracle>) -> Self {
        Self { oracle }
    }

    /// System prompt for the non-tool-bound oracle call
    pub fn build_prompt(spec: &ExternalApiSpec) -> String {
        let schema = serde_json::to_string_pretty(&spec.parameter_schema)
            .unwrap_or_else(|_| spec.parameter_schema.to_string());

        format!(
            "{base}\n\n\
             Your goal is to extract the necessary parameters to call the API.\n\
             The required parameters schema is:\n\
             {schema}\n\n\
             Return ONLY a JSON object with the extracted parameters. \
             If a parameter is missing, try to infer it or return null.\n\
             Example: {{\"symbol\": \"AAPL\"}}",
            base = spec.system_prompt.trim(),
            schema = schema,
        )
    }

    /// Ask the oracle for parameters and validate them
    ///
    /// Oracle failures and unparsable output both end as
    /// `Error::ParameterExtraction`; this stage is not retried.
    pub async fn extract(&self, spec: &ExternalApiSpec, history: &[Message]) -> Result<ExtractedParameters> {
        let request = OracleRequest::new(history.to_vec()).system(Self::build_prompt(spec));

        let response = self
            .oracle
            .propose(&request)
            .await
            .map_err(|e| Error::ParameterExtraction(format!("oracle call failed: {}", e)))?;

        let cleaned = strip_code_fences(&response.content);
        let value: JsonValue = serde_json::from_str(cleaned).map_err(|e| {
            warn!("Failed to parse JSON parameters: {}", cleaned);
            Error::ParameterExtraction(format!("response is not valid JSON: {}", e))
        })?;

        validate_parameters(value, &spec.parameter_schema)
    }
}
