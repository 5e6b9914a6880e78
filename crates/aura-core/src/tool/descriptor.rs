//! Tool descriptors
//!
//! Every catalog entry is a `ToolDescriptor` whose `invocation` says how the
//! router reaches it: a compiled-in sub-agent or an external HTTP API
//! registered at runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use super::definition::SchemaBuilder;
use crate::agents::SubAgentSpec;
use crate::llm::ToolSignature;

/// Where an API key is attached to the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthLocation {
    #[default]
    Header,
    Query,
}

/// Authentication applied at call time
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthSpec {
    Bearer {
        value: String,
    },
    ApiKey {
        #[serde(default = "default_api_key_name")]
        key: String,
        value: String,
        #[serde(default)]
        location: AuthLocation,
    },
    Basic {
        username: String,
        password: String,
    },
    #[default]
    None,
}

fn default_api_key_name() -> String {
    "X-API-Key".to_string()
}

// Secrets stay out of logs
impl fmt::Debug for AuthSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer { .. } => f.write_str("Bearer(<redacted>)"),
            Self::ApiKey { key, location, .. } => f
                .debug_struct("ApiKey")
                .field("key", key)
                .field("value", &"<redacted>")
                .field("location", location)
                .finish(),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::None => f.write_str("None"),
        }
    }
}

/// `{}` and `null` both mean "no auth"
fn deserialize_auth<'de, D>(deserializer: D) -> Result<AuthSpec, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    match &value {
        JsonValue::Null => Ok(AuthSpec::None),
        JsonValue::Object(map) if map.is_empty() => Ok(AuthSpec::None),
        _ => serde_json::from_value(value).map_err(serde::de::Error::custom),
    }
}

/// Invocation contract of a user-registered HTTP API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalApiSpec {
    /// URL with `{param}` placeholders, e.g. `https://x/stocks/{symbol}`
    #[serde(alias = "api_url")]
    pub url_template: String,
    /// Validated at invocation time; only GET and POST are dispatched
    #[serde(default = "default_method")]
    pub method: String,
    /// Static headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, alias = "auth_config", deserialize_with = "deserialize_auth")]
    pub auth: AuthSpec,
    /// JSON Schema the extracted parameters must satisfy
    #[serde(default = "empty_object")]
    pub parameter_schema: JsonValue,
    /// Instructions for the parameter extraction stage
    #[serde(default)]
    pub system_prompt: String,
}

fn default_method() -> String {
    "GET".to_string()
}

fn empty_object() -> JsonValue {
    JsonValue::Object(Default::default())
}

/// How a catalog entry is invoked
#[derive(Debug, Clone)]
pub enum InvocationSpec {
    SubAgent(Arc<SubAgentSpec>),
    ExternalApi(ExternalApiSpec),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    SubAgent,
    ExternalApi,
}

/// Catalog entry
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// Unique across built-in and dynamic tools
    pub name: String,
    pub description: String,
    pub invocation: InvocationSpec,
}

impl ToolDescriptor {
    pub fn sub_agent(spec: Arc<SubAgentSpec>) -> Self {
        Self {
            name: spec.tool_name.clone(),
            description: spec.description.clone(),
            invocation: InvocationSpec::SubAgent(spec),
        }
    }

    pub fn external_api(
        name: impl Into<String>,
        description: impl Into<String>,
        spec: ExternalApiSpec,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            invocation: InvocationSpec::ExternalApi(spec),
        }
    }

    pub fn kind(&self) -> ToolKind {
        match self.invocation {
            InvocationSpec::SubAgent(_) => ToolKind::SubAgent,
            InvocationSpec::ExternalApi(_) => ToolKind::ExternalApi,
        }
    }

    /// Oracle-visible signature. Every tool takes a single `query` string.
    pub fn signature(&self) -> ToolSignature {
        let query_doc = match self.kind() {
            ToolKind::SubAgent => "The specific question to ask this agent",
            ToolKind::ExternalApi => "What to fetch from this API, in natural language",
        };
        ToolSignature::new(
            &self.name,
            &self.description,
            SchemaBuilder::object_schema_with_descriptions(vec![(
                "query", "string", query_doc, true,
            )]),
        )
    }
}

/// Registration payload for a custom tool
///
/// Accepts both this crate's field names and the `api_url` / `auth_config`
/// spelling used by existing tool-config documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub spec: ExternalApiSpec,
}

impl CustomToolDefinition {
    pub fn into_descriptor(self) -> ToolDescriptor {
        ToolDescriptor::external_api(self.name, self.description, self.spec)
    }
}
