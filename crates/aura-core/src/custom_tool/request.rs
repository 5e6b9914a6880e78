//! Stage 2a: build the outbound HTTP request from extracted parameters
//!
//! Pure and side-effect free, so URL templating and auth placement can be
//! checked without a network.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;
use url::Url;

use super::extraction::ExtractedParameters;
use crate::tool::{AuthLocation, AuthSpec, ExternalApiSpec};
use crate::{Error, Result};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("valid placeholder regex"));

/// Methods the invoker dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    /// Case-insensitive; anything but GET/POST is `UnsupportedHttpMethod`
    pub fn parse(method: &str) -> Result<Self> {
        match method.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            other => Err(Error::UnsupportedHttpMethod(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved request, ready for the invoker
#[derive(Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    /// JSON body for POST; always `None` for GET
    pub body: Option<JsonValue>,
    /// Query parameter carrying a secret, hidden from `display_url`
    secret_query_key: Option<String>,
}

impl PreparedRequest {
    /// URL without any query-location credential, for logging
    pub fn display_url(&self) -> String {
        let Some(secret) = &self.secret_query_key else {
            return self.url.to_string();
        };

        let mut shown = self.url.clone();
        let kept: Vec<(String, String)> = self
            .url
            .query_pairs()
            .filter(|(k, _)| k != secret)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            shown.set_query(None);
        } else {
            shown.query_pairs_mut().clear().extend_pairs(kept);
        }
        shown.to_string()
    }
}

impl fmt::Debug for PreparedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedRequest")
            .field("method", &self.method)
            .field("url", &self.display_url())
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("body", &self.body)
            .finish()
    }
}

/// Render a parameter for a URL path or query string
fn param_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve an `ExternalApiSpec` and its parameters into a concrete request
///
/// Placeholders are filled from `params` (percent-encoded) and consumed.
/// What is left goes to the query string for GET, skipping nulls, or to the
/// JSON body for POST. Auth is attached last.
pub fn build_request(spec: &ExternalApiSpec, params: &ExtractedParameters) -> Result<PreparedRequest> {
    let method = HttpMethod::parse(&spec.method)?;
    let mut remaining = params.clone();

    let mut unresolved = Vec::new();
    let substituted = PLACEHOLDER.replace_all(&spec.url_template, |caps: &Captures| {
        let name = &caps[1];
        match remaining.remove(name) {
            Some(value) if !value.is_null() => urlencoding::encode(&param_text(&value)).into_owned(),
            _ => {
                unresolved.push(name.to_string());
                caps[0].to_string()
            }
        }
    });
    if !unresolved.is_empty() {
        return Err(Error::ParameterExtraction(format!(
            "no value for path parameters: {}",
            unresolved.join(", ")
        )));
    }

    let mut url = Url::parse(&substituted)
        .map_err(|e| Error::InvalidToolConfig(format!("invalid url '{}': {}", substituted, e)))?;

    let body = match method {
        HttpMethod::Get => {
            let pairs: Vec<(String, String)> = remaining
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), param_text(v)))
                .collect();
            if !pairs.is_empty() {
                url.query_pairs_mut().extend_pairs(pairs);
            }
            None
        }
        HttpMethod::Post => Some(JsonValue::Object(remaining)),
    };

    let mut headers = spec.headers.clone();
    let mut secret_query_key = None;

    match &spec.auth {
        AuthSpec::Bearer { value } => {
            headers.insert("Authorization".to_string(), format!("Bearer {}", value));
        }
        AuthSpec::ApiKey { key, value, location } => match location {
            AuthLocation::Header => {
                headers.insert(key.clone(), value.clone());
            }
            AuthLocation::Query => {
                url.query_pairs_mut().append_pair(key, value);
                secret_query_key = Some(key.clone());
            }
        },
        AuthSpec::Basic { username, password } => {
            let encoded = BASE64.encode(format!("{}:{}", username, password));
            headers.insert("Authorization".to_string(), format!("Basic {}", encoded));
        }
        AuthSpec::None => {}
    }

    if body.is_some() {
        headers
            .entry("Content-Type".to_string())
            .or_insert_with(|| "application/json".to_string());
    }

    Ok(PreparedRequest {
        method,
        url,
        headers,
        body,
        secret_query_key,
    })
}
