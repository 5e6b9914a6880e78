//! Retrieval collaborator boundary
//!
//! The search engine itself lives outside this crate. Sub-agents only see
//! the `Retriever` trait.

mod http;

pub use http::HttpRetriever;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::Result;

/// One search query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    /// Restricts results to this user's documents when set
    pub user_id: Option<String>,
    /// Metadata equality filters, e.g. `doc_category = industrial`
    pub filters: BTreeMap<String, String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            limit,
            user_id: None,
            filters: BTreeMap::new(),
        }
    }

    pub fn user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn filters(mut self, filters: BTreeMap<String, String>) -> Self {
        self.filters = filters;
        self
    }
}

/// Ranked excerpt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl SearchHit {
    /// `metadata.source`, if the hit carries one
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(JsonValue::as_str)
    }
}

/// Search capability consumed by sub-agents
///
/// An empty result is a normal outcome, not an error.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>>;
}

/// Retriever for deployments without a search service
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRetriever;

#[async_trait]
impl Retriever for NoopRetriever {
    async fn search(&self, _request: &SearchRequest) -> Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }
}

/// Render hits as the context block handed back to the oracle
pub fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| {
            format!(
                "--- Document: {} ---\n{}",
                hit.source().unwrap_or("Unknown"),
                hit.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
