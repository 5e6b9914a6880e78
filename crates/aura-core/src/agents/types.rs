//! Sub-agent types
//!
//! - SubAgentSpec: static description of a compiled-in sub-agent
//! - RetrievalBinding: the one retrieval tool a sub-agent may call
//! - SubAgentAnswer: result of one sub-agent invocation

use std::collections::BTreeMap;

use crate::llm::{Message, ToolSignature};
use crate::tool::SchemaBuilder;

/// Name of the retrieval tool exposed to sub-agent oracles
pub const RETRIEVAL_TOOL_NAME: &str = "retrieve_documents";

/// Retrieval tool bound to a sub-agent
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalBinding {
    pub description: String,
    /// Metadata filters applied to every search
    pub filters: BTreeMap<String, String>,
    /// Overrides the configured result limit
    pub limit: Option<usize>,
}

impl RetrievalBinding {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            filters: BTreeMap::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn signature(&self) -> ToolSignature {
        ToolSignature::new(
            RETRIEVAL_TOOL_NAME,
            &self.description,
            SchemaBuilder::object_schema_with_descriptions(vec![(
                "query",
                "string",
                "Search terms for the internal document store",
                true,
            )]),
        )
    }
}

/// Compiled-in sub-agent
#[derive(Debug, Clone, PartialEq)]
pub struct SubAgentSpec {
    /// Oracle-visible tool name, e.g. `ask_industrial_agent`
    pub tool_name: String,
    /// Attribution on answer messages, e.g. `Industrial_RAG`
    pub agent_name: String,
    pub description: String,
    pub system_prompt: String,
    /// `None` for agents that answer from the prompt alone
    pub retrieval: Option<RetrievalBinding>,
}

impl SubAgentSpec {
    pub fn new(
        tool_name: impl Into<String>,
        agent_name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            agent_name: agent_name.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            retrieval: None,
        }
    }

    pub fn with_retrieval(mut self, binding: RetrievalBinding) -> Self {
        self.retrieval = Some(binding);
        self
    }
}

/// Result of one sub-agent invocation
#[derive(Debug, Clone, PartialEq)]
pub struct SubAgentAnswer {
    /// Assistant message attributed with the agent name
    pub message: Message,
    /// Distinct `metadata.source` values of the excerpts used
    pub sources: Vec<String>,
}
