//! Sub-agent runner: retrieval, then answer
//!
//! At most two oracle invocations per call. The first is bound to the
//! agent's retrieval tool; if it asks for documents, the search results are
//! fed back and the second invocation must produce the answer. Tool calls in
//! the second response are ignored.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::types::{RETRIEVAL_TOOL_NAME, RetrievalBinding, SubAgentAnswer, SubAgentSpec};
use crate::Result;
use crate::llm::{DelegateOracle, Message, OracleRequest, ToolCall};
use crate::retrieval::{Retriever, SearchHit, SearchRequest, format_hits};

const NO_DOCUMENTS: &str = "No relevant documents found.";
const EMPTY_ANSWER: &str = "I could not find an answer to that question.";

pub struct SubAgentRunner {
    oracle: Arc<dyn DelegateOracle>,
    retriever: Arc<dyn Retriever>,
    default_limit: usize,
}

impl SubAgentRunner {
    pub fn new(oracle: Arc<dyn DelegateOracle>, retriever: Arc<dyn Retriever>, default_limit: usize) -> Self {
        Self {
            oracle,
            retriever,
            default_limit,
        }
    }

    /// Answer `query` as `spec`
    ///
    /// Retrieval failures degrade to a "no documents" tool result. Oracle
    /// failures are returned to the caller.
    pub async fn run(&self, spec: &SubAgentSpec, query: &str, user_id: Option<&str>) -> Result<SubAgentAnswer> {
        info!("Sub-agent {} handling: {}", spec.agent_name, query);

        let mut history = vec![Message::user(query)];
        let tools = spec
            .retrieval
            .as_ref()
            .map(|binding| vec![binding.signature()])
            .unwrap_or_default();
        let mut sources = Vec::new();

        let first = self
            .oracle
            .propose(
                &OracleRequest::new(history.clone())
                    .system(&spec.system_prompt)
                    .tools(tools.clone()),
            )
            .await?;

        let content = match (&spec.retrieval, first.has_tool_calls()) {
            (Some(binding), true) => {
                let calls = first.tool_calls.clone();
                history.push(first);
                for call in &calls {
                    let result = self.execute_call(binding, call, query, user_id, &mut sources).await;
                    history.push(result);
                }

                let second = self
                    .oracle
                    .propose(&OracleRequest::new(history).system(&spec.system_prompt).tools(tools))
                    .await?;
                if second.has_tool_calls() {
                    debug!("{} requested more tools after retrieval; ignoring", spec.agent_name);
                }
                second.content
            }
            (None, true) => {
                warn!("{} proposed tool calls without a retrieval tool", spec.agent_name);
                first.content
            }
            (_, false) => first.content,
        };

        let content = if content.trim().is_empty() {
            EMPTY_ANSWER.to_string()
        } else {
            content
        };

        Ok(SubAgentAnswer {
            message: Message::assistant(content).with_name(&spec.agent_name),
            sources,
        })
    }

    async fn execute_call(
        &self,
        binding: &RetrievalBinding,
        call: &ToolCall,
        fallback_query: &str,
        user_id: Option<&str>,
        sources: &mut Vec<String>,
    ) -> Message {
        if call.name != RETRIEVAL_TOOL_NAME {
            return Message::tool_result(&call.id, format!("Unknown tool: {}", call.name));
        }

        let query = call.str_arg("query").unwrap_or(fallback_query);
        let request = SearchRequest::new(query, binding.limit.unwrap_or(self.default_limit))
            .user(user_id.map(str::to_string))
            .filters(binding.filters.clone());

        let hits = match self.retriever.search(&request).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Retrieval failed for '{}': {}", query, e);
                Vec::new()
            }
        };
        debug!("Retrieved {} excerpts for '{}'", hits.len(), query);

        if hits.is_empty() {
            return Message::tool_result(&call.id, NO_DOCUMENTS).with_name(RETRIEVAL_TOOL_NAME);
        }

        collect_sources(&hits, sources);
        Message::tool_result(&call.id, format_hits(&hits)).with_name(RETRIEVAL_TOOL_NAME)
    }
}

fn collect_sources(hits: &[SearchHit], sources: &mut Vec<String>) {
    for source in hits.iter().filter_map(SearchHit::source) {
        if !sources.iter().any(|s| s == source) {
            sources.push(source.to_string());
        }
    }
}
