//! Compiled-in sub-agents

use std::sync::Arc;

use super::types::{RetrievalBinding, SubAgentSpec};

const INDUSTRIAL_PROMPT: &str = "You are an Industrial Safety and Compliance Expert assistant.
You have access to a tool 'retrieve_documents' to search internal safety reports, OSHA regulations, ISO standards, and incident logs.
ALWAYS use this tool if the user asks about hazards, safety protocols, specific regulations (like OSHA 1910), penalties, or past incidents.
When answering:
- Be professional and precise.
- Cite specific regulations or standards if found in the documents.
- If the tool returns no info, say so clearly without making up facts.";

const FINANCIAL_PROMPT: &str = "You are a financial analyst assistant.
You have access to a tool 'retrieve_documents' to search internal documents.
ALWAYS use this tool if the user asks about financial data, revenues, contracts, or specific company info.
Do not hallucinate facts. If the tool returns no info, say so.";

const PLACEHOLDER_PROMPT: &str = "You are a placeholder agent for a future document search system.
Your only job right now is to politely inform the user that this specific feature is under construction.
Do not attempt to answer questions about topics other than this status.";

pub fn industrial_agent() -> SubAgentSpec {
    SubAgentSpec::new(
        "ask_industrial_agent",
        "Industrial_RAG",
        "Use this tool to ask questions about industrial safety, regulations (OSHA, ISO), \
         compliance, hazards, or incident reports. Input should be the specific question.",
        INDUSTRIAL_PROMPT,
    )
    .with_retrieval(
        RetrievalBinding::new(
            "Retrieve industrial safety reports, OSHA/ISO regulations, incident logs, and \
             compliance documents relevant to the query.",
        )
        .filter("doc_category", "industrial"),
    )
}

pub fn financial_agent() -> SubAgentSpec {
    SubAgentSpec::new(
        "ask_financial_agent",
        "Financial_RAG",
        "Use this tool for financial data, revenue, contracts and business metrics. \
         Input should be the specific question.",
        FINANCIAL_PROMPT,
    )
    .with_retrieval(
        RetrievalBinding::new("Retrieve financial reports, contracts and company documents relevant to the query.")
            .filter("doc_category", "financial"),
    )
}

pub fn placeholder_agent() -> SubAgentSpec {
    SubAgentSpec::new(
        "ask_placeholder_agent",
        "Placeholder_RAG",
        "Use this tool to ask questions about other topics, or features currently in development.",
        PLACEHOLDER_PROMPT,
    )
}

/// Built-in sub-agents in catalog order
pub fn builtin_subagents() -> Vec<Arc<SubAgentSpec>> {
    vec![
        Arc::new(industrial_agent()),
        Arc::new(financial_agent()),
        Arc::new(placeholder_agent()),
    ]
}

/// Tool names custom tools may not take
pub fn reserved_tool_names() -> Vec<String> {
    builtin_subagents().iter().map(|s| s.tool_name.clone()).collect()
}
