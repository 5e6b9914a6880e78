//! Orchestrator system prompt

use crate::tool::{InvocationSpec, ToolCatalog};

const PREAMBLE: &str = "You are a supervisor routing a conversation to specialized workers.
Your goal is to route the user's request to the appropriate worker by using the available tools.";

const INSTRUCTIONS: &str = "# Instructions:
- If the user asks a question relevant to a worker, call the corresponding tool with a self-contained question.
- If the user's request is a general greeting or small talk, DO NOT use any tool. Reply directly and warmly.
- When the tool results answer the question, reply to the user with the final answer.
- Do not make up information. If unsure, ask for clarification.

Decide your next action. Use a tool if needed, or reply directly.";

/// Build the routing prompt from the tools available this turn
pub fn orchestrator_system_prompt(catalog: &ToolCatalog) -> String {
    let workers: Vec<String> = catalog
        .descriptors()
        .map(|d| match &d.invocation {
            InvocationSpec::SubAgent(spec) => {
                format!("- **{}**: use the `{}` tool. {}", spec.agent_name, d.name, d.description)
            }
            InvocationSpec::ExternalApi(_) => {
                format!("- **{}** (external API): {}", d.name, d.description)
            }
        })
        .collect();

    if workers.is_empty() {
        return format!("{}\n\nNo workers are available; answer directly.\n\n{}", PREAMBLE, INSTRUCTIONS);
    }

    format!(
        "{}\n\n# Workers / Tools:\n{}\n\n{}",
        PREAMBLE,
        workers.join("\n"),
        INSTRUCTIONS
    )
}
