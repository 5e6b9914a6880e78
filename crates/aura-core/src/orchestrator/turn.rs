//! Turn entry point
//!
//! One turn: serialize on the thread, finish any interrupted turn, persist
//! the user's message, route until `Finished`, then commit the turn's
//! messages and drop the checkpoint in one transaction.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::router::{Completion, Router, RouterOutcome, RunContext};
use crate::agents::SubAgentSpec;
use crate::llm::Message;
use crate::session::{CheckpointedRunState, ConversationManager, seed_title};
use crate::tool::{ToolCatalog, ToolRegistry};
use crate::{Error, Result};

pub(crate) const ABANDONED_TURN_ANSWER: &str =
    "I was unable to finish answering your previous message. Please ask again if it still matters.";

/// How the answer was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    /// Loop bound hit or oracle unavailable; the answer is a fallback text
    Degraded,
}

impl From<Completion> for TurnStatus {
    fn from(completion: Completion) -> Self {
        match completion {
            Completion::Answered => Self::Completed,
            Completion::LoopBoundExceeded | Completion::OracleUnavailable => Self::Degraded,
        }
    }
}

/// What the caller gets back from a turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub answer_text: String,
    pub thread_id: String,
    pub status: TurnStatus,
    /// Distinct document sources consulted during the turn
    pub sources: Vec<String>,
}

impl TurnOutcome {
    fn from_router(thread_id: &str, outcome: &RouterOutcome) -> Self {
        Self {
            answer_text: outcome.answer.content.clone(),
            thread_id: thread_id.to_string(),
            status: outcome.completion.into(),
            sources: outcome.state.sources.clone(),
        }
    }
}

pub struct TurnRunner {
    conversations: Arc<ConversationManager>,
    registry: Arc<dyn ToolRegistry>,
    builtins: Vec<Arc<SubAgentSpec>>,
    router: Router,
}

impl TurnRunner {
    pub fn new(
        conversations: Arc<ConversationManager>,
        registry: Arc<dyn ToolRegistry>,
        builtins: Vec<Arc<SubAgentSpec>>,
        router: Router,
    ) -> Self {
        Self {
            conversations,
            registry,
            builtins,
            router,
        }
    }

    pub fn conversations(&self) -> &Arc<ConversationManager> {
        &self.conversations
    }

    /// Fresh read of built-ins plus the registry
    pub async fn load_catalog(&self) -> Result<ToolCatalog> {
        ToolCatalog::load(&self.builtins, self.registry.as_ref()).await
    }

    /// Run one turn; a missing `thread_id` starts a new thread
    pub async fn run_turn(&self, thread_id: Option<String>, user_id: &str, query: &str) -> Result<TurnOutcome> {
        self.run_turn_with_cancel(thread_id, user_id, query, CancellationToken::new())
            .await
    }

    /// Like `run_turn`, abandoned with `Error::Cancelled` when `cancel` fires
    ///
    /// Every store write is a single transaction with no await inside, so
    /// cancellation leaves either the previous or the next checkpoint, never
    /// a partial one. A cancelled turn is resumed on the thread's next turn.
    pub async fn run_turn_with_cancel(
        &self,
        thread_id: Option<String>,
        user_id: &str,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome> {
        let thread_id = thread_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Turn on thread {} cancelled", thread_id);
                Err(Error::Cancelled)
            }
            result = self.execute_turn(&thread_id, user_id, query) => result,
        }
    }

    async fn execute_turn(&self, thread_id: &str, user_id: &str, query: &str) -> Result<TurnOutcome> {
        let _guard = self.conversations.lock_thread(thread_id).await;
        info!("Turn started on thread {} for user {}", thread_id, user_id);

        self.conversations
            .get_or_create_thread(thread_id, user_id, &seed_title(query))
            .await?;

        if let Some(pending) = self.conversations.load_checkpoint(thread_id).await? {
            info!(
                "Resuming interrupted turn on thread {} at cycle {}",
                thread_id, pending.cycles
            );
            if let Err(e) = self.finish_run(pending).await {
                warn!("Interrupted turn on thread {} could not be finished: {}", thread_id, e);
                self.abandon_pending(thread_id).await?;
            }
        }

        let state = CheckpointedRunState::new(thread_id, user_id, query);
        self.conversations.begin_turn(&Message::user(query), &state).await?;

        let outcome = self.finish_run(state).await?;
        info!("Turn finished on thread {} ({:?})", thread_id, outcome.status);
        Ok(outcome)
    }

    /// Resume a thread's interrupted turn, if it has one
    pub async fn resume(&self, thread_id: &str) -> Result<Option<TurnOutcome>> {
        let _guard = self.conversations.lock_thread(thread_id).await;
        match self.conversations.load_checkpoint(thread_id).await? {
            Some(pending) => Ok(Some(self.finish_run(pending).await?)),
            None => Ok(None),
        }
    }

    /// Close an unfinishable pending run with a fallback answer
    ///
    /// Commits whatever the last checkpoint accumulated, so the thread is
    /// never left with a run that fails on every resume.
    async fn abandon_pending(&self, thread_id: &str) -> Result<()> {
        let Some(pending) = self.conversations.load_checkpoint(thread_id).await? else {
            return Ok(());
        };
        let mut messages = pending.accumulator;
        messages.push(Message::assistant(ABANDONED_TURN_ANSWER));
        self.conversations.commit_turn(thread_id, &messages).await
    }

    /// Route from `state` to `Finished` and commit the result
    async fn finish_run(&self, state: CheckpointedRunState) -> Result<TurnOutcome> {
        let thread_id = state.thread_id.clone();
        let ctx = RunContext {
            catalog: Arc::new(self.load_catalog().await?),
            log: Arc::new(self.conversations.list_messages(&thread_id).await?),
            user_id: state.user_id.clone(),
        };

        let outcome = self.router.run(&ctx, state, self.conversations.as_ref()).await?;
        self.conversations
            .commit_turn(&thread_id, &outcome.turn_messages())
            .await?;

        Ok(TurnOutcome::from_router(&thread_id, &outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{RETRIEVAL_TOOL_NAME, SubAgentRunner, builtin_subagents};
    use crate::config::OrchestratorConfig;
    use crate::custom_tool::CustomToolRunner;
    use crate::llm::{DelegateOracle, OracleRequest, Role, ToolCall};
    use crate::orchestrator::router::{Dispatcher, LOOP_BOUND_ANSWER};
    use crate::testing::{ScriptedOracle, StaticRetriever};
    use crate::tool::{CustomToolDefinition, SqliteToolRegistry};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn runner_with(
        oracle: Arc<dyn DelegateOracle>,
        retriever: Arc<StaticRetriever>,
        registry: Arc<SqliteToolRegistry>,
        conversations: Arc<ConversationManager>,
        max_cycles: usize,
    ) -> TurnRunner {
        let config = OrchestratorConfig {
            max_cycles,
            ..OrchestratorConfig::default()
        };
        let dispatcher = Dispatcher::new(
            SubAgentRunner::new(oracle.clone(), retriever, 5),
            CustomToolRunner::new(oracle.clone(), Duration::from_secs(5)).unwrap(),
        );
        TurnRunner::new(
            conversations,
            registry,
            builtin_subagents(),
            Router::new(oracle, dispatcher, &config),
        )
    }

    fn runner(oracle: Arc<ScriptedOracle>, retriever: Arc<StaticRetriever>) -> TurnRunner {
        runner_with(
            oracle,
            retriever,
            Arc::new(SqliteToolRegistry::in_memory().unwrap()),
            Arc::new(ConversationManager::in_memory().unwrap()),
            5,
        )
    }

    fn call(id: &str, name: &str, query: &str) -> Message {
        Message::assistant_with_tool_calls("", vec![ToolCall::new(id, name, json!({"query": query}))])
    }

    #[tokio::test]
    async fn test_turn_persists_four_messages() {
        let oracle = ScriptedOracle::new(vec![
            call("c1", "ask_industrial_agent", "leak penalty"),
            call("r1", RETRIEVAL_TOOL_NAME, "leak penalty"),
            Message::assistant("The penalty is $10,000."),
            Message::assistant("The penalty is $10,000."),
        ]);
        let retriever = StaticRetriever::new(vec![("Fine: $10,000", "penalties.pdf"), ("Report leaks", "sop.pdf")]);
        let turns = runner(oracle, retriever);

        let outcome = turns
            .run_turn(Some("t1".into()), "u1", "What is the leak penalty?")
            .await
            .unwrap();

        assert_eq!(outcome.answer_text, "The penalty is $10,000.");
        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.sources, vec!["penalties.pdf", "sop.pdf"]);

        let messages = turns.conversations().list_messages("t1").await.unwrap();
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert!(turns.conversations().load_checkpoint("t1").await.unwrap().is_none());

        let thread = turns.conversations().get_thread("t1").await.unwrap().unwrap();
        assert_eq!(thread.title, "What is the leak penalty?");
    }

    #[tokio::test]
    async fn test_missing_thread_id_creates_thread() {
        let oracle = ScriptedOracle::new(vec![Message::assistant("Hello!")]);
        let turns = runner(oracle, StaticRetriever::new(vec![]));

        let outcome = turns.run_turn(None, "u1", "hi").await.unwrap();
        assert!(Uuid::parse_str(&outcome.thread_id).is_ok());
        assert_eq!(turns.conversations().list_threads("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_turn_sees_first_turn() {
        let oracle = ScriptedOracle::new(vec![Message::assistant("Hello!"), Message::assistant("Still here.")]);
        let turns = runner(oracle.clone(), StaticRetriever::new(vec![]));

        turns.run_turn(Some("t1".into()), "u1", "hi").await.unwrap();
        turns.run_turn(Some("t1".into()), "u1", "you there?").await.unwrap();

        let second = &oracle.requests()[1];
        let contents: Vec<_> = second.history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "Hello!", "you there?"]);
    }

    #[tokio::test]
    async fn test_loop_bound_is_persisted_as_degraded() {
        let oracle = ScriptedOracle::repeating(call("x", "ask_ghost_agent", "again"));
        let turns = runner_with(
            oracle,
            StaticRetriever::new(vec![]),
            Arc::new(SqliteToolRegistry::in_memory().unwrap()),
            Arc::new(ConversationManager::in_memory().unwrap()),
            2,
        );

        let outcome = turns.run_turn(Some("t1".into()), "u1", "spin").await.unwrap();
        assert_eq!(outcome.status, TurnStatus::Degraded);
        assert_eq!(outcome.answer_text, LOOP_BOUND_ANSWER);

        let messages = turns.conversations().list_messages("t1").await.unwrap();
        assert_eq!(messages.last().unwrap().content, LOOP_BOUND_ANSWER);
        assert_eq!(messages.len(), 1 + 2 * 2 + 1);
    }

    #[tokio::test]
    async fn test_user_message_survives_oracle_failure() {
        let oracle = ScriptedOracle::from_results(vec![Err(Error::Other("400 bad request".into()))]);
        let turns = runner(oracle, StaticRetriever::new(vec![]));

        let err = turns.run_turn(Some("t1".into()), "u1", "keep me").await.unwrap_err();
        assert!(matches!(err, Error::Other(_)));

        let messages = turns.conversations().list_messages("t1").await.unwrap();
        assert_eq!(messages, vec![Message::user("keep me")]);
        assert!(turns.conversations().load_checkpoint("t1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_resume_does_not_swallow_next_query() {
        let oracle = ScriptedOracle::from_results(vec![
            Err(Error::Other("400 bad request".into())),
            Err(Error::Other("400 bad request".into())),
            Ok(Message::assistant("Answer to second.")),
        ]);
        let turns = runner(oracle.clone(), StaticRetriever::new(vec![]));

        assert!(turns.run_turn(Some("t1".into()), "u1", "first").await.is_err());
        let outcome = turns
            .run_turn(Some("t1".into()), "u1", "second question")
            .await
            .unwrap();
        assert_eq!(outcome.answer_text, "Answer to second.");

        let contents: Vec<_> = turns
            .conversations()
            .list_messages("t1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(
            contents,
            vec!["first", ABANDONED_TURN_ANSWER, "second question", "Answer to second."]
        );
        assert!(turns.conversations().load_checkpoint("t1").await.unwrap().is_none());
        assert_eq!(oracle.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_interrupted_turn_is_resumed_first() {
        let conversations = Arc::new(ConversationManager::in_memory().unwrap());
        conversations.get_or_create_thread("t1", "u1", "first").await.unwrap();
        let mut pending = CheckpointedRunState::new("t1", "u1", "first");
        conversations.begin_turn(&Message::user("first"), &pending).await.unwrap();
        pending.cycles = 1;
        pending.accumulator = vec![
            call("c1", "ask_ghost_agent", "x"),
            Message::tool_result("c1", "Error: unknown tool 'ask_ghost_agent'"),
        ];
        conversations.save_checkpoint(&pending).await.unwrap();

        let oracle = ScriptedOracle::new(vec![
            Message::assistant("Answer to first."),
            Message::assistant("Answer to second."),
        ]);
        let turns = runner_with(
            oracle,
            StaticRetriever::new(vec![]),
            Arc::new(SqliteToolRegistry::in_memory().unwrap()),
            conversations.clone(),
            5,
        );

        let outcome = turns.run_turn(Some("t1".into()), "u1", "second").await.unwrap();
        assert_eq!(outcome.answer_text, "Answer to second.");

        let contents: Vec<_> = conversations
            .list_messages("t1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(
            contents,
            vec![
                "first",
                "",
                "Error: unknown tool 'ask_ghost_agent'",
                "Answer to first.",
                "second",
                "Answer to second."
            ]
        );
    }

    #[tokio::test]
    async fn test_custom_tool_registered_between_turns() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stocks/AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"price": 190.5})))
            .mount(&server)
            .await;

        let registry = Arc::new(SqliteToolRegistry::in_memory().unwrap());
        let oracle = ScriptedOracle::new(vec![
            Message::assistant("No stock tool yet."),
            call("s1", "finance_api", "Apple stock price"),
            Message::assistant("{\"symbol\": \"AAPL\"}"),
            Message::assistant("Apple trades at 190.5."),
        ]);
        let turns = runner_with(
            oracle.clone(),
            StaticRetriever::new(vec![]),
            registry.clone(),
            Arc::new(ConversationManager::in_memory().unwrap()),
            5,
        );

        turns.run_turn(Some("t1".into()), "u1", "Apple?").await.unwrap();

        let definition: CustomToolDefinition = serde_json::from_value(json!({
            "name": "finance_api",
            "description": "Stock prices",
            "url_template": format!("{}/stocks/{{symbol}}", server.uri()),
            "system_prompt": "Extract the ticker.",
            "parameter_schema": {"type": "object", "properties": {"symbol": {"type": "string"}}, "required": ["symbol"]}
        }))
        .unwrap();
        registry.register(definition).unwrap();

        let outcome = turns.run_turn(Some("t1".into()), "u1", "Apple now?").await.unwrap();
        assert_eq!(outcome.answer_text, "Apple trades at 190.5.");

        let requests = oracle.requests();
        assert_eq!(requests[0].tools.len(), 3);
        assert_eq!(requests[1].tools.len(), 4);
        assert_eq!(requests[2].history, vec![Message::user("Apple stock price")]);
        assert_eq!(requests[3].history.last().unwrap().content, "{\"price\":190.5}");
    }

    struct StallingOracle;

    #[async_trait]
    impl DelegateOracle for StallingOracle {
        async fn propose(&self, _request: &OracleRequest) -> Result<Message> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Message::assistant("never"))
        }
    }

    #[tokio::test]
    async fn test_cancellation_keeps_user_message_and_checkpoint() {
        let turns = runner_with(
            Arc::new(StallingOracle),
            StaticRetriever::new(vec![]),
            Arc::new(SqliteToolRegistry::in_memory().unwrap()),
            Arc::new(ConversationManager::in_memory().unwrap()),
            5,
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = turns
            .run_turn_with_cancel(Some("t1".into()), "u1", "slow", cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        let conversations = turns.conversations();
        assert_eq!(conversations.list_messages("t1").await.unwrap(), vec![Message::user("slow")]);
        let checkpoint = conversations.load_checkpoint("t1").await.unwrap().unwrap();
        assert_eq!(checkpoint.cycles, 0);
    }
}
