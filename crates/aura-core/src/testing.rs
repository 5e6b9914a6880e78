//! Test doubles for the oracle and retrieval collaborators

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use crate::llm::{DelegateOracle, Message, OracleRequest};
use crate::retrieval::{Retriever, SearchHit, SearchRequest};
use crate::{Error, Result};

/// Oracle replaying a fixed script and recording every request
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<Message>>>,
    repeat: Option<Message>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new(responses: Vec<Message>) -> Arc<Self> {
        Self::from_results(responses.into_iter().map(Ok).collect())
    }

    pub fn from_results(responses: Vec<Result<Message>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(responses.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answers every request with `response`
    pub fn repeating(response: Message) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(response),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DelegateOracle for ScriptedOracle {
    async fn propose(&self, request: &OracleRequest) -> Result<Message> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        match &self.repeat {
            Some(response) => Ok(response.clone()),
            None => Err(Error::Other("oracle script exhausted".into())),
        }
    }
}

/// Retriever returning fixed `(text, source)` excerpts
pub struct StaticRetriever {
    hits: Vec<SearchHit>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl StaticRetriever {
    pub fn new(excerpts: Vec<(&str, &str)>) -> Arc<Self> {
        let hits = excerpts
            .into_iter()
            .enumerate()
            .map(|(i, (text, source))| SearchHit {
                text: text.to_string(),
                score: 1.0 - i as f64 * 0.1,
                metadata: json!({"source": source}),
            })
            .collect();
        Arc::new(Self {
            hits,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.hits.iter().take(request.limit).cloned().collect())
    }
}

/// Retriever whose backend is always down
pub struct FailingRetriever;

#[async_trait]
impl Retriever for FailingRetriever {
    async fn search(&self, _request: &SearchRequest) -> Result<Vec<SearchHit>> {
        Err(Error::Retrieval("search service unavailable".into()))
    }
}
