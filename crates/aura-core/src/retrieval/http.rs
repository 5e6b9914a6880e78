//! HTTP client for an external search service

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{Retriever, SearchHit, SearchRequest};
use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// `GET {endpoint}/search?q=..&limit=..&user_id=..&<filter>=..`
pub struct HttpRetriever {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpRetriever {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("invalid retrieval endpoint '{}': {}", endpoint, e)))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    fn search_url(&self, request: &SearchRequest) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("retrieval endpoint '{}' cannot be a base", self.endpoint)))?
            .pop_if_empty()
            .push("search");

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("q", &request.query);
            query.append_pair("limit", &request.limit.to_string());
            if let Some(user_id) = &request.user_id {
                query.append_pair("user_id", user_id);
            }
            for (key, value) in &request.filters {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let url = self.search_url(request)?;
        debug!("Searching documents: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Retrieval(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Retrieval(format!("search returned {}: {}", status, body)));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::Retrieval(format!("malformed search response: {}", e)))?;

        debug!("Search returned {} hits", parsed.results.len());
        Ok(parsed.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search_sends_scope_and_parses_hits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "leak penalty"))
            .and(query_param("limit", "5"))
            .and(query_param("user_id", "u1"))
            .and(query_param("doc_category", "industrial"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": "leak penalty",
                "results": [
                    {"text": "Fine is $10,000", "score": 0.92, "metadata": {"source": "rules.pdf"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let retriever = HttpRetriever::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let request = SearchRequest::new("leak penalty", 5)
            .user(Some("u1".into()))
            .filters(BTreeMap::from([("doc_category".to_string(), "industrial".to_string())]));

        let hits = retriever.search(&request).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source(), Some("rules.pdf"));
    }

    #[tokio::test]
    async fn test_search_failure_is_retrieval_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let retriever = HttpRetriever::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = retriever.search(&SearchRequest::new("q", 3)).await.unwrap_err();
        assert!(matches!(err, Error::Retrieval(_)));
    }

    #[test]
    fn test_search_url_keeps_endpoint_path() {
        let retriever = HttpRetriever::new("http://rag.local/api/", Duration::from_secs(1)).unwrap();
        let url = retriever.search_url(&SearchRequest::new("a b", 2)).unwrap();
        assert_eq!(url.as_str(), "http://rag.local/api/search?q=a+b&limit=2");
    }
}
