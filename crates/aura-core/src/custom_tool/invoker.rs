//! Stage 2b: send a prepared request

use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::{debug, info};

use super::request::{HttpMethod, PreparedRequest};
use crate::{Error, Result};

/// HTTP side of the custom-tool pipeline
#[derive(Clone)]
pub struct HttpInvoker {
    client: reqwest::Client,
}

impl HttpInvoker {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Send the request and decode the response
    ///
    /// A non-2xx status becomes `Error::ExternalApi`. A 2xx body that is not
    /// JSON is returned as a JSON string.
    pub async fn send(&self, request: &PreparedRequest) -> Result<JsonValue> {
        info!("Calling external API: {} {}", request.method, request.display_url());

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(request.url.clone()),
            HttpMethod::Post => self.client.post(request.url.clone()),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        // reqwest errors carry the full url, query-location keys included
        let response = builder.send().await.map_err(|e| Error::Http(e.without_url()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| Error::Http(e.without_url()))?;

        if !status.is_success() {
            return Err(Error::ExternalApi {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!("External API responded {} ({} bytes)", status, text.len());
        Ok(serde_json::from_str(&text).unwrap_or(JsonValue::String(text)))
    }
}
