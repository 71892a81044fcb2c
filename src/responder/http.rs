//! HTTP response generator client.
//! Pooled reqwest client, JSON in and out. Failures are returned as-is; the
//! dispatcher maps them to the fallback sentence and never retries.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ResponderReply, ResponderRequest, ResponseGenerator};
use crate::config::ResponderConfig;
use crate::error::ResponderError;

pub struct HttpResponder {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpResponder {
    pub fn new(config: &ResponderConfig) -> Result<Self, ResponderError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or(ResponderError::NotConfigured)?;

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ResponseGenerator for HttpResponder {
    async fn generate(&self, request: ResponderRequest) -> Result<ResponderReply, ResponderError> {
        let start = Instant::now();
        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ResponderError::Timeout
            } else {
                ResponderError::Http(e)
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "responder returned error status");
            return Err(ResponderError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let body = resp.text().await?;
        let reply: ResponderReply = serde_json::from_str(&body)
            .map_err(|e| ResponderError::Malformed(e.to_string()))?;
        if reply.response.trim().is_empty() {
            return Err(ResponderError::Malformed("empty response text".into()));
        }

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            chars = reply.response.len(),
            "responder_reply"
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_endpoint_is_not_configured() {
        let config = ResponderConfig::default();
        assert!(matches!(
            HttpResponder::new(&config),
            Err(ResponderError::NotConfigured)
        ));
    }

    #[test]
    fn endpoint_builds_client() {
        let config = ResponderConfig {
            endpoint: Some("http://127.0.0.1:9/chat".into()),
            ..ResponderConfig::default()
        };
        assert!(HttpResponder::new(&config).is_ok());
    }
}
