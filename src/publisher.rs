//! Change notifications for the environment update topic.
//!
//! Every add/update/delete is published as `{"type": ..., "body": ...}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::{EnvironmentError, Result};
use crate::models::Environment;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "body", rename_all = "lowercase")]
pub enum EnvironmentEvent {
    Add(Environment),
    Update(Environment),
    Delete { environment_id: i64 },
}

impl EnvironmentEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Update(_) => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, event: &EnvironmentEvent) -> Result<()>;
}

/// Produces records through a Kafka REST proxy (`POST /topics/<topic>`).
pub struct RestProxyPublisher {
    client: reqwest::Client,
    base_url: String,
}

impl RestProxyPublisher {
    const CONTENT_TYPE: &'static str = "application/vnd.kafka.json.v2+json";

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EventPublisher for RestProxyPublisher {
    #[tracing::instrument(skip(self, event), fields(kind = event.kind()))]
    async fn publish(&self, topic: &str, event: &EnvironmentEvent) -> Result<()> {
        let url = format!("{}/topics/{}", self.base_url, topic);
        let res = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, Self::CONTENT_TYPE)
            .json(&json!({ "records": [{ "value": event }] }))
            .send()
            .await
            .map_err(|e| EnvironmentError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(EnvironmentError::Publish {
                topic: topic.to_string(),
                reason: format!("proxy answered {status}: {body}"),
            });
        }
        tracing::debug!("message produced");
        Ok(())
    }
}

/// Used when no broker is configured: the envelope only goes to the log.
#[derive(Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, topic: &str, event: &EnvironmentEvent) -> Result<()> {
        let message = serde_json::to_string(event)?;
        tracing::info!(topic, %message, "environment event (no broker configured)");
        Ok(())
    }
}

/// Keeps published events in memory, in publish order.
#[derive(Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<(String, EnvironmentEvent)>>,
}

impl MemoryPublisher {
    pub fn events(&self) -> Vec<(String, EnvironmentEvent)> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, topic: &str, event: &EnvironmentEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((topic.to_string(), event.clone()));
        Ok(())
    }
}
