//! Topic lifecycle endpoints: create, read, metadata, delete, export.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::client::{CreateTopic, TopicSummary, TopicVersion, SCOPE};
use crate::error::ApiError;
use crate::session::Session;

pub struct TopicService {
    session: Arc<Session>,
}

impl TopicService {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Create a topic. The server treats an existing `topicId` as a new
    /// version of the same topic, so re-running an import is safe.
    pub async fn create(&self, topic: &CreateTopic) -> Result<TopicVersion, ApiError> {
        debug!(topic_id = %topic.topic_id, title = %topic.topic_title, "creating topic");
        let body = serde_json::to_value(topic)?;
        let response = self.session.post(&format!("v4/{SCOPE}/topic"), &body).await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn get(&self, topic_id: &str) -> Result<TopicSummary, ApiError> {
        let response = self.session.get(&format!("v1/{SCOPE}/topic/{topic_id}")).await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn update_metadata(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        metadata: &Map<String, Value>,
    ) -> Result<(), ApiError> {
        debug!(topic_id = %topic_id, "updating topic metadata");
        self.session
            .put(
                &format!(
                    "v2/{SCOPE}/topic/{topic_id}/topicVersion/{topic_version_id}/topicversionmetadata"
                ),
                &json!({ "data": metadata }),
            )
            .await?;
        Ok(())
    }

    pub async fn delete(&self, topic_id: &str, topic_version_id: &str) -> Result<(), ApiError> {
        debug!(topic_id = %topic_id, "deleting topic");
        self.session
            .delete(&format!("v3/{SCOPE}/topic/{topic_id}/topicVersion/{topic_version_id}"))
            .await?;
        Ok(())
    }

    /// Full project export.
    pub async fn export(&self) -> Result<Value, ApiError> {
        self.session.get(&format!("v1/{SCOPE}/export")).await
    }
}
