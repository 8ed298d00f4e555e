//! Client contract for the CMS, and its HTTP implementation.
//!
//! The importer talks to the CMS through the [`CmsClient`] trait so its
//! orchestration can be tested against a mock. [`DelphiClient`] implements
//! it by delegating to one service per API surface, all sharing a session.

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-client-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::checkout::CheckoutService;
use crate::error::ApiError;
use crate::parts::PartService;
use crate::relations::RelationService;
use crate::session::Session;
use crate::topic::TopicService;

/// Path segment carried by every scoped endpoint; the session substitutes
/// the placeholders.
pub(crate) const SCOPE: &str = "tenant/{tenantId}/project/{projectId}/acl/{aclEntryId}";

/// Payload for topic creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTopic {
    pub topic_id: String,
    pub topic_title: String,
    pub topic_type_id: Uuid,
    pub topic_type_namespace: String,
    pub copy_parent_tags: bool,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_topic_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Version handle returned by create and checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicVersion {
    #[serde(rename = "topicVersionId", alias = "topicVersionKey")]
    pub topic_version_id: String,
}

/// Topic record as returned by the read endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TopicSummary {
    pub topic_id: Option<String>,
    pub topic_title: Option<String>,
    #[serde(alias = "topicVersionKey")]
    pub topic_version_id: Option<String>,
    pub children: Vec<String>,
}

/// Everything the importer needs from the CMS.
#[cfg_attr(any(test, feature = "test-client-mocks"), automock)]
#[async_trait]
pub trait CmsClient: Send + Sync {
    async fn create_topic(&self, topic: &CreateTopic) -> Result<TopicVersion, ApiError>;
    async fn get_topic(&self, topic_id: &str) -> Result<TopicSummary, ApiError>;
    async fn update_metadata(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        metadata: &Map<String, Value>,
    ) -> Result<(), ApiError>;
    async fn delete_topic(&self, topic_id: &str, topic_version_id: &str) -> Result<(), ApiError>;
    async fn checkout(&self, topic_id: &str) -> Result<TopicVersion, ApiError>;
    async fn checkin(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        comment: &str,
    ) -> Result<(), ApiError>;
    async fn get_parts(&self, topic_id: &str, topic_version_id: &str) -> Result<Value, ApiError>;
    async fn create_part(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        name: &str,
        content: &Value,
    ) -> Result<(), ApiError>;
    async fn update_part(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        name: &str,
        content: &Value,
    ) -> Result<(), ApiError>;
    async fn add_relation(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        relation_type_id: &str,
        target_topic_ids: &[String],
    ) -> Result<(), ApiError>;
    async fn add_tag(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        hierarchy_topic_id: &str,
        hierarchy_node_id: &str,
    ) -> Result<(), ApiError>;
    async fn export(&self) -> Result<Value, ApiError>;
}

/// HTTP client for the AskDelphi CMS, one service per API surface.
pub struct DelphiClient {
    topics: TopicService,
    checkout: CheckoutService,
    parts: PartService,
    relations: RelationService,
}

impl DelphiClient {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            topics: TopicService::new(Arc::clone(&session)),
            checkout: CheckoutService::new(Arc::clone(&session)),
            parts: PartService::new(Arc::clone(&session)),
            relations: RelationService::new(session),
        }
    }
}

#[async_trait]
impl CmsClient for DelphiClient {
    async fn create_topic(&self, topic: &CreateTopic) -> Result<TopicVersion, ApiError> {
        self.topics.create(topic).await
    }

    async fn get_topic(&self, topic_id: &str) -> Result<TopicSummary, ApiError> {
        self.topics.get(topic_id).await
    }

    async fn update_metadata(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        metadata: &Map<String, Value>,
    ) -> Result<(), ApiError> {
        self.topics.update_metadata(topic_id, topic_version_id, metadata).await
    }

    async fn delete_topic(&self, topic_id: &str, topic_version_id: &str) -> Result<(), ApiError> {
        self.topics.delete(topic_id, topic_version_id).await
    }

    async fn checkout(&self, topic_id: &str) -> Result<TopicVersion, ApiError> {
        self.checkout.checkout(topic_id).await
    }

    async fn checkin(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        comment: &str,
    ) -> Result<(), ApiError> {
        self.checkout.checkin(topic_id, topic_version_id, comment).await
    }

    async fn get_parts(&self, topic_id: &str, topic_version_id: &str) -> Result<Value, ApiError> {
        self.parts.list(topic_id, topic_version_id).await
    }

    async fn create_part(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        name: &str,
        content: &Value,
    ) -> Result<(), ApiError> {
        self.parts.create(topic_id, topic_version_id, name, content).await
    }

    async fn update_part(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        name: &str,
        content: &Value,
    ) -> Result<(), ApiError> {
        self.parts.update(topic_id, topic_version_id, name, content).await
    }

    async fn add_relation(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        relation_type_id: &str,
        target_topic_ids: &[String],
    ) -> Result<(), ApiError> {
        self.relations
            .add_relation(topic_id, topic_version_id, relation_type_id, target_topic_ids)
            .await
    }

    async fn add_tag(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        hierarchy_topic_id: &str,
        hierarchy_node_id: &str,
    ) -> Result<(), ApiError> {
        self.relations
            .add_tag(topic_id, topic_version_id, hierarchy_topic_id, hierarchy_node_id)
            .await
    }

    async fn export(&self) -> Result<Value, ApiError> {
        self.topics.export().await
    }
}
