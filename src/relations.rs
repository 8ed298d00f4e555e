//! Relation and tag endpoints of a topic version.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::client::SCOPE;
use crate::error::ApiError;
use crate::session::Session;

pub struct RelationService {
    session: Arc<Session>,
}

impl RelationService {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub async fn add_relation(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        relation_type_id: &str,
        target_topic_ids: &[String],
    ) -> Result<(), ApiError> {
        debug!(
            topic_id = %topic_id,
            relation_type = %relation_type_id,
            targets = target_topic_ids.len(),
            "adding relation"
        );
        self.session
            .post(
                &format!(
                    "v2/{SCOPE}/topic/{topic_id}/topicVersion/{topic_version_id}/relation"
                ),
                &json!({
                    "relationTypeId": relation_type_id,
                    "sourceTopicId": topic_id,
                    "targetTopicIds": target_topic_ids,
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn add_tag(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        hierarchy_topic_id: &str,
        hierarchy_node_id: &str,
    ) -> Result<(), ApiError> {
        debug!(topic_id = %topic_id, node = %hierarchy_node_id, "adding tag");
        self.session
            .post(
                &format!("v2/{SCOPE}/topic/{topic_id}/topicVersion/{topic_version_id}/tag"),
                &json!({
                    "tags": [{
                        "hierarchyTopicId": hierarchy_topic_id,
                        "hierarchyNodeId": hierarchy_node_id,
                    }],
                }),
            )
            .await?;
        Ok(())
    }
}
