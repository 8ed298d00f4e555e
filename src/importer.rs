//! Walks a topic tree and replays it against the CMS.
//!
//! Each node is created, filled (content part, metadata), enriched
//! (relations, tags) and then its children are imported, parent before
//! child so every `parentTopicId` already exists. Enrichment failures are
//! logged and skipped; creation and content failures abort the run.

use std::future::Future;
use std::pin::Pin;

use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::client::{CmsClient, CreateTopic};
use crate::error::ApiError;
use crate::mapper::TopicNode;

/// Comment recorded on every checkin.
const CHECKIN_COMMENT: &str = "Imported by delphi-sync";

const CONTENT_PART_NAME: &str = "contentPart";

/// Imports topic trees over any [`CmsClient`].
pub struct Importer<C: CmsClient> {
    client: C,
    skip_checkout_checkin: bool,
    language: String,
}

impl<C: CmsClient> Importer<C> {
    pub fn new(client: C, skip_checkout_checkin: bool, language: impl Into<String>) -> Self {
        Self {
            client,
            skip_checkout_checkin,
            language: language.into(),
        }
    }

    /// Import the whole tree, roots first.
    pub async fn import_topics(&self, nodes: &[TopicNode]) -> Result<(), ApiError> {
        info!(roots = nodes.len(), "starting import");
        for node in nodes {
            self.import_node(node).await?;
        }
        info!("import finished");
        Ok(())
    }

    // Boxed future because the tree depth is data-driven.
    fn import_node<'a>(
        &'a self,
        node: &'a TopicNode,
    ) -> Pin<Box<dyn Future<Output = Result<(), ApiError>> + Send + 'a>> {
        Box::pin(async move {
            let create = CreateTopic {
                topic_id: node.id.clone(),
                topic_title: node.title.clone(),
                topic_type_id: node.topic_type.key,
                topic_type_namespace: node.topic_type.namespace.clone(),
                copy_parent_tags: false,
                language: self.language.clone(),
                parent_topic_id: node.parent_id.clone(),
                description: node
                    .metadata
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                tags: node.tags.clone(),
            };

            info!(topic_id = %node.id, title = %node.title, "importing topic");
            let version = match self.client.create_topic(&create).await {
                Ok(version) => version,
                Err(err) => {
                    error!(
                        topic_id = %node.id,
                        error = %err,
                        payload = %serde_json::to_string(&create).unwrap_or_default(),
                        "topic creation failed"
                    );
                    return Err(err);
                }
            };

            if self.skip_checkout_checkin {
                self.apply_content(node, &version.topic_version_id).await?;
                self.apply_enrichment(node, &version.topic_version_id).await;
            } else {
                // The checkout may hand back a different editable version.
                let editable = self.client.checkout(&node.id).await?;
                self.apply_content(node, &editable.topic_version_id).await?;
                self.apply_enrichment(node, &editable.topic_version_id).await;
                self.client
                    .checkin(&node.id, &editable.topic_version_id, CHECKIN_COMMENT)
                    .await?;
            }

            for child in &node.children {
                self.import_node(child).await?;
            }
            Ok(())
        })
    }

    async fn apply_content(&self, node: &TopicNode, version_id: &str) -> Result<(), ApiError> {
        if let Some(content) = &node.content {
            self.client
                .update_part(&node.id, version_id, CONTENT_PART_NAME, &json!({ "text": content }))
                .await?;
        }
        if !node.metadata.is_empty() {
            self.client
                .update_metadata(&node.id, version_id, &node.metadata)
                .await?;
        }
        Ok(())
    }

    /// Relations and tags are best-effort; a failure never aborts the import.
    async fn apply_enrichment(&self, node: &TopicNode, version_id: &str) {
        for (relation_type_id, targets) in &node.relations {
            if targets.is_empty() {
                continue;
            }
            if let Err(err) = self
                .client
                .add_relation(&node.id, version_id, relation_type_id, targets)
                .await
            {
                warn!(
                    topic_id = %node.id,
                    relation_type = %relation_type_id,
                    error = %err,
                    "could not add relation, continuing"
                );
            }
        }
        for tag in &node.tags {
            // Hierarchy tags are written as "hierarchyTopicId/nodeId";
            // plain tags already travelled with the create payload.
            let Some((hierarchy_topic_id, hierarchy_node_id)) = tag.split_once('/') else {
                continue;
            };
            if let Err(err) = self
                .client
                .add_tag(&node.id, version_id, hierarchy_topic_id, hierarchy_node_id)
                .await
            {
                warn!(topic_id = %node.id, tag = %tag, error = %err, "could not add tag, continuing");
            }
        }
    }

    /// Delete a topic and all of its descendants, children first.
    ///
    /// A child that cannot be fetched or deleted is logged and skipped so
    /// its siblings still get cleaned up; failure to delete the topic
    /// itself propagates.
    pub fn delete_topic_recursive<'a>(
        &'a self,
        topic_id: &'a str,
        topic_version_id: &'a str,
        child_ids: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<(), ApiError>> + Send + 'a>> {
        Box::pin(async move {
            for child_id in child_ids {
                let child = match self.client.get_topic(child_id).await {
                    Ok(child) => child,
                    Err(err) => {
                        warn!(topic_id = %child_id, error = %err, "could not fetch child, skipping");
                        continue;
                    }
                };
                let Some(child_version) = child.topic_version_id else {
                    warn!(topic_id = %child_id, "child has no version id, skipping");
                    continue;
                };
                if let Err(err) = self
                    .delete_topic_recursive(child_id, &child_version, &child.children)
                    .await
                {
                    warn!(topic_id = %child_id, error = %err, "could not delete child, skipping");
                }
            }
            info!(topic_id = %topic_id, "deleting topic");
            self.client.delete_topic(topic_id, topic_version_id).await
        })
    }
}
