//! Workflow-state endpoints: checkout and checkin.
//!
//! The CMS requires a topic version to be checked out before its parts or
//! metadata may change, and checked in afterwards to publish the edit.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::client::{TopicVersion, SCOPE};
use crate::error::ApiError;
use crate::session::Session;

pub struct CheckoutService {
    session: Arc<Session>,
}

impl CheckoutService {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Check a topic out for editing. Returns the editable version handle,
    /// which may differ from the one returned at creation.
    pub async fn checkout(&self, topic_id: &str) -> Result<TopicVersion, ApiError> {
        debug!(topic_id = %topic_id, "checking out");
        let response = self
            .session
            .post(
                &format!("v3/{SCOPE}/topic/{topic_id}/workflowstate"),
                &json!({ "action": "CheckOut" }),
            )
            .await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn checkin(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        comment: &str,
    ) -> Result<(), ApiError> {
        debug!(topic_id = %topic_id, "checking in");
        self.session
            .post(
                &format!(
                    "v4/{SCOPE}/topic/{topic_id}/topicVersion/{topic_version_id}/workflowstate"
                ),
                &json!({
                    "action": "CheckIn",
                    "isExternal": false,
                    "comment": comment,
                }),
            )
            .await?;
        Ok(())
    }
}
