//! Content-part endpoints of a topic version.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::client::SCOPE;
use crate::error::ApiError;
use crate::session::Session;

pub struct PartService {
    session: Arc<Session>,
}

impl PartService {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub async fn list(&self, topic_id: &str, topic_version_id: &str) -> Result<Value, ApiError> {
        self.session
            .get(&format!("v2/{SCOPE}/topic/{topic_id}/topicVersion/{topic_version_id}/part"))
            .await
    }

    pub async fn create(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        name: &str,
        content: &Value,
    ) -> Result<(), ApiError> {
        debug!(topic_id = %topic_id, part = %name, "creating part");
        self.session
            .post(
                &format!("v2/{SCOPE}/topic/{topic_id}/topicVersion/{topic_version_id}/part"),
                &json!({ "name": name, "content": content }),
            )
            .await?;
        Ok(())
    }

    /// Replace a part's content. The server creates the part if it does not
    /// exist yet, so imports do not need a list-then-branch step.
    pub async fn update(
        &self,
        topic_id: &str,
        topic_version_id: &str,
        name: &str,
        content: &Value,
    ) -> Result<(), ApiError> {
        debug!(topic_id = %topic_id, part = %name, "updating part");
        self.session
            .put(
                &format!(
                    "v2/{SCOPE}/topic/{topic_id}/topicVersion/{topic_version_id}/part/{name}"
                ),
                &json!({ "name": name, "content": content }),
            )
            .await?;
        Ok(())
    }
}
