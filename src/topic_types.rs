//! Topic type catalog.
//!
//! Every topic created in the CMS carries a type key and namespace. The
//! catalog resolves incoming type hints (explicit UUID, title, legacy title
//! field) to a registered type, with per-level defaults as a last resort.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::{uuid, Uuid};

pub const HOMEPAGE_TYPE_TITLE: &str = "Digitale Coach Homepagina";
pub const PROCESS_PAGE_TYPE_TITLE: &str = "Digitale Coach Procespagina";
pub const TASK_TYPE_TITLE: &str = "Task";
pub const STEP_TYPE_TITLE: &str = "Digitale Coach Stap";
pub const INSTRUCTION_TYPE_TITLE: &str = "Digitale Coach Instructie";

const DIGITAL_COACH_NAMESPACE: &str = "AskDelphi.DigitalCoach";

/// A registered topic type as the CMS knows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicType {
    pub key: Uuid,
    pub title: String,
    pub namespace: String,
}

impl TopicType {
    fn new(key: Uuid, title: &str, namespace: &str) -> Self {
        Self {
            key,
            title: title.to_string(),
            namespace: namespace.to_string(),
        }
    }
}

/// Lookup table over the registered topic types.
#[derive(Debug, Clone)]
pub struct TypeCatalog {
    types: Vec<TopicType>,
    by_key: HashMap<Uuid, usize>,
    by_title: HashMap<String, usize>,
}

impl TypeCatalog {
    pub fn with_types(types: Vec<TopicType>) -> Self {
        let mut by_key = HashMap::new();
        let mut by_title = HashMap::new();
        for (index, topic_type) in types.iter().enumerate() {
            by_key.insert(topic_type.key, index);
            by_title.entry(topic_type.title.clone()).or_insert(index);
        }
        Self { types, by_key, by_title }
    }

    /// The built-in digital coach type set.
    pub fn digital_coach() -> Self {
        Self::with_types(vec![
            TopicType::new(
                uuid!("a1b2c3d4-e5f6-47a8-b9c0-d1e2f3a4b5c6"),
                HOMEPAGE_TYPE_TITLE,
                DIGITAL_COACH_NAMESPACE,
            ),
            TopicType::new(
                uuid!("b2c3d4e5-f6a7-48b9-c0d1-e2f3a4b5c6d7"),
                PROCESS_PAGE_TYPE_TITLE,
                DIGITAL_COACH_NAMESPACE,
            ),
            TopicType::new(
                uuid!("6aba8437-c8df-42d2-a868-840847c124ca"),
                TASK_TYPE_TITLE,
                "http://tempuri.org/imola-task",
            ),
            TopicType::new(
                uuid!("c3d4e5f6-a7b8-49ca-d1e2-f3a4b5c6d7e8"),
                STEP_TYPE_TITLE,
                DIGITAL_COACH_NAMESPACE,
            ),
            TopicType::new(
                uuid!("d4e5f6a7-b8c9-4adb-e2f3-a4b5c6d7e8f9"),
                INSTRUCTION_TYPE_TITLE,
                DIGITAL_COACH_NAMESPACE,
            ),
            TopicType::new(
                uuid!("38a23602-65f5-4d32-96c5-770280116f8e"),
                "Homepage",
                "http://tempuri.org/homepage",
            ),
            TopicType::new(
                uuid!("c1225506-63e2-4785-9e51-06a587d54a9c"),
                "Questionnaire",
                "http://tempuri.org/questionnaire",
            ),
            TopicType::new(
                uuid!("b740c526-a677-4663-8704-c1db9767f9a5"),
                "Video",
                "http://tempuri.org/video",
            ),
            TopicType::new(
                uuid!("4a50fb1c-8645-4bb7-b5c9-d74a98181d73"),
                "Image",
                "http://tempuri.org/image",
            ),
            TopicType::new(
                uuid!("776892da-9f31-4856-8f3d-9196fceb3755"),
                "Hierarchy",
                "http://tempuri.org/hierarchy",
            ),
            TopicType::new(
                uuid!("e647b854-7f0c-4268-9946-f49935795bc7"),
                "Simple topic",
                "http://tempuri.org/simple-topic",
            ),
            TopicType::new(
                uuid!("ee51338e-4057-4beb-9223-bf40d1a43336"),
                "Collection",
                "http://tempuri.org/collection",
            ),
        ])
    }

    pub fn by_key(&self, key: &Uuid) -> Option<&TopicType> {
        self.by_key.get(key).map(|&index| &self.types[index])
    }

    pub fn by_title(&self, title: &str) -> Option<&TopicType> {
        self.by_title.get(title).map(|&index| &self.types[index])
    }

    /// First registered type, used when nothing else resolves.
    pub fn fallback(&self) -> Option<&TopicType> {
        self.types.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_by_key_and_title() {
        let catalog = TypeCatalog::digital_coach();
        let task = catalog.by_title(TASK_TYPE_TITLE).expect("task type");
        assert_eq!(task.namespace, "http://tempuri.org/imola-task");
        assert_eq!(catalog.by_key(&task.key), Some(task));
    }

    #[test]
    fn unknown_lookups_return_none() {
        let catalog = TypeCatalog::digital_coach();
        assert!(catalog.by_title("No Such Type").is_none());
        assert!(catalog.by_key(&Uuid::nil()).is_none());
    }

    #[test]
    fn fallback_is_the_first_registered_type() {
        let catalog = TypeCatalog::digital_coach();
        assert_eq!(
            catalog.fallback().map(|t| t.title.as_str()),
            Some(HOMEPAGE_TYPE_TITLE)
        );
        assert!(TypeCatalog::with_types(Vec::new()).fallback().is_none());
    }
}
