//! Maps a digital coach process document onto a topic tree.
//!
//! The input is a process with tasks, steps and instructions (or a
//! flattened variant with steps directly under the process). The output is
//! a single homepage root whose descendants carry resolved topic types,
//! parent links, metadata, tags and relations.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::topic_types::{
    TopicType, TypeCatalog, HOMEPAGE_TYPE_TITLE, INSTRUCTION_TYPE_TITLE, STEP_TYPE_TITLE,
    TASK_TYPE_TITLE,
};

const DEFAULT_HOMEPAGE_ID: &str = "dc-home";
const DEFAULT_HOMEPAGE_TITLE: &str = "Digitale Coach";

/// Top-level input document.
#[derive(Debug, Deserialize)]
pub struct ProcessDocument {
    pub process: Process,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Process {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub topic_type_id: Option<String>,
    pub topic_type_title: Option<String>,
    #[serde(rename = "topicType")]
    pub legacy_topic_type: Option<String>,
    pub tags: Vec<String>,
    pub relations: BTreeMap<String, Vec<String>>,
    pub metadata: Map<String, Value>,
    pub tasks: Vec<Task>,
    /// Flattened documents place steps directly under the process.
    pub steps: Vec<Step>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Task {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub topic_type_id: Option<String>,
    pub topic_type_title: Option<String>,
    #[serde(rename = "topicType")]
    pub legacy_topic_type: Option<String>,
    pub tags: Vec<String>,
    pub relations: BTreeMap<String, Vec<String>>,
    pub metadata: Map<String, Value>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Step {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub topic_type_id: Option<String>,
    pub topic_type_title: Option<String>,
    #[serde(rename = "topicType")]
    pub legacy_topic_type: Option<String>,
    pub tags: Vec<String>,
    pub relations: BTreeMap<String, Vec<String>>,
    pub metadata: Map<String, Value>,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Instruction {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub topic_type_id: Option<String>,
    pub topic_type_title: Option<String>,
    #[serde(rename = "topicType")]
    pub legacy_topic_type: Option<String>,
    pub tags: Vec<String>,
    pub relations: BTreeMap<String, Vec<String>>,
    pub metadata: Map<String, Value>,
}

/// One node of the import tree, ready for the importer.
#[derive(Debug, Clone)]
pub struct TopicNode {
    pub id: String,
    pub title: String,
    pub topic_type: TopicType,
    pub parent_id: Option<String>,
    pub content: Option<String>,
    pub metadata: Map<String, Value>,
    pub tags: Vec<String>,
    pub relations: BTreeMap<String, Vec<String>>,
    pub children: Vec<TopicNode>,
}

/// Transforms process documents into topic trees using a type catalog.
pub struct Mapper {
    catalog: TypeCatalog,
}

impl Mapper {
    pub fn new(catalog: TypeCatalog) -> Self {
        Self { catalog }
    }

    /// Map a process onto a tree with a single homepage root. Flattened
    /// documents (steps directly under the process) hang their steps off
    /// the homepage with no task tier.
    pub fn map(&self, process: &Process) -> Vec<TopicNode> {
        let home_id = process
            .id
            .clone()
            .unwrap_or_else(|| DEFAULT_HOMEPAGE_ID.to_string());
        let mut root = TopicNode {
            id: home_id.clone(),
            title: process
                .title
                .clone()
                .unwrap_or_else(|| DEFAULT_HOMEPAGE_TITLE.to_string()),
            topic_type: self.resolve_type(
                process.topic_type_id.as_deref(),
                process.topic_type_title.as_deref(),
                process.legacy_topic_type.as_deref(),
                HOMEPAGE_TYPE_TITLE,
            ),
            parent_id: None,
            content: None,
            metadata: with_description(&process.metadata, &process.description),
            tags: process.tags.clone(),
            relations: process.relations.clone(),
            children: Vec::new(),
        };

        for (index, task) in process.tasks.iter().enumerate() {
            root.children.push(self.map_task(task, index, &home_id));
        }
        for (index, step) in process.steps.iter().enumerate() {
            root.children.push(self.map_step(step, index, &home_id));
        }

        debug!(
            root = %root.id,
            children = root.children.len(),
            "process mapped to topic tree"
        );
        vec![root]
    }

    fn map_task(&self, task: &Task, index: usize, parent_id: &str) -> TopicNode {
        let id = task
            .id
            .clone()
            .unwrap_or_else(|| format!("{parent_id}-task-{}", index + 1));
        let mut node = TopicNode {
            id: id.clone(),
            title: task.title.clone().unwrap_or_else(|| format!("Taak {}", index + 1)),
            topic_type: self.resolve_type(
                task.topic_type_id.as_deref(),
                task.topic_type_title.as_deref(),
                task.legacy_topic_type.as_deref(),
                TASK_TYPE_TITLE,
            ),
            parent_id: Some(parent_id.to_string()),
            content: None,
            metadata: with_description(&task.metadata, &task.description),
            tags: task.tags.clone(),
            relations: task.relations.clone(),
            children: Vec::new(),
        };
        for (step_index, step) in task.steps.iter().enumerate() {
            node.children.push(self.map_step(step, step_index, &id));
        }
        node
    }

    fn map_step(&self, step: &Step, index: usize, parent_id: &str) -> TopicNode {
        let id = step
            .id
            .clone()
            .unwrap_or_else(|| format!("{parent_id}-step-{}", index + 1));
        let mut node = TopicNode {
            id: id.clone(),
            title: step.title.clone().unwrap_or_else(|| format!("Stap {}", index + 1)),
            topic_type: self.resolve_type(
                step.topic_type_id.as_deref(),
                step.topic_type_title.as_deref(),
                step.legacy_topic_type.as_deref(),
                STEP_TYPE_TITLE,
            ),
            parent_id: Some(parent_id.to_string()),
            content: None,
            metadata: with_description(&step.metadata, &step.description),
            tags: step.tags.clone(),
            relations: step.relations.clone(),
            children: Vec::new(),
        };
        for (instruction_index, instruction) in step.instructions.iter().enumerate() {
            node.children
                .push(self.map_instruction(instruction, instruction_index, &id));
        }
        node
    }

    fn map_instruction(
        &self,
        instruction: &Instruction,
        index: usize,
        parent_id: &str,
    ) -> TopicNode {
        TopicNode {
            id: instruction
                .id
                .clone()
                .unwrap_or_else(|| format!("{parent_id}-instr-{}", index + 1)),
            title: instruction
                .title
                .clone()
                .unwrap_or_else(|| format!("Instructie {}", index + 1)),
            topic_type: self.resolve_type(
                instruction.topic_type_id.as_deref(),
                instruction.topic_type_title.as_deref(),
                instruction.legacy_topic_type.as_deref(),
                INSTRUCTION_TYPE_TITLE,
            ),
            parent_id: Some(parent_id.to_string()),
            content: instruction.content.clone(),
            metadata: with_description(&instruction.metadata, &instruction.description),
            tags: instruction.tags.clone(),
            relations: instruction.relations.clone(),
            children: Vec::new(),
        }
    }

    /// Resolve a topic type from the strongest hint available:
    /// explicit UUID, then explicit title, then the legacy title field,
    /// then the per-level default.
    fn resolve_type(
        &self,
        type_id: Option<&str>,
        type_title: Option<&str>,
        legacy_title: Option<&str>,
        level_default: &str,
    ) -> TopicType {
        if let Some(raw) = type_id {
            if let Ok(key) = raw.parse::<Uuid>() {
                if let Some(topic_type) = self.catalog.by_key(&key) {
                    return topic_type.clone();
                }
                warn!(key = %key, "topic type id not in catalog, falling back to title");
            } else {
                warn!(value = %raw, "topic type id is not a UUID, falling back to title");
            }
        }
        if let Some(title) = type_title {
            if let Some(topic_type) = self.catalog.by_title(title) {
                return topic_type.clone();
            }
            warn!(title = %title, "topic type title not in catalog");
        }
        if let Some(title) = legacy_title {
            if let Some(topic_type) = self.catalog.by_title(title) {
                return topic_type.clone();
            }
        }
        self.catalog
            .by_title(level_default)
            .or_else(|| self.catalog.fallback())
            .cloned()
            .unwrap_or_else(|| TopicType {
                key: Uuid::nil(),
                title: level_default.to_string(),
                namespace: String::new(),
            })
    }
}

fn with_description(
    metadata: &Map<String, Value>,
    description: &Option<String>,
) -> Map<String, Value> {
    let mut merged = metadata.clone();
    if let Some(description) = description {
        merged
            .entry("description".to_string())
            .or_insert_with(|| Value::String(description.clone()));
    }
    merged
}
