//! Core data types: providers, task kinds and tasks.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Highest priority a task may carry.
pub const MAX_PRIORITY: u8 = 10;

/// Priority assigned to tasks that do not specify one.
pub const DEFAULT_PRIORITY: u8 = 5;

/// Errors raised while constructing a task.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Priority {0} out of range (0..=10)")]
    PriorityOutOfRange(u8),

    #[error("Unknown task kind: '{0}'")]
    UnknownKind(String),
}

/// Identifier of a backend provider.
///
/// Providers are named by configuration, so the identifier is an owned
/// string rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Create a provider identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The premium hosted provider of the built-in registry.
    pub fn azure_openai() -> Self {
        Self::new("azure_openai")
    }

    /// The always-available degraded provider of the built-in registry.
    pub fn fallback() -> Self {
        Self::new("fallback")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A feature a provider may or may not offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Vision,
    Embeddings,
    Streaming,
}

/// The kind of work a task asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    TextGeneration,
    Vision,
    Embedding,
    Streaming,
}

impl TaskKind {
    /// All task kinds, in declaration order.
    pub const ALL: [TaskKind; 4] = [
        TaskKind::TextGeneration,
        TaskKind::Vision,
        TaskKind::Embedding,
        TaskKind::Streaming,
    ];

    /// The capability a provider needs to serve this kind, if any.
    pub fn required_capability(self) -> Option<Capability> {
        match self {
            TaskKind::TextGeneration => None,
            TaskKind::Vision => Some(Capability::Vision),
            TaskKind::Embedding => Some(Capability::Embeddings),
            TaskKind::Streaming => Some(Capability::Streaming),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::TextGeneration => "text_generation",
            TaskKind::Vision => "vision",
            TaskKind::Embedding => "embedding",
            TaskKind::Streaming => "streaming",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TaskError::UnknownKind(s.to_string()))
    }
}

/// One unit of work to be routed.
///
/// Tasks are immutable once built: the builder methods consume the task
/// and hand back a new value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    kind: TaskKind,
    content: JsonValue,
    priority: u8,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    options: BTreeMap<String, JsonValue>,
}

impl Task {
    /// Create a task with the default priority.
    pub fn new(kind: TaskKind, content: impl Into<JsonValue>) -> Self {
        Self {
            kind,
            content: content.into(),
            priority: DEFAULT_PRIORITY,
            options: BTreeMap::new(),
        }
    }

    /// Set the priority, rejecting values above [`MAX_PRIORITY`].
    pub fn with_priority(mut self, priority: u8) -> Result<Self, TaskError> {
        if priority > MAX_PRIORITY {
            return Err(TaskError::PriorityOutOfRange(priority));
        }
        self.priority = priority;
        Ok(self)
    }

    /// Attach a caller-defined option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn content(&self) -> &JsonValue {
        &self.content
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn options(&self) -> &BTreeMap<String, JsonValue> {
        &self.options
    }

    /// Length of the payload in characters.
    ///
    /// Strings count their characters; any other payload counts the
    /// characters of its compact JSON rendering.
    pub fn content_len(&self) -> usize {
        match &self.content {
            JsonValue::String(s) => s.chars().count(),
            other => other.to_string().chars().count(),
        }
    }

    /// Short human-readable description of the payload.
    pub fn content_preview(&self, max_chars: usize) -> String {
        match &self.content {
            JsonValue::String(s) => {
                if s.chars().count() > max_chars {
                    let head: String = s.chars().take(max_chars).collect();
                    format!("{}...", head)
                } else {
                    s.clone()
                }
            }
            JsonValue::Array(items) => format!("List with {} items", items.len()),
            JsonValue::Object(map) => {
                let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
                format!("Object with keys: {:?}", keys)
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_defaults() {
        let task = Task::new(TaskKind::TextGeneration, "hello");
        assert_eq!(task.priority(), DEFAULT_PRIORITY);
        assert!(task.options().is_empty());
        assert_eq!(task.content_len(), 5);
    }

    #[test]
    fn test_priority_bounds() {
        assert!(Task::new(TaskKind::Vision, "x").with_priority(0).is_ok());
        assert!(Task::new(TaskKind::Vision, "x").with_priority(10).is_ok());
        assert_eq!(
            Task::new(TaskKind::Vision, "x").with_priority(11),
            Err(TaskError::PriorityOutOfRange(11))
        );
    }

    #[test]
    fn test_content_len_counts_chars_not_bytes() {
        let task = Task::new(TaskKind::TextGeneration, "héllo");
        assert_eq!(task.content_len(), 5);

        let structured = Task::new(TaskKind::Embedding, serde_json::json!({"a": 1}));
        assert_eq!(structured.content_len(), r#"{"a":1}"#.len());
    }

    #[test]
    fn test_content_preview() {
        let task = Task::new(TaskKind::TextGeneration, "abcdefgh");
        assert_eq!(task.content_preview(3), "abc...");
        assert_eq!(task.content_preview(20), "abcdefgh");

        let list = Task::new(TaskKind::Embedding, serde_json::json!([1, 2, 3]));
        assert_eq!(list.content_preview(10), "List with 3 items");
    }

    #[test]
    fn test_required_capability() {
        assert_eq!(TaskKind::TextGeneration.required_capability(), None);
        assert_eq!(TaskKind::Vision.required_capability(), Some(Capability::Vision));
        assert_eq!(
            TaskKind::Embedding.required_capability(),
            Some(Capability::Embeddings)
        );
        assert_eq!(
            TaskKind::Streaming.required_capability(),
            Some(Capability::Streaming)
        );
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("vision".parse::<TaskKind>(), Ok(TaskKind::Vision));
        assert_eq!("TEXT_GENERATION".parse::<TaskKind>(), Ok(TaskKind::TextGeneration));
        assert!(matches!(
            "audio".parse::<TaskKind>(),
            Err(TaskError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_kind_serde_snake_case() {
        let json = serde_json::to_string(&TaskKind::TextGeneration).unwrap();
        assert_eq!(json, "\"text_generation\"");
    }
}
