use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::model::RequestOptions;

/// Knowledge-map key whose value is used verbatim as the prompt.
pub const RAW_PROMPT_KEY: &str = "prompt";

/// Ordered string attributes handed to the prompt renderer.
pub type KnowledgeMap = BTreeMap<String, String>;

/// One normalized increment of a streaming answer.
///
/// A stream carries at most one chunk with `done = true`, always last, and
/// that chunk carries no text.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NormalizedChunk {
    /// Chain-of-thought text, when the backend exposes it.
    pub reasoning: String,
    /// Answer text.
    pub content: String,
    /// Marks the end of generation.
    pub done: bool,
}

impl NormalizedChunk {
    /// Non-terminal chunk carrying answer text.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            ..Self::default()
        }
    }

    /// Non-terminal chunk carrying reasoning text.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning: text.into(),
            ..Self::default()
        }
    }

    /// The bare terminal chunk.
    pub fn terminal() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }

    /// True when the chunk carries neither reasoning nor content.
    pub fn is_empty(&self) -> bool {
        self.reasoning.is_empty() && self.content.is_empty()
    }
}

/// A completed, non-streaming answer.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Analysis {
    pub reasoning: String,
    pub content: String,
}

/// The person a reading is produced for.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Subject {
    pub name: String,
    pub gender: String,
    pub birth_time: Option<NaiveDateTime>,
}

impl Subject {
    pub fn new(name: impl Into<String>, gender: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gender: gender.into(),
            birth_time: None,
        }
    }

    pub fn birth_time(mut self, birth_time: NaiveDateTime) -> Self {
        self.birth_time = Some(birth_time);
        self
    }
}

/// Input to a single provider call.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AnalysisRequest {
    pub subject: Subject,
    pub knowledge: KnowledgeMap,
    pub options: RequestOptions,
}

impl AnalysisRequest {
    /// Request for a full subject analysis.
    pub fn for_subject(subject: Subject, knowledge: KnowledgeMap) -> Self {
        Self {
            subject,
            knowledge,
            options: RequestOptions::default(),
        }
    }

    /// Request whose prompt is sent as-is (follow-up questions).
    pub fn raw_prompt(prompt: impl Into<String>) -> Self {
        let mut knowledge = KnowledgeMap::new();
        knowledge.insert(RAW_PROMPT_KEY.to_string(), prompt.into());
        Self {
            knowledge,
            ..Self::default()
        }
    }

    /// Adds one knowledge attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.knowledge.insert(key.into(), value.into());
        self
    }

    /// Sets the caller deadline for the whole call.
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Renders the prompt text sent to the backend.
    pub fn prompt_text(&self) -> String {
        crate::prompt::render(self)
    }
}
