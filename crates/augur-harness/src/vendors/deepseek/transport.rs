use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::content::{Analysis, NormalizedChunk};
use crate::errors::ProviderError;
use crate::model::ProviderIdentity;

const PROVIDER: ProviderIdentity = ProviderIdentity::DeepseekRemote;
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_false")]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Default, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    #[serde(default)]
    message: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

impl Delta {
    fn into_chunk(self) -> NormalizedChunk {
        NormalizedChunk {
            reasoning: self.reasoning_content.unwrap_or_default(),
            content: self.content.unwrap_or_default(),
            done: false,
        }
    }
}

/// Decodes a non-streaming completion document.
pub(crate) fn parse_completion(body: &str) -> Result<Analysis, ProviderError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::parse(PROVIDER, format!("invalid completion JSON: {e}")))?;
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(ProviderError::parse(PROVIDER, "completion contained no choices"));
    };
    let chunk = choice.message.into_chunk();
    Ok(Analysis {
        reasoning: chunk.reasoning,
        content: chunk.content,
    })
}

/// Turns `data:` lines of the streaming body into normalized chunks.
///
/// Emits the terminal chunk exactly once, on the first stop reason or on the
/// `[DONE]` sentinel, and ignores everything after it.
#[derive(Debug, Default)]
pub(crate) struct DeltaNormalizer {
    finished: bool,
}

impl DeltaNormalizer {
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn push_line(&mut self, line: &str) -> Vec<NormalizedChunk> {
        if self.finished {
            return Vec::new();
        }
        let Some(data) = line.strip_prefix("data:").map(str::trim) else {
            return Vec::new();
        };
        if data.is_empty() {
            return Vec::new();
        }
        if data == DONE_SENTINEL {
            self.finished = true;
            return vec![NormalizedChunk::terminal()];
        }

        let frame: StreamFrame = match serde_json::from_str(data) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(provider = %PROVIDER, error = %err, "skipping malformed stream line");
                return Vec::new();
            }
        };
        let Some(choice) = frame.choices.into_iter().next() else {
            return Vec::new();
        };

        let mut chunks = Vec::with_capacity(2);
        let chunk = choice.delta.into_chunk();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        if choice
            .finish_reason
            .as_deref()
            .is_some_and(|reason| !reason.is_empty())
        {
            self.finished = true;
            chunks.push(NormalizedChunk::terminal());
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_line(content: &str, finish_reason: Option<&str>) -> String {
        let value = serde_json::json!({
            "choices": [{
                "delta": {"content": content},
                "finish_reason": finish_reason,
            }]
        });
        format!("data: {value}")
    }

    #[test]
    fn request_omits_stream_flag_when_false() {
        let body = ChatRequest {
            model: "deepseek-reasoner",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: 4096,
            stream: false,
        };
        let value = serde_json::to_value(&body).expect("json");
        assert!(value.get("stream").is_none());
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["max_tokens"], 4096);

        let value = serde_json::to_value(ChatRequest { stream: true, ..body }).expect("json");
        assert_eq!(value["stream"], true);
    }

    #[test]
    fn parses_completion_with_reasoning() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"answer","reasoning_content":"because"},"finish_reason":"stop"}]}"#;
        let analysis = parse_completion(body).expect("analysis");
        assert_eq!(analysis.content, "answer");
        assert_eq!(analysis.reasoning, "because");
    }

    #[test]
    fn completion_without_choices_is_a_parse_error() {
        let err = parse_completion(r#"{"choices":[]}"#).expect_err("error");
        assert!(matches!(err, ProviderError::Parse { .. }));
        let err = parse_completion("not json").expect_err("error");
        assert!(matches!(err, ProviderError::Parse { .. }));
    }

    #[test]
    fn maps_reasoning_and_content_deltas() {
        let mut normalizer = DeltaNormalizer::default();
        let chunks = normalizer.push_line(
            r#"data: {"choices":[{"delta":{"reasoning_content":"hmm","content":null},"finish_reason":null}]}"#,
        );
        assert_eq!(chunks, vec![NormalizedChunk::reasoning("hmm")]);
        let chunks = normalizer.push_line(&delta_line("Hel", None));
        assert_eq!(chunks, vec![NormalizedChunk::content("Hel")]);
    }

    #[test]
    fn stop_reason_with_content_is_split() {
        let mut normalizer = DeltaNormalizer::default();
        let chunks = normalizer.push_line(&delta_line("end.", Some("stop")));
        assert_eq!(
            chunks,
            vec![NormalizedChunk::content("end."), NormalizedChunk::terminal()]
        );
        assert!(normalizer.is_finished());
        assert!(normalizer.push_line("data: [DONE]").is_empty());
    }

    #[test]
    fn any_non_empty_finish_reason_is_terminal() {
        let mut normalizer = DeltaNormalizer::default();
        let chunks = normalizer.push_line(&delta_line("", Some("length")));
        assert_eq!(chunks, vec![NormalizedChunk::terminal()]);
    }

    #[test]
    fn done_sentinel_terminates_once() {
        let mut normalizer = DeltaNormalizer::default();
        assert_eq!(
            normalizer.push_line("data: [DONE]"),
            vec![NormalizedChunk::terminal()]
        );
        assert!(normalizer.push_line("data: [DONE]").is_empty());
        assert!(normalizer.push_line(&delta_line("late", None)).is_empty());
    }

    #[test]
    fn ignores_non_data_lines_and_empty_choices() {
        let mut normalizer = DeltaNormalizer::default();
        assert!(normalizer.push_line(": keep-alive").is_empty());
        assert!(normalizer.push_line("event: message").is_empty());
        assert!(normalizer.push_line(r#"data: {"choices":[]}"#).is_empty());
        assert!(!normalizer.is_finished());
    }

    #[test]
    fn malformed_line_is_skipped_without_changing_output() {
        let clean = vec![
            delta_line("a", None),
            delta_line("b", None),
            delta_line("", Some("stop")),
        ];
        let mut noisy = clean.clone();
        noisy.insert(1, "data: {\"choices\":[{\"delta\":".to_string());

        let run = |lines: &[String]| {
            let mut normalizer = DeltaNormalizer::default();
            lines
                .iter()
                .flat_map(|line| normalizer.push_line(line))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(&clean), run(&noisy));
    }
}
