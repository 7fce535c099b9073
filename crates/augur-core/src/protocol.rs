//! Downstream event protocol.
//!
//! Every event is one SSE frame. Named events carry an `event:` line; patch and
//! error events are unnamed. Patches follow a small JSON-patch-like shape:
//! `{"v": value, "p": path?, "o": op?}`.

use serde::Serialize;

use crate::sequencer::MessageIds;

pub const PATH_RESPONSE: &str = "response";
pub const PATH_CONTENT: &str = "response/content";
pub const PATH_THINKING_CONTENT: &str = "response/thinking_content";
pub const PATH_THINKING_ELAPSED: &str = "response/thinking_elapsed_secs";
pub const PATH_SEARCH_STATUS: &str = "response/search_status";
pub const PATH_ERROR: &str = "error";
pub const PATH_STATUS: &str = "status";
pub const PATH_TOKEN_USAGE: &str = "accumulated_token_usage";

pub const ASSISTANT_ROLE: &str = "ASSISTANT";

/// Lifecycle of a response as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Init,
    Wip,
    Answer,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Append,
    Set,
    Batch,
}

/// Value carried by a patch.
///
/// Serialized untagged, so the wire JSON is the bare value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PatchValue {
    Text(String),
    Int(i64),
    Status(ResponseStatus),
    Response(Box<ResponseEnvelope>),
    Batch(Vec<BatchEntry>),
}

/// One element of a batch patch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    pub v: PatchValue,
    pub p: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    pub response: ResponseShell,
}

/// Initial state of the assistant message, sent before any content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseShell {
    pub message_id: i64,
    pub parent_id: i64,
    pub model: String,
    pub role: &'static str,
    pub content: String,
    pub thinking_enabled: bool,
    pub thinking_content: Option<String>,
    pub thinking_elapsed_secs: Option<u64>,
    pub ban_edit: bool,
    pub ban_regenerate: bool,
    pub status: ResponseStatus,
    pub accumulated_token_usage: u64,
    pub files: Vec<String>,
    pub tips: Vec<String>,
    pub inserted_at: f64,
    pub search_enabled: bool,
    pub search_status: ResponseStatus,
    pub search_results: Option<Vec<String>>,
}

impl ResponseShell {
    pub fn new(ids: MessageIds, model: impl Into<String>, inserted_at: f64) -> Self {
        Self {
            message_id: ids.response_id,
            parent_id: ids.request_id,
            model: model.into(),
            role: ASSISTANT_ROLE,
            content: String::new(),
            thinking_enabled: true,
            thinking_content: None,
            thinking_elapsed_secs: None,
            ban_edit: false,
            ban_regenerate: false,
            status: ResponseStatus::Wip,
            accumulated_token_usage: 0,
            files: Vec::new(),
            tips: Vec::new(),
            inserted_at,
            search_enabled: true,
            search_status: ResponseStatus::Init,
            search_results: None,
        }
    }
}

/// Incremental update to the client-side response object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Patch {
    pub v: PatchValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub o: Option<PatchOp>,
}

impl Patch {
    /// Patch without an operation (plain assignment at `path`, or a bare value).
    pub fn plain(value: PatchValue, path: Option<&'static str>) -> Self {
        Self {
            v: value,
            p: path,
            o: None,
        }
    }

    pub fn append(text: impl Into<String>, path: Option<&'static str>) -> Self {
        Self {
            v: PatchValue::Text(text.into()),
            p: path,
            o: Some(PatchOp::Append),
        }
    }

    pub fn set(value: PatchValue, path: &'static str) -> Self {
        Self {
            v: value,
            p: Some(path),
            o: Some(PatchOp::Set),
        }
    }

    pub fn batch(entries: Vec<BatchEntry>, path: &'static str) -> Self {
        Self {
            v: PatchValue::Batch(entries),
            p: Some(path),
            o: Some(PatchOp::Batch),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadyData {
    pub request_message_id: i64,
    pub response_message_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UpdateSessionData {
    pub updated_at: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleData {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseData {
    pub click_behavior: &'static str,
}

impl Default for CloseData {
    fn default() -> Self {
        Self {
            click_behavior: "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
struct FinishData {}

/// One downstream event.
#[derive(Debug, Clone, PartialEq)]
pub enum DownstreamEvent {
    Ready(ReadyData),
    UpdateSession(UpdateSessionData),
    Patch(Patch),
    Finish,
    Title(TitleData),
    Close(CloseData),
    Error(Patch),
}

impl DownstreamEvent {
    pub fn ready(ids: MessageIds) -> Self {
        Self::Ready(ReadyData {
            request_message_id: ids.request_id,
            response_message_id: ids.response_id,
        })
    }

    pub fn update_session(updated_at: f64) -> Self {
        Self::UpdateSession(UpdateSessionData { updated_at })
    }

    pub fn title(content: impl Into<String>) -> Self {
        Self::Title(TitleData {
            content: content.into(),
        })
    }

    pub fn close() -> Self {
        Self::Close(CloseData::default())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(Patch::plain(
            PatchValue::Text(message.into()),
            Some(PATH_ERROR),
        ))
    }

    /// SSE event name; `None` for unnamed events.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::Ready(_) => Some("ready"),
            Self::UpdateSession(_) => Some("update_session"),
            Self::Finish => Some("finish"),
            Self::Title(_) => Some("title"),
            Self::Close(_) => Some("close"),
            Self::Patch(_) | Self::Error(_) => None,
        }
    }

    /// JSON payload of the `data:` line.
    pub fn data_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Ready(data) => serde_json::to_string(data),
            Self::UpdateSession(data) => serde_json::to_string(data),
            Self::Patch(patch) | Self::Error(patch) => serde_json::to_string(patch),
            Self::Finish => serde_json::to_string(&FinishData {}),
            Self::Title(data) => serde_json::to_string(data),
            Self::Close(data) => serde_json::to_string(data),
        }
    }

    /// Full SSE frame, terminated by a blank line.
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        let data = self.data_json()?;
        Ok(match self.name() {
            Some(name) => format!("event: {name}\ndata: {data}\n\n"),
            None => format!("data: {data}\n\n"),
        })
    }
}

/// Current time as fractional unix seconds.
pub fn unix_seconds_now() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) / 1e9
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn data(event: &DownstreamEvent) -> serde_json::Value {
        serde_json::from_str(&event.data_json().expect("json")).expect("value")
    }

    #[test]
    fn named_frame_has_event_line() {
        let frame = DownstreamEvent::ready(MessageIds::starting_at(5))
            .to_sse_frame()
            .expect("frame");
        assert_eq!(
            frame,
            "event: ready\ndata: {\"request_message_id\":5,\"response_message_id\":6}\n\n"
        );
    }

    #[test]
    fn unnamed_frame_omits_event_line() {
        let frame = DownstreamEvent::Patch(Patch::append("Hi", None))
            .to_sse_frame()
            .expect("frame");
        assert_eq!(frame, "data: {\"v\":\"Hi\",\"o\":\"append\"}\n\n");
    }

    #[test]
    fn first_content_append_carries_path() {
        let event = DownstreamEvent::Patch(Patch::append("Hi", Some(PATH_CONTENT)));
        assert_eq!(
            data(&event),
            json!({"v":"Hi","p":"response/content","o":"append"})
        );
    }

    #[test]
    fn finish_batch_shape() {
        let event = DownstreamEvent::Patch(Patch::batch(
            vec![
                BatchEntry {
                    v: PatchValue::Status(ResponseStatus::Finished),
                    p: PATH_STATUS,
                },
                BatchEntry {
                    v: PatchValue::Int(3),
                    p: PATH_TOKEN_USAGE,
                },
            ],
            PATH_RESPONSE,
        ));
        assert_eq!(
            data(&event),
            json!({
                "v": [
                    {"v":"finished","p":"status"},
                    {"v":3,"p":"accumulated_token_usage"}
                ],
                "p":"response",
                "o":"batch"
            })
        );
    }

    #[test]
    fn shell_patch_shape() {
        let shell = ResponseShell::new(MessageIds::starting_at(1), "", 1_700_000_000.5);
        let event = DownstreamEvent::Patch(Patch::plain(
            PatchValue::Response(Box::new(ResponseEnvelope { response: shell })),
            None,
        ));
        assert_eq!(
            data(&event),
            json!({"v": {"response": {
                "message_id": 2,
                "parent_id": 1,
                "model": "",
                "role": "ASSISTANT",
                "content": "",
                "thinking_enabled": true,
                "thinking_content": null,
                "thinking_elapsed_secs": null,
                "ban_edit": false,
                "ban_regenerate": false,
                "status": "wip",
                "accumulated_token_usage": 0,
                "files": [],
                "tips": [],
                "inserted_at": 1_700_000_000.5,
                "search_enabled": true,
                "search_status": "init",
                "search_results": null
            }}})
        );
    }

    #[test]
    fn terminal_events_payloads() {
        assert_eq!(DownstreamEvent::Finish.data_json().expect("json"), "{}");
        assert_eq!(
            data(&DownstreamEvent::close()),
            json!({"click_behavior":"none"})
        );
        assert_eq!(
            data(&DownstreamEvent::error("boom")),
            json!({"v":"boom","p":"error"})
        );
        assert_eq!(DownstreamEvent::error("boom").name(), None);
        assert_eq!(
            data(&DownstreamEvent::title("Reading")),
            json!({"content":"Reading"})
        );
    }

    #[test]
    fn timestamps_are_fractional_seconds() {
        let now = unix_seconds_now();
        assert!(now > 1_600_000_000.0);
        let frame = DownstreamEvent::update_session(12.25)
            .to_sse_frame()
            .expect("frame");
        assert_eq!(frame, "event: update_session\ndata: {\"updated_at\":12.25}\n\n");
    }
}
