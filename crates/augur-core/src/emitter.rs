//! Turns a normalized chunk stream into downstream events.

use std::time::Instant;

use augur_harness::NormalizedChunk;

use crate::error::EmitterError;
use crate::protocol::{
    BatchEntry, DownstreamEvent, PATH_CONTENT, PATH_RESPONSE, PATH_SEARCH_STATUS, PATH_STATUS,
    PATH_THINKING_CONTENT, PATH_THINKING_ELAPSED, PATH_TOKEN_USAGE, Patch, PatchValue,
    ResponseEnvelope, ResponseShell, ResponseStatus, unix_seconds_now,
};
use crate::sequencer::MessageIds;

/// Display-only token estimate: one token per four characters.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / 4) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    Init,
    Ready,
    SessionUpdated,
    Streaming,
    Finished,
    Closed,
    Failed,
}

/// Per-call presentation settings.
#[derive(Debug, Clone, Default)]
pub struct EmitterOptions {
    /// Model name shown in the response shell.
    pub model: String,
    /// Text placed in the thinking area before any chunk arrives.
    pub thinking_hint: Option<String>,
    /// Title announced after the answer finishes.
    pub title: String,
}

/// State of one streaming call.
#[derive(Debug)]
pub struct StreamSession {
    pub ids: MessageIds,
    pub accumulated_content: String,
    pub accumulated_reasoning: String,
    pub token_estimate: u64,
    pub thinking_started_at: Instant,
}

impl StreamSession {
    fn new(ids: MessageIds) -> Self {
        Self {
            ids,
            accumulated_content: String::new(),
            accumulated_reasoning: String::new(),
            token_estimate: 0,
            thinking_started_at: Instant::now(),
        }
    }
}

/// Event emitter for a single streaming call.
///
/// `Init -> Ready -> SessionUpdated -> Streaming -> Finished -> Closed`, with
/// `Failed` reachable once the session is announced. Calls out of that order
/// are rejected and emit nothing.
pub struct EventEmitter {
    session: StreamSession,
    options: EmitterOptions,
    state: EmitterState,
    wrote_content: bool,
}

impl EventEmitter {
    pub fn new(ids: MessageIds, options: EmitterOptions) -> Self {
        Self {
            session: StreamSession::new(ids),
            options,
            state: EmitterState::Init,
            wrote_content: false,
        }
    }

    pub fn state(&self) -> EmitterState {
        self.state
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    pub fn into_session(self) -> StreamSession {
        self.session
    }

    /// Announces the call: ready, session update, response shell, search
    /// status and the optional thinking hint.
    pub fn start(&mut self) -> Result<Vec<DownstreamEvent>, EmitterError> {
        self.expect_state(&[EmitterState::Init], "start")?;
        let now = unix_seconds_now();
        let ids = self.session.ids;

        let mut events = vec![DownstreamEvent::ready(ids)];
        self.state = EmitterState::Ready;

        events.push(DownstreamEvent::update_session(now));
        events.push(DownstreamEvent::Patch(Patch::plain(
            PatchValue::Response(Box::new(ResponseEnvelope {
                response: ResponseShell::new(ids, self.options.model.clone(), now),
            })),
            None,
        )));
        events.push(DownstreamEvent::Patch(Patch::plain(
            PatchValue::Status(ResponseStatus::Answer),
            Some(PATH_SEARCH_STATUS),
        )));
        if let Some(hint) = self.options.thinking_hint.as_ref() {
            events.push(DownstreamEvent::Patch(Patch::plain(
                PatchValue::Text(hint.clone()),
                Some(PATH_THINKING_CONTENT),
            )));
        }
        self.session.thinking_started_at = Instant::now();
        self.state = EmitterState::SessionUpdated;
        Ok(events)
    }

    /// Maps one chunk. The terminal chunk produces the finish sequence.
    pub fn on_chunk(&mut self, chunk: &NormalizedChunk) -> Result<Vec<DownstreamEvent>, EmitterError> {
        self.expect_state(
            &[EmitterState::SessionUpdated, EmitterState::Streaming],
            "accept a chunk",
        )?;
        if chunk.done {
            return Ok(self.finish());
        }

        self.state = EmitterState::Streaming;
        let mut events = Vec::with_capacity(2);
        if !chunk.reasoning.is_empty() {
            self.session.accumulated_reasoning.push_str(&chunk.reasoning);
            events.push(DownstreamEvent::Patch(Patch::append(
                chunk.reasoning.clone(),
                Some(PATH_THINKING_CONTENT),
            )));
        }
        if !chunk.content.is_empty() {
            let path = (!self.wrote_content).then_some(PATH_CONTENT);
            self.wrote_content = true;
            self.session.accumulated_content.push_str(&chunk.content);
            events.push(DownstreamEvent::Patch(Patch::append(
                chunk.content.clone(),
                path,
            )));
        }
        Ok(events)
    }

    /// Final event of a successful call.
    pub fn close(&mut self) -> Result<DownstreamEvent, EmitterError> {
        self.expect_state(&[EmitterState::Finished], "close")?;
        self.state = EmitterState::Closed;
        Ok(DownstreamEvent::close())
    }

    /// Ends the call with an error patch. Nothing is accepted afterwards.
    pub fn on_error(&mut self, message: &str) -> Result<DownstreamEvent, EmitterError> {
        self.expect_state(
            &[EmitterState::SessionUpdated, EmitterState::Streaming],
            "report an error",
        )?;
        self.state = EmitterState::Failed;
        Ok(DownstreamEvent::error(message))
    }

    fn finish(&mut self) -> Vec<DownstreamEvent> {
        let elapsed = self.session.thinking_started_at.elapsed().as_secs();
        self.session.token_estimate = estimate_tokens(&self.session.accumulated_content);
        self.state = EmitterState::Finished;

        vec![
            DownstreamEvent::Patch(Patch::set(
                PatchValue::Int(i64::try_from(elapsed).unwrap_or(i64::MAX)),
                PATH_THINKING_ELAPSED,
            )),
            DownstreamEvent::Patch(Patch::batch(
                vec![
                    BatchEntry {
                        v: PatchValue::Status(ResponseStatus::Finished),
                        p: PATH_STATUS,
                    },
                    BatchEntry {
                        v: PatchValue::Int(
                            i64::try_from(self.session.token_estimate).unwrap_or(i64::MAX),
                        ),
                        p: PATH_TOKEN_USAGE,
                    },
                ],
                PATH_RESPONSE,
            )),
            DownstreamEvent::Finish,
            DownstreamEvent::update_session(unix_seconds_now()),
            DownstreamEvent::title(self.options.title.clone()),
        ]
    }

    fn expect_state(
        &self,
        allowed: &[EmitterState],
        action: &'static str,
    ) -> Result<(), EmitterError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(EmitterError::InvalidTransition {
                state: self.state,
                action,
            })
        }
    }
}
