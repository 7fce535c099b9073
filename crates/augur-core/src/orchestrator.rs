//! Conversation operations: id allocation, provider calls, downstream events
//! and transcript persistence.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use augur_harness::{AnalysisProvider, AnalysisRequest, ProviderIdentity};
use futures::StreamExt as _;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_STREAM_BUFFER;
use crate::emitter::{EmitterOptions, EventEmitter, estimate_tokens};
use crate::error::{ConversationError, PersistenceError};
use crate::protocol::DownstreamEvent;
use crate::sequencer::{MessageIds, MessageSequencer};
use crate::store::{
    CACHE_TTL, CacheStore, MessageRecord, MessageRole, NewConversation, TranscriptStore,
    conversation_history_key, latest_session_key,
};

pub const ANALYSIS_TITLE: &str = "Chart analysis";
pub const ANALYSIS_PROMPT: &str = "Analyze my chart";
pub const ANALYSIS_RESULT_TITLE: &str = "Chart analysis result";
pub const ANALYSIS_THINKING_HINT: &str = "Analyzing the subject's chart...";

/// Prompt for a follow-up question given the session history so far.
pub fn follow_up_prompt(history: &str, question: &str) -> String {
    if history.trim().is_empty() {
        return question.to_string();
    }
    format!("Here is the previous conversation:\n\n{history}\n\nThe user's new question is: {question}")
}

/// Session history after one more question and answer.
pub fn append_history(history: &str, question: &str, answer: &str) -> String {
    let turn = format!("User: {question}\n\nAI: {answer}");
    if history.trim().is_empty() {
        turn
    } else {
        format!("{history}\n\n{turn}")
    }
}

/// Answer returned by the non-streaming operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisReply {
    pub session_id: String,
    pub request_message_id: i64,
    pub response_message_id: i64,
    pub provider: ProviderIdentity,
    pub reasoning: String,
    pub content: String,
}

/// A follow-up question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowUp {
    /// Session to continue. When absent the user's latest session is
    /// continued, and a new one is started if there is none.
    pub session_id: Option<String>,
    pub prompt: String,
}

impl FollowUp {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            session_id: None,
            prompt: prompt.into(),
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Downstream events of one streaming call.
///
/// Dropping the stream cancels the call, including the upstream request.
pub struct EventStream {
    rx: mpsc::Receiver<DownstreamEvent>,
    ids: MessageIds,
    session_id: String,
}

impl EventStream {
    pub fn message_ids(&self) -> MessageIds {
        self.ids
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Waits for the next event; `None` once the call is over.
    pub async fn next_event(&mut self) -> Option<DownstreamEvent> {
        self.rx.recv().await
    }

    /// Drains every remaining event.
    pub async fn collect_events(mut self) -> Vec<DownstreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}

impl futures::Stream for EventStream {
    type Item = DownstreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[derive(Debug, Clone, Copy)]
struct IssuedIds {
    ids: MessageIds,
    /// False when the sequencer failed and the fallback pair is shown.
    sequenced: bool,
}

/// Everything needed to present and persist one question/answer exchange.
#[derive(Debug, Clone)]
struct Exchange {
    user_id: i64,
    session_id: String,
    ids: IssuedIds,
    conversation_title: String,
    user_prompt: String,
    result_title: String,
    thinking_hint: String,
    /// History preceding this exchange; `None` for a fresh subject analysis.
    history: Option<String>,
}

impl Exchange {
    fn next_history(&self, answer: &str) -> String {
        match &self.history {
            Some(history) => append_history(history, &self.user_prompt, answer),
            None => answer.to_string(),
        }
    }

    fn emitter(&self) -> EventEmitter {
        EventEmitter::new(
            self.ids.ids,
            EmitterOptions {
                model: String::new(),
                thinking_hint: Some(self.thinking_hint.clone()),
                title: self.result_title.clone(),
            },
        )
    }
}

#[derive(Clone)]
struct Persistence {
    transcripts: Arc<dyn TranscriptStore>,
    history: Arc<dyn CacheStore>,
}

impl Persistence {
    /// Stores the history entry and the transcript. Failures are only logged.
    async fn record(&self, exchange: &Exchange, answer: &str) {
        let key = conversation_history_key(exchange.user_id, &exchange.session_id);
        if let Err(err) = self
            .history
            .set(&key, &exchange.next_history(answer), CACHE_TTL)
            .await
        {
            warn!(user_id = exchange.user_id, session_id = %exchange.session_id, error = %err, "failed to store conversation history");
        }
        if let Err(err) = self
            .history
            .set(&latest_session_key(exchange.user_id), &exchange.session_id, CACHE_TTL)
            .await
        {
            warn!(user_id = exchange.user_id, session_id = %exchange.session_id, error = %err, "failed to store latest session");
        }

        if !exchange.ids.sequenced {
            warn!(user_id = exchange.user_id, session_id = %exchange.session_id, "fallback message ids; transcript not saved");
            return;
        }
        if let Err(err) = self.write_transcript(exchange, answer).await {
            warn!(user_id = exchange.user_id, session_id = %exchange.session_id, request_id = exchange.ids.ids.request_id, error = %err, "failed to persist transcript");
        }
    }

    async fn write_transcript(&self, exchange: &Exchange, answer: &str) -> Result<(), PersistenceError> {
        let existing = self
            .transcripts
            .find_conversation(exchange.user_id, &exchange.session_id)
            .await
            .map_err(PersistenceError::Conversation)?;
        let conversation = match existing {
            Some(conversation) => conversation,
            None => self
                .transcripts
                .save_conversation(NewConversation {
                    user_id: exchange.user_id,
                    session_id: exchange.session_id.clone(),
                    title: exchange.conversation_title.clone(),
                    first_prompt: exchange.user_prompt.clone(),
                })
                .await
                .map_err(PersistenceError::Conversation)?,
        };

        let ids = exchange.ids.ids;
        self.transcripts
            .save_message(MessageRecord {
                conversation_id: conversation.id,
                user_id: exchange.user_id,
                session_id: exchange.session_id.clone(),
                role: MessageRole::User,
                content: exchange.user_prompt.clone(),
                request_id: ids.request_id,
                response_id: ids.response_id,
                parent_id: 0,
                token_usage: 0,
            })
            .await
            .map_err(|source| PersistenceError::Message {
                role: MessageRole::User.as_str(),
                source,
            })?;
        self.transcripts
            .save_message(MessageRecord {
                conversation_id: conversation.id,
                user_id: exchange.user_id,
                session_id: exchange.session_id.clone(),
                role: MessageRole::Assistant,
                content: answer.to_string(),
                request_id: ids.request_id,
                response_id: ids.response_id,
                parent_id: ids.request_id,
                token_usage: estimate_tokens(answer),
            })
            .await
            .map_err(|source| PersistenceError::Message {
                role: MessageRole::Assistant.as_str(),
                source,
            })
    }
}

/// Entry point for analysis and follow-up conversations.
pub struct ConversationOrchestrator {
    provider: Arc<dyn AnalysisProvider>,
    sequencer: Arc<MessageSequencer>,
    persistence: Persistence,
    stream_buffer: usize,
}

impl ConversationOrchestrator {
    pub fn new(
        provider: Arc<dyn AnalysisProvider>,
        sequencer: Arc<MessageSequencer>,
        transcripts: Arc<dyn TranscriptStore>,
        history: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            provider,
            sequencer,
            persistence: Persistence {
                transcripts,
                history,
            },
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    /// Sets the per-call event channel capacity.
    pub fn stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(1);
        self
    }

    pub fn provider(&self) -> ProviderIdentity {
        self.provider.identity()
    }

    /// Full subject analysis in one call.
    pub async fn analyze(
        &self,
        user_id: i64,
        request: AnalysisRequest,
    ) -> Result<AnalysisReply, ConversationError> {
        let exchange = self.subject_exchange(user_id).await;
        self.complete(exchange, request).await
    }

    /// Full subject analysis as a downstream event stream.
    pub async fn stream_analyze(&self, user_id: i64, request: AnalysisRequest) -> EventStream {
        let exchange = self.subject_exchange(user_id).await;
        self.spawn_stream(exchange, request)
    }

    /// Answers a follow-up question in one call.
    pub async fn continue_conversation(
        &self,
        user_id: i64,
        follow_up: FollowUp,
    ) -> Result<AnalysisReply, ConversationError> {
        let (exchange, request) = self.follow_up_exchange(user_id, follow_up).await?;
        self.complete(exchange, request).await
    }

    /// Answers a follow-up question as a downstream event stream.
    pub async fn stream_continue_conversation(
        &self,
        user_id: i64,
        follow_up: FollowUp,
    ) -> Result<EventStream, ConversationError> {
        let (exchange, request) = self.follow_up_exchange(user_id, follow_up).await?;
        Ok(self.spawn_stream(exchange, request))
    }

    async fn issue_ids(&self, user_id: i64) -> IssuedIds {
        match self.sequencer.next_message_ids(user_id).await {
            Ok(ids) => IssuedIds {
                ids,
                sequenced: true,
            },
            Err(err) => {
                warn!(event = "conversation.sequencer_fallback", user_id, error = %err, "message ids unavailable; using fallback pair");
                IssuedIds {
                    ids: MessageIds::FALLBACK,
                    sequenced: false,
                }
            }
        }
    }

    async fn subject_exchange(&self, user_id: i64) -> Exchange {
        Exchange {
            user_id,
            session_id: uuid::Uuid::new_v4().to_string(),
            ids: self.issue_ids(user_id).await,
            conversation_title: ANALYSIS_TITLE.to_string(),
            user_prompt: ANALYSIS_PROMPT.to_string(),
            result_title: ANALYSIS_RESULT_TITLE.to_string(),
            thinking_hint: ANALYSIS_THINKING_HINT.to_string(),
            history: None,
        }
    }

    async fn follow_up_exchange(
        &self,
        user_id: i64,
        follow_up: FollowUp,
    ) -> Result<(Exchange, AnalysisRequest), ConversationError> {
        let session_id = match follow_up.session_id.filter(|id| !id.trim().is_empty()) {
            Some(session_id) => session_id,
            None => self.latest_session(user_id).await?,
        };
        let history = self
            .persistence
            .history
            .get(&conversation_history_key(user_id, &session_id))
            .await
            .map_err(ConversationError::History)?
            .unwrap_or_default();
        let request = AnalysisRequest::raw_prompt(follow_up_prompt(&history, &follow_up.prompt));

        let exchange = Exchange {
            user_id,
            session_id,
            ids: self.issue_ids(user_id).await,
            conversation_title: format!("Conversation: {}", follow_up.prompt),
            result_title: format!("Reply: {}", follow_up.prompt),
            thinking_hint: format!("Thinking about the question: {}", follow_up.prompt),
            user_prompt: follow_up.prompt,
            history: Some(history),
        };
        Ok((exchange, request))
    }

    /// Session the user last completed an exchange in, or a fresh one.
    async fn latest_session(&self, user_id: i64) -> Result<String, ConversationError> {
        let latest = self
            .persistence
            .history
            .get(&latest_session_key(user_id))
            .await
            .map_err(ConversationError::History)?
            .filter(|id| !id.trim().is_empty());
        Ok(match latest {
            Some(session_id) => {
                debug!(user_id, session_id = %session_id, "continuing latest session");
                session_id
            }
            None => uuid::Uuid::new_v4().to_string(),
        })
    }

    async fn complete(
        &self,
        exchange: Exchange,
        request: AnalysisRequest,
    ) -> Result<AnalysisReply, ConversationError> {
        let analysis = self.provider.analyze(&request).await.inspect_err(|err| {
            warn!(user_id = exchange.user_id, provider = %self.provider.identity(), error = %err, "analysis failed");
        })?;
        self.persistence.record(&exchange, &analysis.content).await;
        info!(event = "conversation.completed", user_id = exchange.user_id, request_id = exchange.ids.ids.request_id, provider = %self.provider.identity(), "analysis completed");

        Ok(AnalysisReply {
            session_id: exchange.session_id,
            request_message_id: exchange.ids.ids.request_id,
            response_message_id: exchange.ids.ids.response_id,
            provider: self.provider.identity(),
            reasoning: analysis.reasoning,
            content: analysis.content,
        })
    }

    fn spawn_stream(&self, exchange: Exchange, request: AnalysisRequest) -> EventStream {
        let (tx, rx) = mpsc::channel(self.stream_buffer);
        let stream = EventStream {
            rx,
            ids: exchange.ids.ids,
            session_id: exchange.session_id.clone(),
        };
        tokio::spawn(stream_task(
            Arc::clone(&self.provider),
            request,
            exchange,
            self.persistence.clone(),
            tx,
        ));
        stream
    }
}

async fn stream_task(
    provider: Arc<dyn AnalysisProvider>,
    request: AnalysisRequest,
    exchange: Exchange,
    persistence: Persistence,
    tx: mpsc::Sender<DownstreamEvent>,
) {
    let user_id = exchange.user_id;
    let request_id = exchange.ids.ids.request_id;
    let mut emitter = exchange.emitter();

    match emitter.start() {
        Ok(events) => {
            if !send_events(&tx, events).await {
                return;
            }
        }
        Err(err) => {
            warn!(user_id, request_id, error = %err, "emitter refused to start");
            return;
        }
    }

    let opened = tokio::select! {
        _ = tx.closed() => {
            debug!(user_id, request_id, "client disconnected before the model answered");
            return;
        }
        opened = provider.stream_analyze(&request) => opened,
    };
    let mut chunks = match opened {
        Ok(chunks) => chunks,
        Err(err) => {
            warn!(user_id, request_id, provider = %provider.identity(), error = %err, "model stream failed to open");
            fail(&mut emitter, &tx, &err.to_string()).await;
            return;
        }
    };

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                info!(event = "conversation.client_disconnected", user_id, request_id, "client disconnected; cancelling model stream");
                return;
            }
            next = chunks.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                let done = chunk.done;
                let events = match emitter.on_chunk(&chunk) {
                    Ok(events) => events,
                    Err(err) => {
                        warn!(user_id, request_id, error = %err, "dropping out-of-order chunk");
                        continue;
                    }
                };
                if !send_events(&tx, events).await {
                    return;
                }
                if done {
                    break;
                }
            }
            Some(Err(err)) => {
                warn!(user_id, request_id, provider = %provider.identity(), error = %err, "model stream failed");
                fail(&mut emitter, &tx, &err.to_string()).await;
                return;
            }
            None => {
                warn!(user_id, request_id, provider = %provider.identity(), "model stream ended without completion");
                fail(&mut emitter, &tx, "model stream ended before completion").await;
                return;
            }
        }
    }
    drop(chunks);

    if let Ok(close) = emitter.close() {
        let _ = send_event(&tx, close).await;
    }
    let session = emitter.into_session();
    persistence
        .record(&exchange, &session.accumulated_content)
        .await;
    info!(event = "conversation.completed", user_id, request_id, provider = %provider.identity(), token_estimate = session.token_estimate, "stream completed");
}

async fn fail(emitter: &mut EventEmitter, tx: &mpsc::Sender<DownstreamEvent>, message: &str) {
    if let Ok(event) = emitter.on_error(message) {
        let _ = send_event(tx, event).await;
    }
}

async fn send_events(tx: &mpsc::Sender<DownstreamEvent>, events: Vec<DownstreamEvent>) -> bool {
    for event in events {
        if !send_event(tx, event).await {
            return false;
        }
    }
    true
}

async fn send_event(tx: &mpsc::Sender<DownstreamEvent>, event: DownstreamEvent) -> bool {
    tx.send(event).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(history: Option<&str>) -> Exchange {
        Exchange {
            user_id: 1,
            session_id: "s".into(),
            ids: IssuedIds {
                ids: MessageIds::starting_at(3),
                sequenced: true,
            },
            conversation_title: "Conversation: why?".into(),
            user_prompt: "why?".into(),
            result_title: "Reply: why?".into(),
            thinking_hint: "Thinking about the question: why?".into(),
            history: history.map(str::to_string),
        }
    }

    #[test]
    fn follow_up_prompt_wraps_history() {
        assert_eq!(follow_up_prompt("", "why?"), "why?");
        assert_eq!(
            follow_up_prompt("reading", "why?"),
            "Here is the previous conversation:\n\nreading\n\nThe user's new question is: why?"
        );
    }

    #[test]
    fn history_grows_by_one_turn() {
        assert_eq!(append_history("", "q", "a"), "User: q\n\nAI: a");
        assert_eq!(
            append_history("reading", "q", "a"),
            "reading\n\nUser: q\n\nAI: a"
        );
    }

    #[test]
    fn subject_history_is_the_answer() {
        assert_eq!(exchange(None).next_history("full reading"), "full reading");
        assert_eq!(
            exchange(Some("reading")).next_history("because"),
            "reading\n\nUser: why?\n\nAI: because"
        );
    }

    #[test]
    fn emitter_uses_exchange_titles() {
        let mut emitter = exchange(None).emitter();
        let events = emitter.start().expect("start");
        assert_eq!(events[0], DownstreamEvent::ready(MessageIds::starting_at(3)));
        let hint: serde_json::Value =
            serde_json::from_str(&events[4].data_json().expect("json")).expect("value");
        assert_eq!(hint["v"], "Thinking about the question: why?");
    }

    #[test]
    fn follow_up_builder() {
        let follow_up = FollowUp::new("next?").in_session("abc");
        assert_eq!(follow_up.session_id.as_deref(), Some("abc"));
        assert_eq!(follow_up.prompt, "next?");
    }
}
