use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context as _, bail};
use augur_core::prelude::*;
use augur_harness::{AnalysisRequest, KnowledgeMap, Subject, global_provider};
use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use tracing::info;

const BIRTH_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Parser)]
#[command(name = "augur", about = "Chart readings streamed from a language model")]
pub struct Cli {
    /// User the message ids and history belong to.
    #[arg(long, default_value_t = 1)]
    user_id: i64,
    /// Print the JSON reply instead of SSE frames.
    #[arg(long)]
    no_stream: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze a subject
    Analyze(SubjectArgs),
    /// Ask a follow-up question in a session
    Ask(AskArgs),
}

#[derive(Debug, Args, Clone)]
struct SubjectArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    gender: String,
    /// Birth time as `YYYY-MM-DD HH:MM:SS`
    #[arg(long, value_parser = parse_birth_time)]
    birth_time: Option<NaiveDateTime>,
    /// Extra attribute as `key=value`; repeatable
    #[arg(long = "attr", value_parser = parse_attribute)]
    attributes: Vec<(String, String)>,
}

#[derive(Debug, Args, Clone)]
struct AskArgs {
    /// Session to continue; defaults to the latest one
    #[arg(long)]
    session: Option<String>,
    #[arg(value_name = "QUESTION", required = true)]
    question: Vec<String>,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = ServiceConfig::from_env();
        let orchestrator = build_orchestrator(&config)?;
        info!(provider = %orchestrator.provider(), user_id = self.user_id, "ready");

        match self.command {
            Command::Analyze(args) => {
                let request = args.into_request();
                if self.no_stream {
                    print_reply(&orchestrator.analyze(self.user_id, request).await?)
                } else {
                    print_stream(orchestrator.stream_analyze(self.user_id, request).await).await
                }
            }
            Command::Ask(args) => {
                let mut follow_up = FollowUp::new(args.question.join(" "));
                if let Some(session) = args.session {
                    follow_up = follow_up.in_session(session);
                }
                if self.no_stream {
                    print_reply(
                        &orchestrator
                            .continue_conversation(self.user_id, follow_up)
                            .await?,
                    )
                } else {
                    let stream = orchestrator
                        .stream_continue_conversation(self.user_id, follow_up)
                        .await?;
                    print_stream(stream).await
                }
            }
        }
    }
}

impl SubjectArgs {
    fn into_request(self) -> AnalysisRequest {
        let mut subject = Subject::new(self.name, self.gender);
        subject.birth_time = self.birth_time;
        let knowledge: KnowledgeMap = self.attributes.into_iter().collect();
        AnalysisRequest::for_subject(subject, knowledge)
    }
}

fn build_orchestrator(config: &ServiceConfig) -> anyhow::Result<ConversationOrchestrator> {
    let provider = global_provider(&config.ai).context("no usable AI provider")?;

    let cache: Arc<dyn CacheStore> = match config.redis_url.as_deref() {
        Some(url) => Arc::new(RedisCache::new(url).context("invalid AUGUR_REDIS_URL")?),
        None => Arc::new(MemoryCache::new()),
    };
    let sequencer = Arc::new(MessageSequencer::new(
        Arc::new(MemoryCounterStore::new()),
        Arc::clone(&cache),
    ));

    Ok(ConversationOrchestrator::new(
        provider,
        sequencer,
        Arc::new(MemoryTranscriptStore::new()),
        cache,
    )
    .stream_buffer(config.stream_buffer))
}

fn print_reply(reply: &AnalysisReply) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(reply)?);
    Ok(())
}

async fn print_stream(mut stream: EventStream) -> anyhow::Result<()> {
    eprintln!(
        "session {} (request {}, response {})",
        stream.session_id(),
        stream.message_ids().request_id,
        stream.message_ids().response_id
    );
    let mut stdout = std::io::stdout().lock();
    let mut failed = false;
    while let Some(event) = stream.next_event().await {
        failed |= matches!(event, DownstreamEvent::Error(_));
        stdout.write_all(event.to_sse_frame()?.as_bytes())?;
        stdout.flush()?;
    }
    if failed {
        bail!("stream ended with an error event");
    }
    Ok(())
}

fn parse_birth_time(value: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value.trim(), BIRTH_TIME_FORMAT)
        .map_err(|e| format!("expected `YYYY-MM-DD HH:MM:SS`: {e}"))
}

fn parse_attribute(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), val.trim().to_string()))
        }
        _ => Err(format!("expected `key=value`, got `{value}`")),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_subject_arguments() {
        let cli = Cli::try_parse_from([
            "augur",
            "--user-id",
            "7",
            "analyze",
            "--name",
            "Lin",
            "--gender",
            "female",
            "--birth-time",
            "1990-05-17 08:30:00",
            "--attr",
            "year=geng-wu",
        ])
        .expect("parse");
        assert_eq!(cli.user_id, 7);
        let Command::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        let request = args.into_request();
        assert_eq!(request.subject.name, "Lin");
        assert!(request.subject.birth_time.is_some());
        assert_eq!(
            request.knowledge.get("year").map(String::as_str),
            Some("geng-wu")
        );
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(parse_attribute("novalue").is_err());
        assert!(parse_attribute("=x").is_err());
        assert_eq!(
            parse_attribute("k = v"),
            Ok(("k".to_string(), "v".to_string()))
        );
        assert!(parse_birth_time("1990/05/17").is_err());
    }

    #[test]
    fn ask_joins_question_words() {
        let cli = Cli::try_parse_from(["augur", "ask", "--session", "s1", "what", "next?"])
            .expect("parse");
        let Command::Ask(args) = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(args.session.as_deref(), Some("s1"));
        assert_eq!(args.question.join(" "), "what next?");
    }
}
