use futures::StreamExt as _;

use crate::content::Analysis;
use crate::errors::ProviderError;
use crate::model::ProviderIdentity;
use crate::provider::ChunkStream;

/// Drains a chunk stream from `provider` into a completed answer.
///
/// Stops reading at the terminal chunk. A stream that ends without one fails
/// with the error it carried, or with a transport error when it simply ran dry.
pub async fn collect_analysis(
    provider: ProviderIdentity,
    mut stream: ChunkStream,
) -> Result<Analysis, ProviderError> {
    let mut out = Analysis::default();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if chunk.done {
            return Ok(out);
        }
        out.reasoning.push_str(&chunk.reasoning);
        out.content.push_str(&chunk.content);
    }
    Err(ProviderError::transport(
        provider,
        format!(
            "stream ended without completion after {} characters",
            out.content.chars().count()
        ),
    ))
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;
    use crate::content::NormalizedChunk;

    #[tokio::test]
    async fn collects_until_terminal() {
        let chunks: ChunkStream = Box::pin(stream::iter(vec![
            Ok(NormalizedChunk::reasoning("r")),
            Ok(NormalizedChunk::content("a")),
            Ok(NormalizedChunk::content("b")),
            Ok(NormalizedChunk::terminal()),
            Ok(NormalizedChunk::content("ignored")),
        ]));
        let analysis = collect_analysis(ProviderIdentity::OllamaLocal, chunks)
            .await
            .expect("analysis");
        assert_eq!(analysis.reasoning, "r");
        assert_eq!(analysis.content, "ab");
    }

    #[tokio::test]
    async fn surfaces_in_stream_error() {
        let chunks: ChunkStream = Box::pin(stream::iter(vec![
            Ok(NormalizedChunk::content("a")),
            Err(ProviderError::transport(ProviderIdentity::OllamaLocal, "reset")),
        ]));
        let err = collect_analysis(ProviderIdentity::OllamaLocal, chunks)
            .await
            .expect_err("error");
        assert_eq!(err.message(), "reset");
    }

    #[tokio::test]
    async fn stream_that_runs_dry_is_not_truncated_silently() {
        let chunks: ChunkStream = Box::pin(stream::iter(vec![
            Ok(NormalizedChunk::content("half an ")),
            Ok(NormalizedChunk::content("answer")),
        ]));
        let err = collect_analysis(ProviderIdentity::DeepseekRemote, chunks)
            .await
            .expect_err("error");
        assert!(matches!(err, ProviderError::Transport { .. }));
        assert_eq!(err.provider(), ProviderIdentity::DeepseekRemote);
    }
}
