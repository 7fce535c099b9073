use augur_harness::prelude::*;
use augur_harness::vendors::ollama::{OllamaClientConfig, OllamaProvider};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), HarnessError> {
    let model = std::env::var("AI_OLLAMA_MODEL").unwrap_or_else(|_| "qwen2.5:7b".into());
    let provider = OllamaProvider::new(OllamaClientConfig::default().model(model))?;
    let request = AnalysisRequest::raw_prompt("Say hello in one short sentence.");

    let chunks = provider.stream_analyze(&request).await?;
    let analysis = collect_analysis(provider.identity(), chunks).await?;
    println!("{}", analysis.content);
    Ok(())
}
