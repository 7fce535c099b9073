use futures::StreamExt as _;

use augur_harness::prelude::*;
use augur_harness::vendors::deepseek::DeepseekProvider;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), HarnessError> {
    let provider = DeepseekProvider::from_env()?;
    let request = AnalysisRequest::raw_prompt("Describe the five elements in two sentences.");

    let mut chunks = provider.stream_analyze(&request).await?;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if chunk.done {
            println!();
            break;
        }
        if !chunk.reasoning.is_empty() {
            eprint!("{}", chunk.reasoning);
        }
        print!("{}", chunk.content);
    }
    Ok(())
}
