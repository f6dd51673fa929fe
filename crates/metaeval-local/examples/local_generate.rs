//! Generate a few responses with a small local model
//!
//! cargo run -p metaeval-local --example local_generate -- [model_id]

use metaeval_llm::ResponseGenerator;
use metaeval_local::{LocalBackend, LocalModelConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("metaeval_local=debug,info"))
        .init();

    let model_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "TinyLlama/TinyLlama-1.1B-Chat-v1.0".to_string());

    let config = LocalModelConfig::new(model_id)
        .cpu()
        .with_max_new_tokens(48)
        .with_generation_prompt(true);
    let backend = LocalBackend::load(config).await?;

    let prompts = vec![
        "Is 91 a prime number? Answer yes or no.".to_string(),
        "Name the capital of Australia.".to_string(),
        "What is 12 times 12?".to_string(),
    ];

    let start = std::time::Instant::now();
    let responses = backend
        .generate_responses(&prompts, 2, Some("Answer in one short sentence."))
        .await?;
    println!("Generated {} responses in {:.2}s\n", responses.len(), start.elapsed().as_secs_f64());

    for (prompt, response) in prompts.iter().zip(&responses) {
        println!("> {prompt}\n{}\n", response.trim());
    }

    Ok(())
}
