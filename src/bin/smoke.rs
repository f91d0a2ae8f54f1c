//! Smoke test against a running service.
//!
//! ```bash
//! chatterbox-smoke ref.wav "Hello there" turbo en
//! API_URL=http://gpu-box:8000 chatterbox-smoke zh01.wav "你好，世界" multilingual zh
//! ```

use anyhow::Context;
use chatterbox_serve::client::{TtsCall, TtsClient};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Check a running service's health and synthesize one clip.
#[derive(Parser)]
#[command(name = "chatterbox-smoke", version, about)]
struct Cli {
    /// Reference voice clip.
    audio: PathBuf,

    /// Text to speak.
    text: String,

    /// `turbo` or `multilingual`.
    #[arg(default_value = "turbo")]
    model_type: String,

    /// Language code.
    #[arg(default_value = "en")]
    language: String,

    /// Service base URL.
    #[arg(long, env = "API_URL", default_value = "http://localhost:8000")]
    api_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if !cli.audio.is_file() {
        eprintln!("audio file not found: {}", cli.audio.display());
        return Ok(ExitCode::FAILURE);
    }

    let client = TtsClient::new(cli.api_url.clone());

    println!("GET {}/health", cli.api_url);
    match client.health().await {
        Ok(health) => println!("  {}", serde_json::to_string(&health)?),
        Err(e) => {
            eprintln!("health check failed: {e}");
            eprintln!("is the service running at {}?", cli.api_url);
            return Ok(ExitCode::FAILURE);
        }
    }

    let audio = std::fs::read(&cli.audio)
        .with_context(|| format!("failed to read {}", cli.audio.display()))?;
    let filename = cli
        .audio
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reference.wav".to_owned());

    println!("\nPOST {}/api/v1/tts", cli.api_url);
    println!("  text:       {}", cli.text);
    println!("  model_type: {}", cli.model_type);
    println!("  language:   {}", cli.language);

    let call = TtsCall {
        text: cli.text,
        model_type: cli.model_type.clone(),
        language: cli.language,
        audio,
        filename,
    };
    match client.synthesize(&call).await {
        Ok(wav) => {
            let output = format!("output_{}.wav", cli.model_type);
            std::fs::write(&output, &wav).with_context(|| format!("failed to write {output}"))?;
            println!("  ok: saved {output} ({} bytes)", wav.len());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("  failed: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
