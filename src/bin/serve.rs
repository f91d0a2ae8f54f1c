//! HTTP synthesis server binary.

use chatterbox_serve::engine::ChatterboxLoader;
use chatterbox_serve::scratch::ScratchSpace;
use chatterbox_serve::startup::{load_models, resolve_device};
use chatterbox_serve::synthesis::Synthesizer;
use chatterbox_serve::{ModelLoader, ModelRegistry, ServiceConfig, ServiceContext, TtsServer};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Voice-cloning text-to-speech HTTP service.
#[derive(Parser)]
#[command(name = "chatterbox-serve", version, about)]
struct Cli {
    /// Path to TOML configuration file. Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("chatterbox_serve=info,tower_http=info,hf_hub=warn")
        }))
        .init();

    let cli = Cli::parse();

    let mut config = if let Some(ref path) = cli.config {
        ServiceConfig::from_file(path)?
    } else {
        ServiceConfig::default()
    };
    config.apply_env(|key| std::env::var(key).ok())?;

    let loader: Arc<dyn ModelLoader> =
        Arc::new(ChatterboxLoader::new(config.engine.python.clone()));
    let device = resolve_device(Arc::clone(&loader), config.models.device).await;
    info!(device = %device, "using device");

    let registry = Arc::new(ModelRegistry::new());
    load_models(&config.models, loader, &registry, device).await?;

    let scratch = ScratchSpace::new(config.synthesis.scratch_dir.clone())?;
    info!(scratch_dir = %scratch.dir().display(), "scratch space ready");
    let synthesizer = Synthesizer::new(scratch, config.synthesis.max_concurrent);

    let ctx = Arc::new(ServiceContext::new(registry, device, synthesizer));
    let server = TtsServer::start(ctx, &config.server).await?;
    info!(addr = %server.addr(), "ready");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    server.shutdown();
    Ok(())
}
