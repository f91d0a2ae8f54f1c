//! Packages Chatterbox model snapshots into a self-contained directory for
//! offline hosts.
//!
//! ```text
//! models/
//!   chatterbox-turbo/
//!   chatterbox/
//!   pkuseg/
//! ```

use chatterbox_serve::ModelType;
use chatterbox_serve::provision::{Provisioner, default_segmenter_source, hub_cache_root};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Copy cached (or freshly downloaded) model files into an offline layout.
#[derive(Parser)]
#[command(name = "chatterbox-package", version, about)]
struct Cli {
    /// Output directory; becomes `MODELS_DIR` on the target host.
    #[arg(short, long, default_value = "./models")]
    output_dir: PathBuf,

    /// Segmenter resources to stage (default: ~/.pkuseg).
    #[arg(long)]
    pkuseg_source: Option<PathBuf>,

    /// Python interpreter used to fetch segmenter resources when missing.
    #[arg(long, default_value = "python3")]
    python: String,

    /// Only use the local hub cache; never download.
    #[arg(long)]
    no_download: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("chatterbox_serve=info,hf_hub=warn")
        }))
        .init();

    let cli = Cli::parse();
    let env = |key: &str| std::env::var(key).ok();

    std::fs::create_dir_all(&cli.output_dir)?;
    let provisioner = Provisioner {
        cache_root: hub_cache_root(env),
        output_dir: cli.output_dir.clone(),
        token: env("HF_TOKEN").filter(|t| !t.trim().is_empty()),
        allow_download: !cli.no_download,
    };

    let rule = "=".repeat(60);
    println!("{rule}");
    println!("Chatterbox model packager");
    println!("{rule}");
    println!("hub cache: {}", provisioner.cache_root.display());

    let mut missing = Vec::new();
    for (step, model_type) in ModelType::ALL.into_iter().enumerate() {
        let repo_id = model_type.default_repo_id();
        println!("\n[{}/3] {model_type} model ({repo_id})", step + 1);
        match provisioner.package_model(model_type, repo_id) {
            Ok(packaged) => {
                let origin = if packaged.downloaded {
                    "downloaded"
                } else {
                    "cached"
                };
                println!(
                    "  copied {} files from {} snapshot {}",
                    packaged.files,
                    origin,
                    packaged.snapshot.display()
                );
                println!("  -> {}", packaged.target.display());
            }
            Err(e) => {
                tracing::warn!(model_type = %model_type, error = %e, "model not packaged");
                println!("  FAILED: {e}");
                missing.push(model_type);
            }
        }
    }

    println!("\n[3/3] segmenter resources (Chinese word segmentation)");
    let source = cli.pkuseg_source.unwrap_or_else(default_segmenter_source);
    let segmenter = provisioner.stage_segmenter(&source, Some(&cli.python));
    match &segmenter {
        Some(path) => println!("  -> {}", path.display()),
        None => println!("  skipped: Chinese word segmentation may not work on the target host"),
    }

    let out = cli.output_dir.display();
    let absolute = std::path::absolute(&cli.output_dir).unwrap_or_else(|_| cli.output_dir.clone());
    println!("\n{rule}");
    println!("Packaged into {}", absolute.display());
    println!("\nLayout:");
    println!("  {out}/");
    for model_type in ModelType::ALL {
        let mark = if missing.contains(&model_type) {
            "  (missing)"
        } else {
            ""
        };
        println!("    {}/{mark}", model_type.dir_name());
    }
    if segmenter.is_some() {
        println!("    pkuseg/");
    }
    println!("\nNext steps:");
    println!("  1. Archive: tar -czf models.tar.gz {out}");
    println!("  2. Transfer models.tar.gz to the target host");
    println!("  3. Extract: tar -xzf models.tar.gz");
    println!("  4. Set MODELS_DIR to the extracted directory");
    println!("     (and PKUSEG_HOME to models/pkuseg if it lives elsewhere)");
    println!("{rule}");

    if missing.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        let names: Vec<&str> = missing.iter().map(|m| m.as_str()).collect();
        eprintln!("missing models: {}", names.join(", "));
        Ok(ExitCode::FAILURE)
    }
}
