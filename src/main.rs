use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ollamatrix::config::AppConfig;
use ollamatrix::ollama::OllamaClient;
use ollamatrix::runtime;

/// Matrix chatbot backed by a local Ollama server.
#[derive(Parser, Debug)]
#[command(name = "ollamatrix", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the configured default model.
    #[arg(long)]
    model: Option<String>,

    /// Override the Ollama API base URL.
    #[arg(long)]
    ollama_url: Option<String>,

    /// Override the Ollama request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Replace the configured model catalog with whatever the Ollama server
    /// reports.
    #[arg(long)]
    server_models: bool,

    /// Disable Markdown-to-HTML rendering of replies.
    #[arg(long)]
    no_markdown: bool,

    /// Validate the configuration, print it redacted, and exit.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ollamatrix=debug")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = AppConfig::load(&cli.config)?;

    if let Some(model) = cli.model {
        cfg.ollama.default_model = model;
    }
    if let Some(url) = cli.ollama_url {
        cfg.ollama.api_url = url;
    }
    if let Some(timeout) = cli.timeout {
        cfg.ollama.timeout_secs = timeout;
    }
    if cli.no_markdown {
        cfg.markdown = false;
    }
    if cli.server_models {
        let client = OllamaClient::new(&cfg.ollama.api_url, cfg.ollama.timeout_secs)?;
        cfg.ollama.models = client.list_models().await?;
        if !cfg.ollama.models.contains_key(&cfg.ollama.default_model) {
            tracing::warn!(
                "Default model '{}' not reported by the server",
                cfg.ollama.default_model
            );
        }
    }

    let problems = cfg.validate();
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("config error: {problem}");
        }
        anyhow::bail!("Invalid configuration ({} problem(s))", problems.len());
    }

    if cli.dry_run {
        println!("{}", cfg.summary());
        return Ok(());
    }

    runtime::run(cfg, Some(cli.config)).await
}
