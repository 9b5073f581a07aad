//! Startup wiring and the Matrix event loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::context::BotContext;
use crate::handlers;
use crate::matrix::{ChatTransport, MatrixClient};
use crate::ollama::OllamaClient;
use crate::router::build_router;
use crate::tools::{register_builtin_tools, RemoteToolProvider, ToolRegistry, ToolSet};

const SYNC_TIMEOUT_MS: u64 = 30_000;

/// Connect everything and run until interrupted.
pub async fn run(cfg: AppConfig, config_path: Option<PathBuf>) -> Result<()> {
    let ollama = OllamaClient::new(&cfg.ollama.api_url, cfg.ollama.timeout_secs)?;
    if !ollama.health().await {
        warn!(
            "Ollama at {} is not answering; completions will fail until it does",
            cfg.ollama.api_url
        );
    }

    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry);
    let mut remotes = Vec::new();
    for (name, url) in &cfg.tools.servers {
        match RemoteToolProvider::new(name, url) {
            Ok(provider) => remotes.push(provider),
            Err(e) => warn!("Ignoring tool provider '{name}': {e:#}"),
        }
    }
    let tools = ToolSet::assemble(registry, remotes).await;

    let matrix = MatrixClient::login(
        &cfg.matrix.server,
        &cfg.matrix.username,
        &cfg.matrix.password,
    )
    .await?;
    let bot_name = matrix.display_name(&matrix.user_id).await;
    info!("Running as '{}' ({})", bot_name, matrix.user_id);

    for channel in &cfg.matrix.channels {
        if let Err(e) = matrix.join(channel).await {
            warn!("Could not join {channel}: {e:#}");
        }
    }

    let own_id = matrix.user_id.clone();
    let matrix = Arc::new(matrix);
    let mut ctx = BotContext::new(
        &cfg,
        Arc::new(ollama),
        matrix.clone(),
        tools,
        bot_name,
        config_path,
    );
    let router = build_router();

    // Ignore everything sent before startup; the initial sync only yields
    // the first batch token.
    let start_ms = Utc::now().timestamp_millis() as u64;
    let initial = matrix
        .sync(None, 0)
        .await
        .context("Initial Matrix sync failed")?;
    let mut since = initial.next_batch;
    info!("Listening for messages");

    loop {
        let sync = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                return Ok(());
            }
            sync = matrix.sync(Some(&since), SYNC_TIMEOUT_MS) => sync,
        };
        let sync = match sync {
            Ok(sync) => sync,
            Err(e) => {
                warn!("Sync failed, retrying in 5s: {e:#}");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };
        since = sync.next_batch;

        for (room, joined) in &sync.rooms.join {
            for event in &joined.timeline.events {
                let Some(body) = event.text_body() else { continue };
                if event.sender == own_id || event.origin_server_ts <= start_ms {
                    continue;
                }
                let sender_display = matrix.display_name(&event.sender).await;
                let is_admin = ctx.admins.iter().any(|a| a == &sender_display);
                let Some((cmd, args)) = router.dispatch(body, is_admin, Some(&ctx.bot_name)) else {
                    continue;
                };
                info!("{} in {}: {:?}", sender_display, room, cmd);
                if let Err(e) =
                    handlers::execute(&mut ctx, cmd, room, &event.sender, &sender_display, &args)
                        .await
                {
                    error!("Command {:?} failed: {e:#}", cmd);
                }
            }
        }
    }
}
