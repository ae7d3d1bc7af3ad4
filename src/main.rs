use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use mindflow_engine::{RemoteTool, Summarizer, ToolRegistry, VoiceClient};
use mindflow_llm::BackendCatalog;
use mindflow_server::{AppState, ServerConfig};
use mindflow_settings::{load_settings_from_path, settings_path, Settings};
use mindflow_telemetry::{init_telemetry, TelemetryConfig};

/// Tool-using chat orchestration server.
#[derive(Debug, Parser)]
#[command(name = "mindflow", version)]
struct Cli {
    /// Settings file (default: ~/.mindflow/settings.json).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Listen port, overriding settings.
    #[arg(long)]
    port: Option<u16>,

    /// Log level, overriding settings.
    #[arg(long)]
    log_level: Option<String>,

    /// Human-readable logs instead of JSON lines.
    #[arg(long)]
    pretty_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("loading settings from {}", path.display()))?;
    apply_cli(&mut settings, &cli);

    let telemetry = init_telemetry(TelemetryConfig::from_levels(
        &settings.logging.level,
        settings
            .logging
            .modules
            .iter()
            .map(|(m, l)| (m.as_str(), l.as_str())),
        settings.logging.json,
    ));
    info!(settings = %path.display(), "starting Mindflow");

    let catalog = BackendCatalog::from_settings(&settings).context("building backends")?;
    if catalog.resolve(None).is_none() {
        warn!(default = catalog.default_name(), "default backend is not configured");
    }

    let mut tools = ToolRegistry::new();
    for tool in &settings.tools {
        let remote = RemoteTool::new(tool.clone())
            .with_context(|| format!("configuring tool {}", tool.name))?;
        tools.register(Arc::new(remote));
    }
    info!(tools = ?tools.names(), "tools registered");

    let summarizer: Option<Arc<dyn Summarizer>> = match VoiceClient::new(&settings.voice) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!(error = %e, "voice service disabled");
            None
        }
    };

    let state = AppState {
        catalog: Arc::new(catalog),
        tools: Arc::new(tools),
        summarizer,
        metrics: telemetry.metrics(),
        orchestration: settings.orchestration.clone(),
        channel_capacity: settings.server.channel_capacity,
    };
    let handle = mindflow_server::start(ServerConfig::from(settings.server.clone()), state)
        .await
        .context("starting server")?;
    info!(port = handle.port, "Mindflow ready");

    tokio::signal::ctrl_c()
        .await
        .context("listening for ctrl-c")?;
    info!("shutting down");
    handle.shutdown();
    Ok(())
}

fn apply_cli(settings: &mut Settings, cli: &Cli) {
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level = level.clone();
    }
    if cli.pretty_logs {
        settings.logging.json = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_settings() {
        let cli = Cli::parse_from([
            "mindflow",
            "--port",
            "8080",
            "--log-level",
            "debug",
            "--pretty-logs",
        ]);
        let mut settings = Settings::default();
        apply_cli(&mut settings, &cli);
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.logging.level, "debug");
        assert!(!settings.logging.json);
    }

    #[test]
    fn no_flags_keep_settings() {
        let cli = Cli::parse_from(["mindflow"]);
        let mut settings = Settings::default();
        apply_cli(&mut settings, &cli);
        assert_eq!(settings, Settings::default());
        assert!(cli.settings.is_none());
    }
}
