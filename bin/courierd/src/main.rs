//! ---
//! courier_section: "04-daemon"
//! courier_subsection: "binary"
//! courier_type: "source"
//! courier_scope: "code"
//! courier_description: "Binary entrypoint for the Courier daemon."
//! courier_version: "v0.0.0-prealpha"
//! courier_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use courier_common::config::{AppConfig, BindingResetPolicy, BridgeConfig, CodecKind};
use courier_common::logging::init_tracing;
use courier_msg::{
    replay_from_file, spawn_bridge, AnyCodec, BridgeMetricsExporter, BridgeService,
    RecordingHost, ScriptParser,
};
use prometheus::{Registry, TextEncoder};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

type DaemonBridge = BridgeService<RecordingHost, AnyCodec>;

#[derive(Debug, Parser)]
#[command(author, version, about = "Courier ordered-delivery daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "NAME", help = "Override the destination label")]
    destination: Option<String>,

    #[arg(long, value_name = "CODEC", help = "Override the payload codec (json, cbor)")]
    codec: Option<CodecKind>,

    #[arg(
        long,
        value_name = "POLICY",
        help = "Override the binding reset policy (preserve, drop)"
    )]
    reset_policy: Option<BindingResetPolicy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Replay a JSON-lines event script and print every delivery")]
    Replay {
        #[arg(long, value_name = "FILE")]
        script: PathBuf,
        #[arg(long, help = "Print prometheus metrics after the replay")]
        metrics: bool,
    },
    #[command(about = "Apply JSON-lines events read from stdin on a bridge task")]
    Stream {
        #[arg(long, help = "Print prometheus metrics once stdin closes")]
        metrics: bool,
    },
    #[command(about = "Validate configuration and exit")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/courier.toml"));
    candidates.push(PathBuf::from("configs/courier.example.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(destination) = cli.destination {
        config.bridge.destination = destination;
    }
    if let Some(codec) = cli.codec {
        config.bridge.codec = codec;
    }
    if let Some(policy) = cli.reset_policy {
        config.bridge.binding_reset_policy = policy;
    }
    config.validate()?;

    init_tracing("courierd", &config)?;
    info!(
        config_path = %loaded.source.display(),
        destination = %config.bridge.destination,
        codec = %config.bridge.codec,
        reset_policy = %config.bridge.binding_reset_policy,
        "configuration loaded"
    );

    match cli.command {
        Commands::Replay { script, metrics } => replay(&config.bridge, &script, metrics),
        Commands::Stream { metrics } => stream(&config.bridge, metrics).await,
        Commands::CheckConfig => {
            println!("configuration ok: {}", loaded.source.display());
            Ok(())
        }
    }
}

fn build_bridge(config: &BridgeConfig, registry: &Registry) -> Result<DaemonBridge> {
    let exporter = BridgeMetricsExporter::register(registry, &config.destination)
        .context("failed to register bridge metrics")?;
    let service = BridgeService::from_config(
        config,
        RecordingHost::with_context(),
        AnyCodec::from(config.codec),
    );
    Ok(service.with_metrics_exporter(exporter))
}

fn replay(config: &BridgeConfig, script: &Path, show_metrics: bool) -> Result<()> {
    let registry = Registry::new();
    let mut service = build_bridge(config, &registry)?;
    let applied = replay_from_file(&mut service, script)
        .with_context(|| format!("failed to replay {}", script.display()))?;
    info!(applied, script = %script.display(), "script replay finished");
    finish(service, &registry, show_metrics)
}

async fn stream(config: &BridgeConfig, show_metrics: bool) -> Result<()> {
    let registry = Registry::new();
    let service = build_bridge(config, &registry)?;
    let codec = *service.codec();
    let (handle, task) = spawn_bridge(service);

    let mut parser = ScriptParser::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        line_no += 1;
        match parser.parse_line(&codec, line_no, &line) {
            Ok(Some(event)) => handle.send(event)?,
            Ok(None) => {}
            Err(err) => warn!(error = %err, "skipping input line"),
        }
    }
    drop(handle);

    let (service, summary) = task.await.context("bridge task failed")?;
    info!(
        events = summary.events,
        failures = summary.failures.len(),
        "event stream closed"
    );
    finish(service, &registry, show_metrics)
}

fn finish(service: DaemonBridge, registry: &Registry, show_metrics: bool) -> Result<()> {
    let metrics = service.metrics();
    let pending = service.pending_len();
    let host = service.shutdown();

    for delivery in host.deliveries() {
        println!("{}", serde_json::to_string(delivery)?);
    }
    info!(
        received = metrics.received,
        buffered = metrics.buffered,
        delivered = metrics.delivered,
        replayed = metrics.replayed,
        dropped = metrics.dropped,
        codec_failures = metrics.codec_failures,
        bindings_activated = metrics.bindings_activated,
        bindings_released = metrics.bindings_released,
        depth_warnings = metrics.depth_warnings,
        pending_peak = metrics.pending_peak,
        pending,
        "bridge metrics"
    );

    if show_metrics {
        let text = TextEncoder::new()
            .encode_to_string(&registry.gather())
            .context("failed to encode metrics")?;
        print!("{text}");
    }
    Ok(())
}
