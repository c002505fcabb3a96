// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use roadwatch::events::AppData;
use roadwatch::pipeline::{EventReceiver, CONTENT_TYPE};
use roadwatch::{ActiveModel, Config, LookoutStore, Notifier, PipelineBuilder};
use std::path::PathBuf;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "roadwatch", about = "Traffic violation detection over recorded footage")]
struct Args {
    /// YAML configuration; built-in defaults when omitted
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Overrides `active_model` from the configuration
    #[arg(long)]
    model: Option<ActiveModel>,
    /// Where the multipart JPEG stream is written
    #[arg(long, value_name = "PATH", default_value = "roadwatch.mjpeg")]
    output: PathBuf,
    /// Write every server event as one JSON line
    #[arg(long, value_name = "PATH")]
    events: Option<PathBuf>,
    /// Plate to add to the lookout list (repeatable)
    #[arg(long = "lookout-vehicle", value_name = "PLATE")]
    lookout_vehicles: Vec<String>,
    /// Person reference to add to the lookout list (repeatable)
    #[arg(long = "lookout-person", value_name = "REF")]
    lookout_persons: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.directive()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚦 Roadwatch starting");
    match &args.config {
        Some(path) => info!("✓ Configuration loaded from {}", path.display()),
        None => info!("✓ Using built-in configuration"),
    }

    let model = args.model.unwrap_or(config.active_model);

    let mut seed: AppData = config.lookout.seed();
    seed.lookout_vehicles.extend(args.lookout_vehicles.iter().cloned());
    seed.lookout_persons.extend(args.lookout_persons.iter().cloned());
    let store = LookoutStore::with_data(Notifier::new(), seed);
    let watching = store.snapshot();
    info!(
        "👀 Lookout: {} vehicle(s), {} person(s)",
        watching.lookout_vehicles.len(),
        watching.lookout_persons.len()
    );

    let event_writer = match &args.events {
        Some(path) => Some(spawn_event_writer(path.clone(), store.connect()).await?),
        None => None,
    };

    let runner = PipelineBuilder::new(&config, store.clone())
        .build(model)
        .with_context(|| format!("Failed to build {} pipeline", model))?;
    info!("✓ {} pipeline ready", model);
    let metrics = runner.metrics();
    let notifier = store.notifier().clone();

    let file = tokio::fs::File::create(&args.output)
        .await
        .with_context(|| format!("Cannot create {}", args.output.display()))?;
    let mut out = BufWriter::new(file);
    info!("💾 Stream ({}) -> {}", CONTENT_TYPE, args.output.display());

    let mut stream = runner.into_stream();
    let mut parts: u64 = 0;
    while let Some(part) = stream.next().await {
        if let Err(e) = out.write_all(&part).await {
            error!("Failed to write stream part {}: {}", parts, e);
            break;
        }
        parts += 1;
    }
    drop(stream);
    out.flush().await?;

    let dropped = notifier.dropped_count();
    // Closing every sender lets the event writer drain and stop
    drop(notifier);
    drop(store);
    if let Some(handle) = event_writer {
        match handle.await {
            Ok(Ok(lines)) => info!("📝 {} event(s) written", lines),
            Ok(Err(e)) => warn!("Event log incomplete: {:#}", e),
            Err(e) => warn!("Event writer stopped: {}", e),
        }
    }

    let summary = metrics.summary(dropped);
    info!("\n📊 Final Report ({}):", model);
    info!("  Frames processed: {}", summary.total_frames);
    info!("  Stream parts written: {}", parts);
    info!("  Detections: {}", summary.total_detections);
    info!("  🔢 Tracked objects: {}", summary.tracked_objects);
    info!("  🚨 Events opened: {}", summary.events_opened);
    info!("  🔄 Events updated: {}", summary.events_updated);
    info!("  ✅ Events closed: {}", summary.events_closed);
    let failures = summary.detector_failures
        + summary.recognition_failures
        + summary.snapshot_failures
        + summary.encode_failures;
    if failures > 0 {
        warn!(
            "  ⚠️  Transient failures: detector {} | recognition {} | snapshot {} | encode {}",
            summary.detector_failures,
            summary.recognition_failures,
            summary.snapshot_failures,
            summary.encode_failures
        );
    }
    if summary.subscribers_dropped > 0 {
        warn!("  Subscribers dropped: {}", summary.subscribers_dropped);
    }
    info!("  Processing Speed: {:.1} FPS", summary.fps);

    Ok(())
}

/// Appends each event to `path` as `{event, data}` JSON, one per line.
async fn spawn_event_writer(
    path: PathBuf,
    mut rx: EventReceiver,
) -> Result<JoinHandle<Result<u64>>> {
    let file = tokio::fs::File::create(&path)
        .await
        .with_context(|| format!("Cannot create event log {}", path.display()))?;
    info!("📝 Events -> {}", path.display());

    Ok(tokio::spawn(async move {
        let mut out = BufWriter::new(file);
        let mut lines = 0u64;
        while let Some(event) = rx.recv().await {
            let json = event.to_json().context("Failed to serialise event")?;
            out.write_all(json.as_bytes()).await?;
            out.write_all(b"\n").await?;
            lines += 1;
        }
        out.flush().await?;
        Ok(lines)
    }))
}
