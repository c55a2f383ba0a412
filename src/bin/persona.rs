//! persona-kernel demo driver.
//!
//! Runs a few cognitive cycles through a fresh kernel and prints the
//! resulting system prompts and audit trails.
//!
//! # Environment Variables
//!
//! - `PERSONA_CONFIG`: path to a YAML kernel config (default: built-in defaults)
//! - `PERSONA_EVENT_LOG`: where to dump the event log on exit (default: not saved)
//! - `RUST_LOG`: tracing filter (default: "info,persona_kernel=debug")

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use persona_kernel::evaluation::{check_leakage, summarize};
use persona_kernel::events::{Event, EventType, FnHandler};
use persona_kernel::{KernelConfig, PersonaService};

const DEMO_INPUTS: &[&str] = &[
    "Hello! What have you been thinking about lately?",
    "Calculate 512 * 1024 / 4",
    "I need some help feeling better",
];

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,persona_kernel=debug".into()),
        )
        .init();

    let config = match std::env::var_os("PERSONA_CONFIG") {
        Some(path) => {
            let path = PathBuf::from(path);
            KernelConfig::from_file(&path)
                .with_context(|| format!("loading config from {}", path.display()))?
        }
        None => KernelConfig::default(),
    };

    let mut service = PersonaService::new(config).context("starting persona kernel")?;
    service.subscribe(
        EventType::ArtifactReady,
        Arc::new(FnHandler::new("artifact-trace", |event: &Event| {
            tracing::debug!(
                trace_id = event.trace_id().unwrap_or("-"),
                "artifact ready"
            );
            Ok(())
        })),
    );

    let mut reports = Vec::new();
    for (i, input) in DEMO_INPUTS.iter().enumerate() {
        let ctx = service.run_cycle(input, "demo_session", None)?;
        let Some(artifact) = ctx.artifact.as_ref() else {
            continue;
        };

        println!("=== Cycle {} [{}] ===", i + 1, ctx.trace_id);
        println!("> {input}");
        println!("{}", artifact.system_prompt().unwrap_or_default());
        println!("reason codes: {}", ctx.reason_codes.join(", "));
        println!();

        if let Some(scene) = ctx.scene {
            reports.push(check_leakage(scene, artifact.system_prompt().unwrap_or_default()));
        }
        // Stand-in for the model's reply, so the drift controller has
        // something to observe.
        service.record_output(input);
    }

    let summary = summarize(&reports);
    println!(
        "leakage check: {}/{} passed ({:.2}%)",
        summary.passed, summary.total, summary.success_rate
    );

    let snapshot = service.take_snapshot("demo");
    println!("snapshot '{}' captured {} modules", snapshot.label, snapshot.module_states.len());

    let report = service.shutdown();
    tracing::info!(stopped = report.stopped, failed = report.failed, "kernel stopped");

    if let Some(path) = std::env::var_os("PERSONA_EVENT_LOG") {
        let path = PathBuf::from(path);
        let saved = service
            .bus()
            .save_event_log(&path)
            .with_context(|| format!("saving event log to {}", path.display()))?;
        println!("saved {} events to {}", saved, path.display());
    }

    let stats = service.bus().get_stats();
    println!(
        "bus: published={} processed={} errors={} dropped={}",
        stats.published, stats.processed, stats.errors, stats.dropped
    );
    Ok(())
}
