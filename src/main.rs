// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use mnemo_pipeline::config::{load_and_validate_config, RuntimeBuilder};
use mnemo_pipeline::model::TaskData;

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <config.yaml|config.toml> <document text>...", args[0]);
        eprintln!();
        eprintln!("Examples:");
        eprintln!(
            "  {} configs/demo.yaml \"Ada Lovelace corresponded with Charles Babbage.\"",
            args[0]
        );
        eprintln!(
            "  RUST_LOG=mnemo_pipeline=debug {} configs/demo.toml \"first doc\" \"second doc\"",
            args[0]
        );
        std::process::exit(1);
    }

    let config_file = &args[1];
    let documents: Vec<Value> = args[2..].iter().cloned().map(Value::String).collect();
    run_single_config(config_file, documents).await
}

async fn run_single_config(config_file: &str, documents: Vec<Value>) -> anyhow::Result<()> {
    let start_time = Instant::now();

    let config = load_and_validate_config(config_file)
        .with_context(|| format!("loading configuration from {}", config_file))?;
    let runtime = RuntimeBuilder::from_config(&config).context("building pipeline runtime")?;

    println!("📋 Configuration: {}", config_file);
    println!("🧵 Pipeline: {}", runtime.pipeline.name());
    println!("🔗 Tasks: {}", runtime.pipeline.task_names().join(" -> "));
    println!(
        "⚙️  Embedding: {} call(s) in flight, {} item(s) per batch",
        config.embedding_concurrency_limit, config.embedding_batch_size
    );
    println!("📄 Documents: {}", documents.len());

    let handle = runtime
        .orchestrator
        .submit(runtime.pipeline.clone(), TaskData::Value(Value::Array(documents)));
    let run_id = handle.run_id();
    println!("🚀 Run submitted: {}", run_id);

    // Poll the status the way an outside caller would, until the run settles.
    let mut last_seen = None;
    loop {
        let status = runtime.orchestrator.get_status(run_id)?;
        let seen = (status.status, status.current_task.clone());
        if last_seen.as_ref() != Some(&seen) {
            println!(
                "   {:>10} {:>5.1}%  {}",
                status.status.to_string(),
                status.progress * 100.0,
                status.current_task.as_deref().unwrap_or("-")
            );
            last_seen = Some(seen);
        }
        if status.status.is_terminal() {
            break;
        }
        tokio::time::sleep(STATUS_POLL_INTERVAL).await;
    }

    let result = handle.wait().await?;
    let report = result.report;

    println!("\n📊 Execution Results:");
    println!("⏱️  Execution Time: {:?}", start_time.elapsed());
    println!("🏁 Final Status: {}", report.status);

    println!("\n🔄 Task Records:");
    for record in runtime.orchestrator.records(run_id)? {
        println!(
            "  {}. {} {} ({} attempt(s), {} ms)",
            record.index + 1,
            record.task,
            record.outcome,
            record.attempts,
            (record.ended_at - record.started_at).num_milliseconds()
        );
        for error in &record.errors {
            println!("     ⚠️  {}", error);
        }
        for failure in &record.item_failures {
            println!("     ⤫ {} ({}): {}", failure.item_id, failure.class, failure.reason);
        }
    }
    if report.items_failed > 0 {
        println!("  Items dropped: {}", report.items_failed);
    }

    if let Some(summary) = &report.write_summary {
        println!("\n💾 Write Summary:");
        println!("  Batches: {} ({} failed)", summary.batches, summary.failed_batches);
        println!(
            "  Records: {} written, {} failed",
            summary.records_written, summary.records_failed
        );
        for (backend, failures) in &summary.backend_failures {
            println!("  {} failures: {}", backend, failures);
        }
    }

    println!("\n🗄️  Stores:");
    println!("  graph:      {} record(s)", runtime.stores.graph.len());
    println!("  vector:     {} record(s)", runtime.stores.vector.len());
    println!("  relational: {} record(s)", runtime.stores.relational.len());

    if let Some(error) = &report.error {
        println!("\n❌ Error ({}): {}", error.class, error.message);
        std::process::exit(2);
    }
    Ok(())
}
