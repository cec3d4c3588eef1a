//! Wires config, skill and records into a `ParallelEngine` run and writes the results.
use std::path::Path;
use std::time::Duration;

use serde_json::json;
use skillbatch_core::api::{
    AppConfig, BatchResult, BatchRun, CliError, ParallelEngine, ProgressMonitor,
};
use skillbatch_core::config::validate;
use skillbatch_plugins::{factory, skill};

use crate::commands::cli::RunArgs;

const PROGRESS_TICK: Duration = Duration::from_millis(100);

pub const EXIT_OK: i32 = 0;
pub const EXIT_TASKS_FAILED: i32 = 2;
pub const EXIT_CANCELLED: i32 = 130;

#[tracing::instrument(name = "cli.run_batch", skip_all)]
pub async fn run_batch(run_args: &RunArgs, mut cfg: AppConfig) -> Result<i32, CliError> {
    run_args.apply_to(&mut cfg);
    validate(&cfg)?;

    let skill = skill::load_skill(&run_args.skill)
        .map_err(|e| CliError::Input(format!("{e:#}")))?;
    let records = skill::read_records(&run_args.input)
        .map_err(|e| CliError::Input(format!("{e:#}")))?;
    let tasks = skill::build_tasks(&skill, records);
    tracing::info!(skill = %skill.name, tasks = tasks.len(), dry_run = run_args.dry_run, "batch prepared");

    let invoker = factory::build_invoker(&cfg, run_args.dry_run)?;
    let mut builder = ParallelEngine::builder(invoker)
        .config(cfg.engine.clone())
        .retry_strategy(factory::build_retry_strategy(&cfg.retry))
        .processor(factory::build_processor(&cfg.retry));
    if let Some(renderer) = run_args
        .format
        .and_then(|f| factory::build_renderer(f.as_str()))
    {
        builder = builder.renderer(renderer);
    }
    let engine = builder.build();

    let run = engine.spawn(tasks)?;
    let show_progress =
        !run_args.no_progress && run_args.format.is_none() && atty::is(atty::Stream::Stderr);
    let monitor = ProgressMonitor::new(run.progress().total, show_progress);

    supervise(&run, &monitor).await;
    let result = run.wait().await?;
    monitor.finish(&result);

    write_results(&result, run_args.output.as_deref()).await?;

    eprintln!("{}", result.summary());
    let cost = result.estimated_cost(&cfg.pricing);
    if cost > 0.0 {
        eprintln!(
            "tokens: {} in / {} out, estimated cost ${:.4}",
            result.usage.input_tokens, result.usage.output_tokens, cost
        );
    }

    Ok(exit_code_for_result(&result))
}

/// Feeds the progress bar until the run finishes; Ctrl-C cancels it.
async fn supervise(run: &BatchRun, monitor: &ProgressMonitor) {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    tracing::warn!(error = %e, "failed to listen for ctrl-c");
                }
                tracing::warn!(run_id = %run.run_id(), "interrupted; cancelling run");
                run.cancel();
                return;
            }
            _ = tokio::time::sleep(PROGRESS_TICK) => {
                monitor.update(&run.progress());
                if run.is_finished() {
                    return;
                }
            }
        }
    }
}

pub fn render_document(result: &BatchResult) -> serde_json::Value {
    json!({
        "run_id": result.run_id,
        "started_at": result.started_at.to_rfc3339(),
        "total": result.total,
        "succeeded": result.succeeded,
        "failed": result.failed,
        "completed": result.completed,
        "duration_ms": result.duration_ms,
        "usage": result.usage,
        "results": result.results_json(),
    })
}

async fn write_results(result: &BatchResult, output: Option<&Path>) -> Result<(), CliError> {
    let doc = render_document(result);
    let text = serde_json::to_string_pretty(&doc).map_err(|e| CliError::Command(e.to_string()))?;
    match output {
        Some(path) => {
            tokio::fs::write(path, format!("{text}\n")).await?;
            tracing::info!(path = %path.display(), "results written");
        }
        None => println!("{text}"),
    }
    Ok(())
}

pub fn exit_code_for_result(result: &BatchResult) -> i32 {
    if !result.completed {
        EXIT_CANCELLED
    } else if result.failed > 0 {
        EXIT_TASKS_FAILED
    } else {
        EXIT_OK
    }
}
