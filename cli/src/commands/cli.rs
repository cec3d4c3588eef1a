use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use skillbatch_core::api::AppConfig;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFormat {
    Text,
    Jsonl,
}

impl EventFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Jsonl => "jsonl",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "skillbatch", version, about = "Run a skill over a batch of records")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Skill file (JSON: name, instructions, optional function_definition).
    #[arg(long)]
    pub skill: PathBuf,

    /// Input records: a JSON array or JSON Lines.
    #[arg(long)]
    pub input: PathBuf,

    /// Where to write the results document. Defaults to stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Chat-completions URL (overrides `backend.url`).
    #[arg(long)]
    pub backend: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Dispatch starts allowed per window.
    #[arg(long)]
    pub rate_limit: Option<usize>,

    #[arg(long)]
    pub window_secs: Option<u64>,

    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Per-call timeout in milliseconds; 0 disables it.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Print lifecycle events to stderr in this format (replaces the progress bar).
    #[arg(long, value_enum)]
    pub format: Option<EventFormat>,

    /// Answer every task with its own input instead of calling the backend.
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long)]
    pub no_progress: bool,
}

impl RunArgs {
    /// CLI flags override config file and environment values.
    pub fn apply_to(&self, cfg: &mut AppConfig) {
        if let Some(url) = &self.backend {
            cfg.backend.url = url.clone();
        }
        if let Some(model) = &self.model {
            cfg.backend.model = model.clone();
        }
        if let Some(n) = self.concurrency {
            cfg.engine.concurrency_limit = n;
        }
        if let Some(n) = self.rate_limit {
            cfg.engine.rate_limit_per_window = n;
        }
        if let Some(s) = self.window_secs {
            cfg.engine.window_seconds = s;
        }
        if let Some(n) = self.max_attempts {
            cfg.retry.max_attempts = n;
        }
        if let Some(ms) = self.timeout_ms {
            cfg.engine.per_call_timeout_ms = Some(ms);
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Run(RunArgs),
}
