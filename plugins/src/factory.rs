use std::sync::Arc;

use anyhow::Result;

use skillbatch_core::api::{
    AppConfig, ExponentialBackoff, Invoker, OutputRendererPlugin, PayloadProcessorPlugin,
    ResendUnchanged, RetryConfig, RetryStrategyPlugin,
};

use crate::backend::{EchoInvoker, HttpInvoker};
use crate::executor::{JsonlRendererPlugin, LinearRetryPlugin, RepairHintPlugin, TextRendererPlugin};

pub fn build_invoker(cfg: &AppConfig, dry_run: bool) -> Result<Arc<dyn Invoker>> {
    if dry_run {
        return Ok(Arc::new(EchoInvoker::new()));
    }
    Ok(Arc::new(HttpInvoker::new(cfg.backend.clone())?))
}

pub fn build_retry_strategy(cfg: &RetryConfig) -> Arc<dyn RetryStrategyPlugin> {
    match cfg.strategy.as_str() {
        "linear" => Arc::new(LinearRetryPlugin::new(cfg.clone())),
        // Validation rejects unknown names; anything else is the default.
        _ => Arc::new(ExponentialBackoff::new(cfg)),
    }
}

pub fn build_processor(cfg: &RetryConfig) -> Arc<dyn PayloadProcessorPlugin> {
    if cfg.repair_hint {
        Arc::new(RepairHintPlugin::new())
    } else {
        Arc::new(ResendUnchanged)
    }
}

pub fn build_renderer(format: &str) -> Option<Arc<dyn OutputRendererPlugin>> {
    match format {
        "jsonl" => Some(Arc::new(JsonlRendererPlugin::new(false))),
        "text" => Some(Arc::new(TextRendererPlugin::new(false))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_selects_plugins_by_name() {
        let mut retry = RetryConfig::default();
        assert_eq!(build_retry_strategy(&retry).name(), "exponential-backoff");
        assert_eq!(build_processor(&retry).name(), "resend-unchanged");

        retry.strategy = "linear".to_string();
        retry.repair_hint = true;
        assert_eq!(build_retry_strategy(&retry).name(), "linear");
        assert_eq!(build_processor(&retry).name(), "repair-hint");

        assert_eq!(build_renderer("jsonl").unwrap().format(), "jsonl");
        assert_eq!(build_renderer("text").unwrap().format(), "text");
        assert!(build_renderer("none").is_none());
    }

    #[test]
    fn test_dry_run_uses_echo() {
        let invoker = build_invoker(&AppConfig::default(), true).unwrap();
        assert_eq!(invoker.name(), "echo");
        let invoker = build_invoker(&AppConfig::default(), false).unwrap();
        assert_eq!(invoker.name(), "http");
    }
}
