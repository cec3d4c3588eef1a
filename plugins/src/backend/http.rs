use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use skillbatch_core::api::{
    BackendConfig, FunctionDefinition, InvokeFailure, InvokeRequest, InvokeResponse, Invoker,
    Usage,
};

const BODY_PREVIEW_LIMIT: usize = 512;

/// OpenAI-compatible chat-completions invoker.
///
/// Maps transport and HTTP outcomes onto the engine's failure taxonomy:
/// timeouts, connection errors, 408/409/429 and 5xx are transient; other
/// 4xx are fatal; an unusable body is malformed.
#[derive(Clone)]
pub struct HttpInvoker {
    http: reqwest::Client,
    config: BackendConfig,
}

impl HttpInvoker {
    pub fn new(config: BackendConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.api_key.trim().is_empty() {
            req
        } else {
            req.bearer_auth(&self.config.api_key)
        }
    }

    fn build_body(&self, request: &InvokeRequest<'_>) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = self.config.system_prompt.as_deref() {
            if !system.trim().is_empty() {
                messages.push(json!({"role": "system", "content": system}));
            }
        }

        let mut content = user_content(request.payload);
        if let Some(schema) = request.schema {
            if !self.config.use_tools {
                content.push_str(&format!(
                    "\n\nRespond with a single JSON object matching this schema:\n{}",
                    schema.parameters
                ));
            }
        }
        messages.push(json!({"role": "user", "content": content}));

        let mut body = Map::new();
        body.insert("model".into(), json!(self.config.model));
        body.insert("messages".into(), Value::Array(messages));
        if let Some(t) = self.config.temperature {
            body.insert("temperature".into(), json!(t));
        }
        if let Some(n) = self.config.max_tokens {
            body.insert("max_tokens".into(), json!(n));
        }
        if let (Some(schema), true) = (request.schema, self.config.use_tools) {
            body.insert("tools".into(), json!([tool_spec(schema)]));
            body.insert(
                "tool_choice".into(),
                json!({"type": "function", "function": {"name": schema.name}}),
            );
        }
        Value::Object(body)
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    fn name(&self) -> &str {
        "http"
    }

    async fn invoke(&self, request: &InvokeRequest<'_>) -> Result<InvokeResponse, InvokeFailure> {
        let url = &self.config.url;
        tracing::debug!(
            target: "skillbatch.http",
            stage = "http.invoke.in",
            url = %url,
            task_id = %request.task_id,
            attempt = request.attempt
        );

        let req = self.http.post(url).json(&self.build_body(request));
        let resp = self
            .auth(req)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = resp.status();
        let body = resp.text().await.map_err(classify_reqwest)?;
        tracing::debug!(
            target: "skillbatch.http",
            stage = "http.invoke.out",
            task_id = %request.task_id,
            status = %status
        );

        if !status.is_success() {
            return Err(status_failure(status.as_u16(), &body));
        }
        parse_completion(&body)
    }
}

/// Renders a task payload as the user message.
///
/// Skill payloads (`instructions` + `input`) become an instruction block
/// followed by the JSON input; anything else is sent as JSON text.
fn user_content(payload: &Value) -> String {
    let Some(instructions) = payload.get("instructions").and_then(Value::as_str) else {
        return match payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    };

    let mut out = instructions.trim().to_string();
    if let Some(input) = payload.get("input") {
        out.push_str("\n\nInput:\n");
        out.push_str(&serde_json::to_string_pretty(input).unwrap_or_else(|_| input.to_string()));
    }
    if let Some(hint) = payload.get("repair_hint").and_then(Value::as_str) {
        out.push_str("\n\nNote: ");
        out.push_str(hint);
    }
    out
}

fn tool_spec(schema: &FunctionDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": schema.name,
            "description": schema.description,
            "parameters": schema.parameters,
        }
    })
}

fn classify_reqwest(err: reqwest::Error) -> InvokeFailure {
    if err.is_builder() {
        InvokeFailure::fatal(format!("invalid request: {err}"))
    } else if err.is_decode() {
        InvokeFailure::malformed(format!("undecodable response: {err}"))
    } else {
        // timeout, connect, request and body errors
        InvokeFailure::transient(format!("request failed: {err}"))
    }
}

fn status_failure(status: u16, body: &str) -> InvokeFailure {
    let message = format!("HTTP {status}: {}", preview_body(body));
    match status {
        408 | 409 | 429 | 500..=599 => InvokeFailure::transient(message),
        _ => InvokeFailure::fatal(message),
    }
}

fn parse_completion(body: &str) -> Result<InvokeResponse, InvokeFailure> {
    let v: Value = serde_json::from_str(body).map_err(|err| {
        InvokeFailure::malformed(format!(
            "response is not JSON: {err} | body={}",
            preview_body(body)
        ))
    })?;

    let usage = extract_usage(&v);
    let message = v
        .pointer("/choices/0/message")
        .ok_or_else(|| InvokeFailure::malformed("response has no choices[0].message"))?;

    if let Some(args) = message.pointer("/tool_calls/0/function/arguments") {
        let result = match args {
            Value::String(s) => serde_json::from_str::<Value>(s).map_err(|err| {
                InvokeFailure::malformed(format!("tool arguments are not JSON: {err}"))
            })?,
            other => other.clone(),
        };
        return Ok(InvokeResponse { result, usage });
    }

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| InvokeFailure::malformed("response message has no content"))?;
    let result = serde_json::from_str::<Value>(strip_code_fence(content)).map_err(|err| {
        InvokeFailure::malformed(format!(
            "content is not JSON: {err} | content={}",
            preview_body(content)
        ))
    })?;
    Ok(InvokeResponse { result, usage })
}

fn extract_usage(v: &Value) -> Usage {
    let Some(u) = v.get("usage") else {
        return Usage::default();
    };
    let read = |a: &str, b: &str| {
        u.get(a)
            .or_else(|| u.get(b))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    Usage::new(
        read("prompt_tokens", "input_tokens"),
        read("completion_tokens", "output_tokens"),
    )
}

fn strip_code_fence(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json") up to the first newline
    let rest = rest.split_once('\n').map(|(_, r)| r).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().count() > BODY_PREVIEW_LIMIT {
        out.push_str("...");
    }
    out
}
