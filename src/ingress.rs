use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::action::parse_sequence;
use crate::engine::Engine;
use crate::error::ShowError;
use crate::registry::RunId;
use crate::tempo::{ReportOutcome, TempoReport};

/// Handles one request line and returns the response document. A `tag`
/// field on the request is echoed back so callers can match responses.
pub async fn handle(engine: &Engine, line: &str) -> Value {
    let request: Value = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return error(ShowError::from(e)),
    };

    let mut response = match dispatch(engine, &request).await {
        Ok(response) => response,
        Err(e) => error(e),
    };
    if let (Some(tag), Value::Object(map)) = (request.get("tag"), &mut response) {
        map.insert("tag".into(), tag.clone());
    }
    response
}

fn error(e: ShowError) -> Value {
    log::warn!("rejected request: {}", e);
    json!({ "error": e.to_string() })
}

async fn dispatch(engine: &Engine, request: &Value) -> Result<Value, ShowError> {
    let cmd = request.get("cmd").and_then(Value::as_str).unwrap_or_default();
    match cmd {
        "show" => {
            let sequence = parse_sequence(request.get("sequence").unwrap_or(&Value::Null))?;
            log::debug!("show: {}", serde_json::to_string(&sequence)?);
            Ok(json!({ "id": engine.submit(sequence) }))
        }
        "stop" => match request.get("id") {
            None | Some(Value::Null) => {
                engine.stop_all().await;
                Ok(json!({ "stopped": true }))
            }
            Some(id) => {
                let stopped = match id.as_u64().and_then(|id| RunId::try_from(id).ok()) {
                    Some(id) => engine.stop(id),
                    None => {
                        log::warn!("stop for malformed run id {}", id);
                        false
                    }
                };
                Ok(json!({ "stopped": stopped }))
            }
        },
        "status" => Ok(serde_json::to_value(engine.status())?),
        "channels" => Ok(json!({ "channels": engine.levels().to_vec() })),
        "data" => {
            let force = request.get("allowed").is_some();
            let outcome = engine.report_tempo(tempo_report(request), force);
            Ok(match outcome {
                ReportOutcome::Applied => json!({ "status": "applied" }),
                ReportOutcome::Ignored => json!({
                    "status": "ignored",
                    "message": "analyzer disabled",
                    "analyzer_enabled": engine.analyzer_enabled(),
                }),
            })
        }
        "analyzer" => {
            let enabled = request.get("enabled").and_then(Value::as_bool).unwrap_or(false);
            engine.set_analyzer(enabled);
            Ok(json!({ "analyzer_enabled": enabled }))
        }
        other => Err(ShowError::UnknownCommand(other.to_string())),
    }
}

/// Pulls `ms` and `rms` out of an analyzer report. Fields of the wrong type
/// are logged and dropped, leaving the previous tempo in place.
fn tempo_report(request: &Value) -> TempoReport {
    let field = |key: &str| match request.get(key) {
        None | Some(Value::Null) => None,
        Some(v) => {
            let n = v.as_f64();
            if n.is_none() {
                log::warn!("ignoring malformed {} in tempo report: {}", key, v);
            }
            n
        }
    };
    TempoReport { ms: field("ms"), rms: field("rms") }
}

/// Reads requests line by line from `input` and writes one response line
/// per request to `output`. Requests are handled concurrently, so a
/// blocking stop-all doesn't hold up status queries.
pub async fn serve<R, W>(engine: Arc<Engine>, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            let mut line = response.to_string();
            line.push('\n');
            output.write_all(line.as_bytes()).await?;
            output.flush().await?;
        }
        Ok::<_, anyhow::Error>(())
    });

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let engine = engine.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let response = handle(&engine, &line).await;
            let _ = tx.send(response);
        });
    }
    drop(tx);

    writer.await??;
    Ok(())
}
