//! `mystrom run`: the long-running engine.
//!
//! Each stdin line `path=value` is stored as an unacknowledged write and
//! routed through the controller, the way a host runtime would deliver a
//! user change. Ctrl-C stops the engine and saves the state snapshot.

use std::sync::Arc;

use mystrom_core::{DispatchOutcome, MemoryStore, StateStore, StateValue, SyncController};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;
use crate::output;

use super::{build_controller, load_config};

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = load_config(global)?;
    let path = args.state_file.clone().unwrap_or_else(|| cfg.state_path());
    let store = Arc::new(MemoryStore::open(&path)?);
    let controller = build_controller(&cfg, &store)?;

    controller.start().await?;
    info!(state = %path.display(), "engine running, Ctrl-C to stop");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let result = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => break signal.map_err(CliError::from),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => apply_line(&controller, &store, &line).await,
                Ok(None) => {
                    debug!("stdin closed, waiting for Ctrl-C");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed, ignoring further input");
                    stdin_open = false;
                }
            },
        }
    };

    controller.shutdown().await;
    if !args.no_save {
        store.save(&path)?;
        info!(state = %path.display(), objects = store.object_count(), "state snapshot saved");
    }
    result
}

async fn apply_line(controller: &SyncController, store: &MemoryStore, line: &str) {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return;
    }
    let Some((path, value)) = parse_write(line) else {
        warn!(line, "expected `path=value`");
        return;
    };

    match store.object(path) {
        Some(meta) if meta.writable => {}
        Some(_) => {
            warn!(path, "node is read-only");
            return;
        }
        None => {
            warn!(path, "no such node");
            return;
        }
    }

    if let Err(e) = store.set_state(path, value.clone(), false).await {
        warn!(path, error = %e, "failed to store write");
        return;
    }
    let outcome = controller.handle_state_change(path, &value, false).await;
    output::print_output(&describe(path, &outcome));
}

/// Split `path=value`. Bare `true`/`false`/`null` and numbers are typed;
/// everything else (or anything in double quotes) is text.
fn parse_write(line: &str) -> Option<(&str, StateValue)> {
    let (path, raw) = line.split_once('=')?;
    let path = path.trim();
    if path.is_empty() {
        return None;
    }

    let raw = raw.trim();
    let value = match raw {
        "true" => StateValue::Bool(true),
        "false" => StateValue::Bool(false),
        "null" => StateValue::Null,
        _ => {
            if let Some(text) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
                StateValue::Text(text.to_owned())
            } else {
                raw.parse::<f64>()
                    .map_or_else(|_| StateValue::Text(raw.to_owned()), StateValue::Number)
            }
        }
    };
    Some((path, value))
}

fn describe(path: &str, outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Sent => format!("{path}: sent"),
        DispatchOutcome::Applied => format!("{path}: applied"),
        DispatchOutcome::Ignored => format!("{path}: stored"),
        DispatchOutcome::Skipped { reason } => format!("{path}: skipped ({reason})"),
        DispatchOutcome::Failed { error } => format!("{path}: failed ({error})"),
    }
}
