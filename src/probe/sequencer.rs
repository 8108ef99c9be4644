//! Probe conversation sequencing
//!
//! Drives the fixed three-message conversation against one server session:
//! `initialize` with the scenario's workspace root, `initialized`, then a
//! `textDocument/didOpen` for a synthetic document. The probe does not care
//! about reply payloads, only about the root-resolution side effects the
//! server logs while handling them.

use std::time::Duration;

use lsp_types::{
    ClientCapabilities, DidOpenTextDocumentParams, InitializeParams, InitializedParams,
    TextDocumentItem, Uri, WorkspaceFolder,
};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::probe::classifier::{Verdict, classify};
use crate::probe::config::ProbeConfig;
use crate::probe::error::ProbeError;
use crate::probe::scenario::WorkspaceScenario;
use crate::protocol::{encode_notification, encode_request};
use crate::session::{CapturedOutput, ServerSession};

/// Request id assigned to the initialize request
const INITIALIZE_REQUEST_ID: u64 = 1;

/// Everything observed while probing one scenario; immutable once built
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// Description of the scenario this outcome belongs to
    pub description: String,

    /// Captured server output
    pub captured: CapturedOutput,

    /// Classifier judgment
    pub verdict: Verdict,

    /// Failure that cut the scenario short, if any
    pub failure: Option<String>,
}

/// Run the probe conversation for one scenario
///
/// Spawn failures propagate so the runner can decide whether the server
/// binary itself is unusable; every other failure is folded into an
/// inconclusive outcome carrying whatever output was captured.
pub async fn run_probe(
    scenario: &WorkspaceScenario,
    config: &ProbeConfig,
) -> Result<ProbeOutcome, ProbeError> {
    info!("Probing scenario: {}", scenario.description);

    let mut session = ServerSession::spawn(&config.server_command, &config.server_args)?;

    let outcome = match conversation(&mut session, scenario, config).await {
        Ok(()) => match session.drain(config.drain_timeout).await {
            Ok(captured) => {
                let verdict = classify(&captured.stderr);
                debug!("Scenario '{}' verdict: {:?}", scenario.description, verdict);
                ProbeOutcome {
                    description: scenario.description.clone(),
                    captured,
                    verdict,
                    failure: None,
                }
            }
            Err(e) => {
                warn!(
                    "Drain failed for '{}': {} (server still running: {})",
                    scenario.description,
                    e,
                    session.is_running()
                );
                inconclusive_outcome(scenario, session.captured(), e)
            }
        },
        Err(e) => {
            warn!("Conversation failed for '{}': {}", scenario.description, e);
            session.terminate().await;
            inconclusive_outcome(scenario, session.captured(), e)
        }
    };

    Ok(outcome)
}

/// Build the inconclusive outcome for a scenario-local failure
fn inconclusive_outcome(
    scenario: &WorkspaceScenario,
    captured: CapturedOutput,
    failure: ProbeError,
) -> ProbeOutcome {
    ProbeOutcome {
        description: scenario.description.clone(),
        captured,
        verdict: Verdict::Inconclusive,
        failure: Some(failure.to_string()),
    }
}

/// Send the fixed message sequence and half-close the input
async fn conversation(
    session: &mut ServerSession,
    scenario: &WorkspaceScenario,
    config: &ProbeConfig,
) -> Result<(), ProbeError> {
    let init_frame = encode_request(
        "initialize",
        Some(initialize_params(scenario)?),
        INITIALIZE_REQUEST_ID,
    )?;
    session.send(&init_frame).await?;

    // Bounded wait: proceed on a matching reply or when the grace elapses
    await_reply(session, INITIALIZE_REQUEST_ID, config.init_grace).await;

    let initialized_frame = encode_notification(
        "initialized",
        Some(serde_json::to_value(InitializedParams {})?),
    )?;
    session.send(&initialized_frame).await?;

    let did_open_frame = encode_notification(
        "textDocument/didOpen",
        Some(did_open_params(scenario, config)?),
    )?;
    session.send(&did_open_frame).await?;

    // No reply to wait for after a notification; give the server time to
    // resolve the root and log about it
    tokio::time::sleep(config.settle_grace).await;

    session.close_stdin();
    Ok(())
}

/// Wait for a server reply carrying `id`, bounded by `grace`
///
/// Unrelated server messages (log notifications, progress) are skipped. The
/// wait never fails: silence simply means the full grace period is consumed.
async fn await_reply(session: &mut ServerSession, id: u64, grace: Duration) {
    let deadline = Instant::now() + grace;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            trace!("Grace period elapsed without reply id {}", id);
            return;
        }

        match session.next_server_message(remaining).await {
            Some(body) => {
                if let Ok(value) = serde_json::from_str::<Value>(&body)
                    && value.get("id").and_then(Value::as_u64) == Some(id)
                {
                    debug!("Received reply for request id {}", id);
                    return;
                }
                trace!("Skipping unrelated server message");
            }
            None => return,
        }
    }
}

/// Build initialize params: root as both a single reference and a one-element
/// workspace folder list, with an empty capability declaration
fn initialize_params(scenario: &WorkspaceScenario) -> Result<Value, ProbeError> {
    let root_uri = parse_uri(&scenario.root_uri)?;

    #[allow(deprecated)]
    let params = InitializeParams {
        process_id: None,
        root_path: None,
        root_uri: Some(root_uri.clone()),
        initialization_options: None,
        capabilities: ClientCapabilities::default(),
        trace: None,
        workspace_folders: Some(vec![WorkspaceFolder {
            uri: root_uri,
            name: "test".to_string(),
        }]),
        client_info: None,
        locale: None,
        work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
    };

    Ok(serde_json::to_value(params)?)
}

/// Build didOpen params for the synthetic document under the workspace root
fn did_open_params(scenario: &WorkspaceScenario, config: &ProbeConfig) -> Result<Value, ProbeError> {
    let document_uri = parse_uri(&format!("{}/main.go", scenario.root_uri))?;

    let params = DidOpenTextDocumentParams {
        text_document: TextDocumentItem {
            uri: document_uri,
            language_id: config.document_language.clone(),
            version: 1,
            text: config.document_text.clone(),
        },
    };

    Ok(serde_json::to_value(params)?)
}

fn parse_uri(raw: &str) -> Result<Uri, ProbeError> {
    raw.parse::<Uri>().map_err(|e| ProbeError::InvalidConfig {
        reason: format!("invalid workspace URI '{raw}': {e}"),
    })
}
