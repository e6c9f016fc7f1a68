//! Query sessions: one-shot, JSON lines and interactive

use std::io::{BufRead, Write};

use colored::*;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use hrag_core::{
    CollectionInfo, Error, QueryError, QueryOutcome, QueryRequest, RAGEngine, Result, VectorIndex,
};

use crate::ui::{handle_input_with_history, print_help, render_error, render_outcome};

/// Structured error body returned to callers instead of a backtrace
pub fn error_json(error: &QueryError) -> serde_json::Value {
    json!({
        "error": error.to_string(),
        "kind": error.kind(),
    })
}

/// Serialize the outcome of one query the way callers see it
pub fn outcome_json(result: &std::result::Result<QueryOutcome, QueryError>) -> serde_json::Value {
    match result {
        Ok(outcome) => serde_json::to_value(&outcome.response)
            .unwrap_or_else(|e| json!({ "error": e.to_string(), "kind": "internal" })),
        Err(e) => error_json(e),
    }
}

/// Answer one request and return the JSON body.
pub async fn answer_json(engine: &dyn RAGEngine, request: &QueryRequest) -> serde_json::Value {
    let result = engine.query(request).await;
    if let Ok(outcome) = &result {
        for degradation in &outcome.degradations {
            debug!(?degradation, "query degraded");
        }
    }
    outcome_json(&result)
}

/// Read one `{"query": ...}` object per line and write one JSON response
/// per line. Blank lines are skipped; malformed lines get an error body.
pub async fn run_json_lines<R: BufRead, W: Write>(
    engine: &dyn RAGEngine,
    reader: R,
    mut writer: W,
) -> Result<usize> {
    let mut answered = 0;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let body = match serde_json::from_str::<QueryRequest>(&line) {
            Ok(request) => answer_json(engine, &request).await,
            Err(e) => {
                warn!(error = %e, "malformed request line");
                error_json(&QueryError::InvalidInput(format!("malformed request: {}", e)))
            }
        };

        let encoded =
            serde_json::to_string(&body).map_err(|e| Error::Serialization(e.to_string()))?;
        writeln!(writer, "{}", encoded)?;
        writer.flush()?;
        answered += 1;
    }

    Ok(answered)
}

/// Interactive question loop
pub async fn run_interactive(engine: &dyn RAGEngine) -> Result<()> {
    let mut history = Vec::new();
    let mut show_sources = true;

    while let Some(input) = handle_input_with_history(&mut history).await? {
        if input.is_empty() {
            continue;
        }

        match input.to_lowercase().as_str() {
            "exit" | "quit" => break,
            "help" => {
                print_help();
                continue;
            }
            "sources" => {
                show_sources = !show_sources;
                let state = if show_sources { "on" } else { "off" };
                println!("{} Sources {}", "ℹ️".cyan(), state);
                continue;
            }
            _ => {}
        }

        println!("{} Searching...", "🔎".blue());
        match engine.query(&QueryRequest::new(input)).await {
            Ok(outcome) => render_outcome(&outcome, show_sources),
            Err(e) => render_error(&e),
        }
        println!();
    }

    println!("{}", "👋 Goodbye!".green());
    Ok(())
}

/// Connectivity and schema status of the index
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub reachable: bool,
    pub collection: Option<CollectionInfo>,
    pub error: Option<String>,
}

impl CheckReport {
    /// Healthy only if the collection declares both named vectors.
    pub fn is_healthy(&self) -> bool {
        self.reachable
            && self.error.is_none()
            && self.collection.as_ref().is_some_and(|c| c.supports_hybrid())
    }
}

/// Verify the index is reachable and has the expected named vectors
pub async fn check_index(index: &dyn VectorIndex) -> CheckReport {
    if let Err(e) = index.health_check().await {
        return CheckReport {
            reachable: false,
            collection: None,
            error: Some(e.to_string()),
        };
    }

    match index.collection_info().await {
        Ok(info) => CheckReport {
            reachable: true,
            collection: Some(info),
            error: None,
        },
        Err(e) => CheckReport {
            reachable: true,
            collection: None,
            error: Some(e.to_string()),
        },
    }
}
