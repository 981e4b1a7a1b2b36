//! Run command implementation.

use revtree_core::{Event, Executable, ExecutionResult, Identifier, Readable, Repository, Value};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// A scripted list of changes.
#[derive(Debug, Serialize, Deserialize)]
pub struct Script {
    /// Identifier of the repository to create.
    pub repository: Identifier,
    /// Actor the changes run as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Identifier>,
    /// Commands and transactions, executed in order.
    pub changes: Vec<Executable>,
}

/// Outcome of one scripted change.
#[derive(Debug, Serialize)]
pub struct ChangeOutcome {
    /// Position in the script.
    pub index: usize,
    /// Address the change was sent to.
    pub target: String,
    /// `applied`, `no-change` or `failed`.
    pub status: &'static str,
    /// Revision or sentinel code.
    pub code: i64,
}

/// A field and its value after the script ran.
#[derive(Debug, Serialize)]
pub struct FieldState {
    /// Field address.
    pub address: String,
    /// Field revision.
    pub revision: u64,
    /// Current value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// A logged event.
#[derive(Debug, Serialize)]
pub struct LoggedEvent {
    /// Commit revision.
    pub revision: u64,
    /// Acting identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// One line per atomic change.
    pub changes: Vec<String>,
}

/// Everything the run command reports.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Outcome of each change.
    pub outcomes: Vec<ChangeOutcome>,
    /// Every field of every live model.
    pub fields: Vec<FieldState>,
    /// Change log of every model, if requested.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub log: Vec<LoggedEvent>,
}

/// Runs the run command.
pub fn run(path: &Path, format: &str, with_log: bool) -> Result<(), Box<dyn std::error::Error>> {
    let script = load_script(path)?;
    let report = execute_script(script, with_log)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

/// Reads a script from a JSON file.
pub fn load_script(path: &Path) -> Result<Script, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Executes a script against a fresh in-memory repository.
pub fn execute_script(script: Script, with_log: bool) -> Result<RunReport, Box<dyn std::error::Error>> {
    let repository = Repository::new(script.repository);
    let actor = script.actor.as_ref();

    let mut outcomes = Vec::with_capacity(script.changes.len());
    for (index, change) in script.changes.into_iter().enumerate() {
        let target = change.target().to_string();
        let result = repository.execute(actor, change)?;
        let status = match result {
            ExecutionResult::Applied { .. } => "applied",
            ExecutionResult::NoChange => "no-change",
            ExecutionResult::Failed => "failed",
        };
        info!(index, target = %target, status, "executed");
        outcomes.push(ChangeOutcome {
            index,
            target,
            status,
            code: result.code(),
        });
    }

    let mut fields = Vec::new();
    let mut log = Vec::new();
    for id in repository.model_ids() {
        if let Some(model) = repository.model(&id) {
            for object in model.objects() {
                for field in object.fields() {
                    fields.push(FieldState {
                        address: field.address().to_string(),
                        revision: field.revision(),
                        value: field.value().cloned(),
                    });
                }
            }
        }
        if let (true, Some(handle)) = (with_log, repository.handle(&id)) {
            log.extend(handle.events_since(0).iter().map(logged_event));
        }
    }

    Ok(RunReport {
        outcomes,
        fields,
        log,
    })
}

fn logged_event(event: &Event) -> LoggedEvent {
    let changes = event
        .atomic_events()
        .iter()
        .map(|atomic| match &atomic.new_value {
            Some(value) => format!("{} {} = {value:?}", atomic.action, atomic.changed),
            None => format!("{} {}", atomic.action, atomic.changed),
        })
        .collect();
    LoggedEvent {
        revision: event.revision(),
        actor: event.actor().map(ToString::to_string),
        changes,
    }
}

fn print_text_output(report: &RunReport) {
    println!("Changes:");
    for outcome in &report.outcomes {
        println!(
            "  #{:<3} {:<10} code {:>4}  {}",
            outcome.index, outcome.status, outcome.code, outcome.target
        );
    }

    println!();
    println!("Fields:");
    if report.fields.is_empty() {
        println!("  (none)");
    }
    for field in &report.fields {
        match &field.value {
            Some(value) => println!("  {} @{} = {value:?}", field.address, field.revision),
            None => println!("  {} @{}", field.address, field.revision),
        }
    }

    if !report.log.is_empty() {
        println!();
        println!("Change log:");
        for event in &report.log {
            let actor = event.actor.as_deref().unwrap_or("-");
            println!("  revision {} by {actor}", event.revision);
            for change in &event.changes {
                println!("    {change}");
            }
        }
    }
}
