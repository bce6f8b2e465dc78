//! Checkpoint inspection commands: list, show and clean

use anyhow::{Context, Result};
use std::fmt::Write as _;

use crate::core::failure_report;
use crate::state::{RunState, StateError, StateManager};

/// One line per checkpoint in `manager`'s directory
pub fn list_states(manager: &StateManager) -> Result<String> {
    let states = manager
        .list()
        .with_context(|| format!("failed to read checkpoints in {}", manager.dir().display()))?;
    if states.is_empty() {
        return Ok(format!("No checkpoints in {}", manager.dir().display()));
    }

    let mut out = format!("📋 CHECKPOINTS ({})\n", states.len());
    for (i, state) in states.iter().enumerate() {
        let tree_char = if i == states.len() - 1 { "└─" } else { "├─" };
        let _ = writeln!(
            out,
            "   {} {}/{:20} {:10} {:>5.1}% • {} failed • updated {}",
            tree_char,
            state.provider,
            state.organization,
            state.status.as_str(),
            state.progress_percent(),
            state.failed.len(),
            state.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(out.trim_end().to_string())
}

/// Detailed rendering of one checkpoint, including failures and remediation
pub fn show_state(manager: &StateManager, provider: &str, organization: &str) -> Result<String> {
    let state = manager
        .load(provider, organization)
        .with_context(|| format!("failed to load checkpoint for {provider}/{organization}"))?;
    Ok(describe(&state))
}

/// Deletes the checkpoint for one organization; returns whether one existed
pub fn clean_state(manager: &StateManager, provider: &str, organization: &str) -> Result<bool, StateError> {
    let existed = manager.has(provider, organization);
    manager.delete(provider, organization)?;
    if existed {
        tracing::info!("removed checkpoint for {provider}/{organization}");
    }
    Ok(existed)
}

/// Deletes every checkpoint; returns how many were removed
pub fn clean_all(manager: &StateManager) -> Result<usize, StateError> {
    let removed = manager.clean_all()?;
    tracing::info!("removed {removed} checkpoints from {}", manager.dir().display());
    Ok(removed)
}

fn describe(state: &RunState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Organization: {}/{}", state.provider, state.organization);
    let _ = writeln!(out, "Target:       {}", state.target_path.display());
    let _ = writeln!(out, "Status:       {}", state.status);
    let _ = writeln!(
        out,
        "Settings:     strategy {} • parallelism {} • max retries {}",
        state.settings.strategy, state.settings.parallelism, state.settings.max_retries
    );
    let _ = writeln!(out, "Started:      {}", state.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "Updated:      {}", state.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(
        out,
        "Progress:     {:.1}% • {} completed • {} failed • {} pending",
        state.progress_percent(),
        state.completed.len(),
        state.failed.len(),
        state.pending.len()
    );

    let report = failure_report(&state.organization, state.failures());
    if !report.is_empty() {
        let _ = write!(out, "\n{report}");
    }
    out.trim_end().to_string()
}
