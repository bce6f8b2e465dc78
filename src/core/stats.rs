//! Run summary and failure reporting

use std::fmt;
use std::time::Duration;

use crate::core::config::{ERROR_MESSAGE_MAX_LENGTH, NAME_DISPLAY_WIDTH, PATH_DISPLAY_WIDTH};
use crate::core::errors::remediation;
use crate::state::FailedEntry;
use crate::utils::{shorten_path, truncate_message};

/// Final tally of a bulk run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = if self.is_success() { "✅" } else { "⚠️" };
        write!(
            f,
            "{} Completed in {:.1}s • {} synced",
            icon,
            self.elapsed.as_secs_f64(),
            self.succeeded
        )?;
        if self.failed > 0 {
            write!(f, " • {} failed", self.failed)?;
        }
        let skipped = self.total.saturating_sub(self.succeeded + self.failed);
        if skipped > 0 {
            write!(f, " • {} not processed", skipped)?;
        }
        Ok(())
    }
}

/// Tree-formatted failure list with a remediation hint under each entry
pub fn failure_report<'a, I>(organization: &str, failures: I) -> String
where
    I: IntoIterator<Item = &'a FailedEntry>,
{
    let failures: Vec<&FailedEntry> = failures.into_iter().collect();
    if failures.is_empty() {
        return String::new();
    }

    let mut lines = vec![format!("🔴 FAILED REPOS ({})", failures.len())];
    for (i, entry) in failures.iter().enumerate() {
        let last = i == failures.len() - 1;
        let (tree_char, continuation) = if last { ("└─", "  ") } else { ("├─", "│ ") };
        let short_path = shorten_path(&entry.path, PATH_DISPLAY_WIDTH);
        lines.push(format!(
            "   {} {:name_width$} {:path_width$} {} # {}",
            tree_char,
            entry.name,
            short_path,
            entry.operation,
            truncate_message(&entry.error, ERROR_MESSAGE_MAX_LENGTH),
            name_width = NAME_DISPLAY_WIDTH,
            path_width = PATH_DISPLAY_WIDTH,
        ));
        for hint in remediation(entry.class, organization, &entry.name, &entry.path) {
            lines.push(format!("   {}    💡 {}", continuation, hint));
        }
    }
    lines.join("\n")
}

/// Closing hints printed after a run that left work behind
pub fn next_steps(organization: &str, target: &std::path::Path) -> String {
    [
        "Next steps:".to_string(),
        format!(
            "   • Resume: fleet-sync sync --org {organization} --target {} --resume",
            target.display()
        ),
        format!("   • Inspect: fleet-sync state show --org {organization}"),
        format!("   • Start over: fleet-sync state clean --org {organization}"),
    ]
    .join("\n")
}
