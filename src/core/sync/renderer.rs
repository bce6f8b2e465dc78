//! HUD renderer for bulk runs.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::core::config::{DETAILED_FAILURE_LIMIT, ERROR_MESSAGE_MAX_LENGTH, NAME_DISPLAY_WIDTH};
use crate::core::sync::state::{ProgressEntry, ProgressStatus};
use crate::utils::truncate_message;

/// How much progress output a run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    Quiet,
    #[default]
    Compact,
    Detailed,
}

impl DisplayMode {
    /// Parses a mode name, falling back to compact for anything unknown
    pub fn parse_or_default(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Quiet => "quiet",
            DisplayMode::Compact => "compact",
            DisplayMode::Detailed => "detailed",
        }
    }
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quiet" => Ok(DisplayMode::Quiet),
            "compact" => Ok(DisplayMode::Compact),
            "detailed" => Ok(DisplayMode::Detailed),
            other => Err(format!("unknown display mode '{other}' (expected quiet, compact or detailed)")),
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tally of entries by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounts {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

impl ProgressCounts {
    pub fn finished(&self) -> usize {
        self.done + self.failed
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HudRenderer {
    mode: DisplayMode,
}

impl HudRenderer {
    pub fn new(mode: DisplayMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// Renders one snapshot; `entries` are expected in display order
    pub fn render(&self, counts: &ProgressCounts, entries: &[ProgressEntry], elapsed: Duration) -> String {
        match self.mode {
            DisplayMode::Quiet => String::new(),
            DisplayMode::Compact => headline(counts, elapsed),
            DisplayMode::Detailed => {
                let mut lines = vec![headline(counts, elapsed)];

                let active = entries.iter().filter(|e| e.status == ProgressStatus::Running);
                for entry in active {
                    lines.push(entry_line(entry));
                }

                let failures: Vec<&ProgressEntry> = entries
                    .iter()
                    .filter(|e| e.status == ProgressStatus::Failed)
                    .collect();
                for entry in failures.iter().take(DETAILED_FAILURE_LIMIT) {
                    lines.push(entry_line(entry));
                }
                if failures.len() > DETAILED_FAILURE_LIMIT {
                    lines.push(format!(
                        "   ... and {} more failures",
                        failures.len() - DETAILED_FAILURE_LIMIT
                    ));
                }
                lines.join("\n")
            }
        }
    }
}

fn headline(counts: &ProgressCounts, elapsed: Duration) -> String {
    let total = counts.total.max(1);
    let finished = counts.finished();
    let percent = finished.saturating_mul(100) / total;
    let eta = estimate_eta(elapsed, finished, counts.total);

    let mut line = format!(
        "🔄 Syncing {} repos • {}/{} • {}% • {} active",
        counts.total, finished, counts.total, percent, counts.running
    );
    if counts.failed > 0 {
        line.push_str(&format!(" • {} failed", counts.failed));
    }
    line.push_str(&format!(" • ETA {eta}"));
    line
}

fn entry_line(entry: &ProgressEntry) -> String {
    let name = truncate_message(&entry.repository, NAME_DISPLAY_WIDTH);
    let message = truncate_message(&entry.message, ERROR_MESSAGE_MAX_LENGTH);
    format!("   {} {:width$} {}", entry.status.icon(), name, message, width = NAME_DISPLAY_WIDTH)
}

fn estimate_eta(elapsed: Duration, finished: usize, total: usize) -> String {
    if finished == 0 {
        return "--".to_string();
    }
    let avg = elapsed.as_secs_f64() / finished as f64;
    let remaining = total.saturating_sub(finished) as f64 * avg;
    format_duration(Duration::from_secs_f64(remaining))
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let mins = secs / 60;
    let rem = secs % 60;
    if mins > 0 {
        format!("{mins}m {rem}s")
    } else {
        format!("{rem}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn counts() -> ProgressCounts {
        ProgressCounts {
            total: 4,
            queued: 1,
            running: 1,
            done: 1,
            failed: 1,
        }
    }

    fn entries() -> Vec<ProgressEntry> {
        let now = Instant::now();
        let mut running = ProgressEntry::queued("api", now);
        running.set(ProgressStatus::Running, "clone", 0.5);
        let mut failed = ProgressEntry::queued("web", now);
        failed.set(ProgressStatus::Failed, "authentication failed", 1.0);
        vec![running, failed, ProgressEntry::queued("docs", now)]
    }

    #[test]
    fn test_display_mode_parsing() {
        assert_eq!("Detailed".parse::<DisplayMode>().unwrap(), DisplayMode::Detailed);
        assert!("loud".parse::<DisplayMode>().is_err());
        assert_eq!(DisplayMode::parse_or_default("loud"), DisplayMode::Compact);
    }

    #[test]
    fn test_quiet_renders_nothing() {
        let renderer = HudRenderer::new(DisplayMode::Quiet);
        assert!(renderer.render(&counts(), &entries(), Duration::from_secs(3)).is_empty());
    }

    #[test]
    fn test_compact_is_one_line() {
        let renderer = HudRenderer::new(DisplayMode::Compact);
        let out = renderer.render(&counts(), &entries(), Duration::from_secs(10));
        assert_eq!(out.lines().count(), 1);
        assert!(out.contains("2/4"));
        assert!(out.contains("50%"));
        assert!(out.contains("1 failed"));
        assert!(out.contains("ETA 10s"));
    }

    #[test]
    fn test_detailed_lists_active_and_failed() {
        let renderer = HudRenderer::new(DisplayMode::Detailed);
        let out = renderer.render(&counts(), &entries(), Duration::from_secs(10));
        assert!(out.contains("api"));
        assert!(out.contains("authentication failed"));
        assert!(!out.contains("docs"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "59s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }
}
