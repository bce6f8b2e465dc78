//! Terminal output helpers

use std::io::{IsTerminal, Write};

/// Sets the terminal title when stdout is a terminal
pub fn set_terminal_title(title: &str) {
    let mut stdout = std::io::stdout();
    if !stdout.is_terminal() {
        return;
    }
    // OSC 0: set icon name and window title
    let _ = write!(stdout, "\x1b]0;{title}\x07");
    let _ = stdout.flush();
}

/// Collapses a message to one line of at most `max_chars` characters
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    let line = message.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = line.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_message() {
        assert_eq!(truncate_message("short", 10), "short");
        assert_eq!(truncate_message("\n  first line\nsecond", 20), "first line");
        assert_eq!(truncate_message("abcdefghijkl", 8), "abcde...");
    }
}
