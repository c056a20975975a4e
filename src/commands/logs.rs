//! Display recent log entries from the application.

use crate::logging::{get_log_dir, list_log_files};
use anyhow::anyhow;
use std::fs;

const DEFAULT_LINES: usize = 50;

/// Shows the last lines of the newest log file.
///
/// # Errors
/// - If the log directory cannot be determined
/// - If log files cannot be read
pub fn handle_logs() -> anyhow::Result<()> {
    let log_dir = get_log_dir()?;

    let Some(log_file) = list_log_files(&log_dir)?.into_iter().next() else {
        println!("No log files found in: {}", log_dir.display());
        println!("Run 'taketrack' to generate logs.");
        return Ok(());
    };

    let content =
        fs::read_to_string(&log_file).map_err(|e| anyhow!("Failed to read log file: {e}"))?;
    if content.is_empty() {
        println!("Log file is empty: {}", log_file.display());
        return Ok(());
    }

    let lines: Vec<&str> = content.lines().collect();
    let shown = tail(&lines, DEFAULT_LINES);

    println!();
    if shown.len() < lines.len() {
        println!("Showing last {} of {} lines:", shown.len(), lines.len());
    } else {
        println!("Showing all {} lines:", lines.len());
    }
    println!("Full log file at: {}", log_file.display());
    println!();

    for line in shown {
        println!("{line}");
    }

    Ok(())
}

fn tail<'a, T>(items: &'a [T], n: usize) -> &'a [T] {
    &items[items.len().saturating_sub(n)..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail() {
        let lines: Vec<usize> = (0..120).collect();
        assert_eq!(tail(&lines, DEFAULT_LINES).first(), Some(&70));
        assert_eq!(tail(&lines, DEFAULT_LINES).len(), 50);
        assert_eq!(tail(&lines[..3], DEFAULT_LINES), &[0, 1, 2]);
    }
}
