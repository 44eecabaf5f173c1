use colored::Colorize;
use reconcile::SyncSummary;

/// Print a success message
pub fn success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    eprintln!("{} {}", "⚠".yellow(), msg);
}

/// Print a header/title
pub fn header(title: &str) {
    eprintln!();
    eprintln!("{}", title.bold());
    eprintln!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    eprintln!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Sync Summary
// ============================================================================

/// Lines of the end-of-run report, zero counts omitted.
pub fn summary_lines(summary: &SyncSummary) -> Vec<(&'static str, usize)> {
    [
        ("written", summary.written),
        ("deleted", summary.deleted),
        ("left in place", summary.declined),
        ("skipped", summary.skipped),
    ]
    .into_iter()
    .filter(|(_, count)| *count > 0)
    .collect()
}

/// Print the end-of-run report
pub fn print_summary(summary: &SyncSummary) {
    header("Sync complete");
    if summary.total_changes() == 0 && summary.declined == 0 {
        success("Server already matches configuration");
    }
    for (label, count) in summary_lines(summary) {
        kv(label, &count.to_string());
    }
    if !summary.is_clean() {
        warn("Some resources were skipped, see warnings above");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_lines_omit_zero_counts() {
        let summary = SyncSummary {
            written: 4,
            deleted: 0,
            declined: 1,
            skipped: 0,
        };
        assert_eq!(summary_lines(&summary), vec![("written", 4), ("left in place", 1)]);
    }

    #[test]
    fn test_summary_lines_empty_for_noop() {
        assert!(summary_lines(&SyncSummary::default()).is_empty());
    }
}
