use colored::Colorize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a pending or skipped item
pub fn pending(msg: &str) {
    println!("{} {}", "○".dimmed(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Summary line for an apply run
pub fn summary(succeeded: usize, failed: usize, skipped: usize) -> String {
    let mut parts = vec![format!("{succeeded} succeeded")];
    if failed > 0 {
        parts.push(format!("{failed} failed"));
    }
    if skipped > 0 {
        parts.push(format!("{skipped} skipped"));
    }
    parts.join(", ")
}

/// `count noun`, pluralized with a trailing `s`
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_omits_zero_counts() {
        assert_eq!(summary(3, 0, 0), "3 succeeded");
        assert_eq!(summary(0, 0, 0), "0 succeeded");
    }

    #[test]
    fn test_summary_lists_failures_and_skips() {
        assert_eq!(summary(2, 1, 0), "2 succeeded, 1 failed");
        assert_eq!(summary(2, 1, 4), "2 succeeded, 1 failed, 4 skipped");
        assert_eq!(summary(0, 0, 2), "0 succeeded, 2 skipped");
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural(1, "package"), "1 package");
        assert_eq!(plural(0, "package"), "0 packages");
        assert_eq!(plural(5, "dotfile"), "5 dotfiles");
    }
}
