use colored::{ColoredString, Colorize};
use phasekit::{Severity, Status};

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

fn severity_label(severity: Severity) -> ColoredString {
    let label = severity.label();
    match severity {
        Severity::Ok => label.green(),
        Severity::Info => label.blue(),
        Severity::Warning => label.yellow(),
        Severity::Error => label.red().bold(),
        Severity::Cancel => label.magenta(),
    }
}

/// Lines of a status tree, two spaces of indent per level
pub fn status_lines(status: &Status) -> Vec<(usize, Severity, String)> {
    fn walk(status: &Status, depth: usize, out: &mut Vec<(usize, Severity, String)>) {
        out.push((depth, status.severity(), status.message().to_string()));
        for child in status.children() {
            walk(child, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    walk(status, 0, &mut out);
    out
}

/// Print a status and its children as an indented tree
pub fn status_tree(status: &Status) {
    for (depth, severity, message) in status_lines(status) {
        let indent = "  ".repeat(depth + 1);
        if message.is_empty() || message == severity.label() {
            println!("{indent}{}", severity_label(severity));
        } else {
            println!("{indent}{} {message}", severity_label(severity));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
