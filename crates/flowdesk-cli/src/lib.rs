//! Helpers shared by the `flowdesk` binary: directory loading and table output.

use anyhow::Context;
use std::path::Path;

use flowdesk_core::models::UserWorkload;
use flowdesk_services::StaticDirectory;

/// Load the user/team directory from `path`, or an empty one with the stock roles.
pub fn load_directory(path: Option<&Path>) -> anyhow::Result<StaticDirectory> {
    match path {
        Some(path) => StaticDirectory::from_json_file(path)
            .with_context(|| format!("Failed to load directory file {}", path.display())),
        None => Ok(StaticDirectory::new()),
    }
}

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

pub fn workload_table(rows: &[UserWorkload]) -> String {
    let mut out = format!(
        "{:<38} {:>7} {:>8} {:>12} {:>8} {:>9} {}\n",
        "USER", "ACTIVE", "PENDING", "IN_PROGRESS", "OVERDUE", "LOAD", "FLAG"
    );
    for row in rows {
        out.push_str(&format!(
            "{:<38} {:>7} {:>8} {:>12} {:>8} {:>8.1}% {}\n",
            row.user_id,
            row.active,
            row.pending,
            row.in_progress,
            row.overdue,
            row.workload_percentage,
            if row.overloaded { "OVERLOADED" } else { "" }
        ));
    }
    out
}
