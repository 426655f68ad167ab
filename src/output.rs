//! Output formatting for diff results

use crate::diff::{DiffResult, DiffStats};
use crate::error::Result;

/// Print the result list, one entry per line, to stdout
pub fn print_result_list(result: &DiffResult) {
    for row in &result.rows {
        println!("{}", row);
    }
}

/// Print the full result (rows + stats) as JSON to stdout
pub fn print_json(result: &DiffResult) -> Result<()> {
    let rendered = serde_json::to_string_pretty(result)?;
    println!("{}", rendered);
    Ok(())
}

/// Human-readable run summary, kept off stdout so the result list stays clean
pub fn print_summary(stats: &DiffStats) {
    eprintln!("📊 Diff summary");
    eprintln!("├─ Segments compared: {}", stats.segments_compared);
    eprintln!("├─ Segments downloaded: {}", stats.segments_downloaded);
    eprintln!("├─ Rows downloaded: {}", stats.rows_downloaded);
    eprintln!("├─ Added: {}", stats.rows_added);
    eprintln!("├─ Removed: {}", stats.rows_removed);
    eprintln!("├─ Updated: {}", stats.rows_updated);
    eprintln!("└─ Elapsed: {}ms", stats.elapsed_ms);
}
