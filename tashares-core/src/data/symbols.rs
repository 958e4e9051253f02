//! Symbol list files: one symbol per line.

use std::path::Path;

/// Read a symbol list, trimming whitespace and skipping blank lines.
///
/// Order is preserved; it is the submission order of the fan-out.
pub fn read_symbol_list(path: &Path) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_symbol_list(&content))
}

/// Parse symbol list text.
pub fn parse_symbol_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
