//! Shared utility functions.
//!
//! - `fs`: atomic JSON persistence and NDJSON log tailing
//! - filename sanitization and human-readable size formatting

pub mod fs;

/// Convert arbitrary text to a name safe on common filesystems.
///
/// Strips characters illegal on Windows/macOS, collapses whitespace to
/// underscores, trims leading/trailing separators, and truncates to 100
/// characters. Falls back to "untitled" when nothing survives.
pub fn sanitize_filename(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    let mut in_space = false;
    for ch in name.chars() {
        if matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') {
            continue;
        }
        if ch.is_whitespace() {
            if !in_space {
                cleaned.push('_');
                in_space = true;
            }
            continue;
        }
        in_space = false;
        cleaned.push(ch);
    }

    let trimmed: String = cleaned.trim_matches(|c| c == '.' || c == '_').to_string();
    let truncated: String = trimmed.chars().take(100).collect();

    if truncated.is_empty() {
        "untitled".to_string()
    } else {
        truncated
    }
}

/// Format a byte count as a human-readable size.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_illegal_characters() {
        assert_eq!(sanitize_filename("a<b>c:d\"e/f\\g|h?i*j"), "abcdefghij");
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize_filename("Deep   Dive  Episode"), "Deep_Dive_Episode");
    }

    #[test]
    fn test_sanitize_trims_separators() {
        assert_eq!(sanitize_filename("._hello_."), "hello");
    }

    #[test]
    fn test_sanitize_truncates_to_100() {
        let long = "x".repeat(250);
        assert_eq!(sanitize_filename(&long).chars().count(), 100);
    }

    #[test]
    fn test_sanitize_fallback() {
        assert_eq!(sanitize_filename("///???"), "untitled");
        assert_eq!(sanitize_filename(""), "untitled");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
