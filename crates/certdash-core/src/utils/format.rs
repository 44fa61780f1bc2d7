/// Initials used as an avatar fallback: first letters of the first and last words.
/// Blank or missing names yield "?"
pub fn avatar_initials(name: Option<&str>) -> String {
    let words: Vec<&str> = name.unwrap_or_default().split_whitespace().collect();
    let first = words.first().and_then(|w| w.chars().next());
    let last = words.last().and_then(|w| w.chars().next());

    match (first, last, words.len()) {
        (None, _, _) => "?".to_string(),
        (Some(f), _, 1) => f.to_uppercase().collect(),
        (Some(f), Some(l), _) => f.to_uppercase().chain(l.to_uppercase()).collect(),
        (Some(f), None, _) => f.to_uppercase().collect(),
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format an optional string, returning a default if None or blank
pub fn format_optional(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Format a date string to a more readable format
pub fn format_date(date: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date) {
        dt.format("%b %d, %Y").to_string()
    } else if date.len() >= 10 {
        // Try to parse YYYY-MM-DD format
        date.chars().take(10).collect()
    } else {
        date.to_string()
    }
}
