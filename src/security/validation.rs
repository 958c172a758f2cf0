//! Quoting of text that ends up on the remote command line.

/// Characters escaped inside a double-quoted shell word.
const DOUBLE_QUOTE_SPECIAL: [char; 4] = ['\\', '"', '$', '`'];

/// Longest command text echoed into logs.
const DISPLAY_LIMIT: usize = 200;

/// Quote `value` as a single POSIX shell word.
///
/// Wraps in single quotes; an embedded `'` becomes `'\''`.
pub fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Escape `value` for use between double quotes.
pub fn escape_double_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if DOUBLE_QUOTE_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Template a free-text assistant query into a command line.
///
/// Returns `None` for a blank query.
pub fn assistant_command(program: &str, query: &str) -> Option<String> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    Some(format!("{} \"{}\"", program, escape_double_quoted(query)))
}

/// Control characters removed and length capped, for log lines.
pub fn sanitize_for_display(command: &str) -> String {
    command
        .chars()
        .filter(|c| !c.is_control() || *c == '\t')
        .take(DISPLAY_LIMIT)
        .collect()
}
