/// Cleans a user or metadata supplied tag so it can be embedded in a file name.
///
/// Returns `None` when nothing usable is left.
pub fn sanitize_tag(value: &str) -> Option<String> {
    let mut replaced = String::with_capacity(value.len());
    for ch in value.chars() {
        if is_disallowed_char(ch) {
            replaced.push('_');
        } else {
            replaced.push(ch);
        }
    }

    let joined = replaced.split_whitespace().collect::<Vec<_>>().join("-");
    let trimmed = joined.trim_matches(|c: char| matches!(c, '_' | '-' | '.' | ' '));

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn is_disallowed_char(ch: char) -> bool {
    matches!(ch, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
        || ch == '\0'
        || ch.is_control()
}
