use super::MAX_SEARCH_QUERY_LENGTH;

/// Normalise a user-entered search query.
///
/// Drops control characters, collapses whitespace runs to a single space,
/// trims, and truncates to [`MAX_SEARCH_QUERY_LENGTH`] characters. Returns
/// `None` when nothing searchable is left, which callers treat as "no
/// filter".
pub fn normalize_query(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len().min(MAX_SEARCH_QUERY_LENGTH));
    let mut chars = 0;
    let mut pending_space = false;

    for c in raw.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if c.is_control() {
            continue;
        }
        if pending_space {
            if chars + 1 >= MAX_SEARCH_QUERY_LENGTH {
                break;
            }
            out.push(' ');
            chars += 1;
            pending_space = false;
        }
        if chars >= MAX_SEARCH_QUERY_LENGTH {
            break;
        }
        out.push(c);
        chars += 1;
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}
