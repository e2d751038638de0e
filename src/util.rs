use std::collections::HashSet;
use std::hash::Hash;

/// Returns the first item that was already seen earlier in `iter`.
pub fn first_duplicate<A>(iter: impl IntoIterator<Item = A>) -> Option<A>
where A: Eq + Hash {
    let mut seen = HashSet::<A>::new();
    for a in iter {
        if let Some(previous) = seen.replace(a) {
            return Some(previous);
        }
    }
    None
}

/// Whitespace-trimmed text, or `None` when nothing is left.
pub fn non_blank(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Whether `text` is at most `max_chars` characters long.
pub fn fits(text: &str, max_chars: usize) -> bool {
    text.chars().nth(max_chars).is_none()
}
