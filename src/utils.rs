//! Shared utility helpers.

/// Truncate a string to at most `max` bytes on a char boundary,
/// appending `…` if trimmed.  Used to keep tool arguments in log lines
/// short.
pub fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("abcdef", 3), "abc…");
        // 'é' is two bytes; cutting inside it backs off.
        assert_eq!(truncate_str("aé", 2), "a…");
    }
}
