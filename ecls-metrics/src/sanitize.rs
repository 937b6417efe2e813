use std::borrow::Cow;

/// The character substituted for invalid characters in metric names.
pub const REPLACEMENT_CHAR: char = '_';

fn is_reserved(c: char) -> bool {
    matches!(c, ':' | '|' | '@' | '#') || c.is_whitespace() || c.is_control()
}

/// Replaces characters that would break the statsd line protocol.
///
/// The separators `:`, `|`, `@` and `#` as well as whitespace and control characters are
/// replaced with [`REPLACEMENT_CHAR`]. Returns the input unchanged if it contains none of them.
///
/// ```
/// assert_eq!(ecls_metrics::sanitize_segment("GET /a|b"), "GET__a_b");
/// assert_eq!(ecls_metrics::sanitize_segment("/v1/items"), "/v1/items");
/// ```
pub fn sanitize_segment(value: &str) -> Cow<'_, str> {
    if !value.contains(is_reserved) {
        return Cow::Borrowed(value);
    }

    Cow::Owned(
        value
            .chars()
            .map(|c| if is_reserved(c) { REPLACEMENT_CHAR } else { c })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_borrowed_when_clean() {
        assert!(matches!(sanitize_segment("svc-1.v2"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_replaces_reserved() {
        assert_eq!(sanitize_segment("a:b|c@d#e"), "a_b_c_d_e");
        assert_eq!(sanitize_segment("tab\there\nnl"), "tab_here_nl");
        assert_eq!(sanitize_segment("caf\u{e9}"), "caf\u{e9}");
    }
}
