//! Path string utilities for nested key/value stores.
//!
//! A path is a sequence of unescaped string segments. The string form joins
//! segments with `/`, escaping literal `/` and `~` characters inside a
//! segment (`~1` and `~0` respectively) so the mapping is reversible.

/// Unescapes one path segment.
pub fn unescape_segment(segment: &str) -> String {
    if !segment.contains('~') {
        return segment.to_string();
    }
    segment.replace("~1", "/").replace("~0", "~")
}

/// Escapes one path segment.
pub fn escape_segment(segment: &str) -> String {
    if !segment.contains('/') && !segment.contains('~') {
        return segment.to_string();
    }
    segment.replace('~', "~0").replace('/', "~1")
}

/// Parse a path string into unescaped segments.
///
/// Examples:
/// - `"" -> []`
/// - `"color" -> ["color"]`
/// - `"a~1b/~0k" -> ["a/b", "~k"]`
pub fn parse_path(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    path.split('/').map(unescape_segment).collect()
}

/// Format unescaped segments into a path string.
pub fn format_path(segments: &[String]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push('/');
        }
        out.push_str(&escape_segment(segment));
    }
    out
}
