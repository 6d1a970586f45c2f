//! Escaping for text emitted into HTML and XML output.

/// Append `input` to `output` with `&`, `<`, `>`, `"` and `'` encoded, so it
/// is safe as element text or inside a quoted attribute.
pub fn push_encoded(output: &mut String, input: &str) {
    for ch in input.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#39;"),
            other => output.push(other),
        }
    }
}
