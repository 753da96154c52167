//! Markup escaping for untrusted-length strings embedded in the container
//! document.

/// Escape a string for embedding in a markup attribute value.
///
/// Replaces `&`, `"`, `'`, `<` and `>` with their entity equivalents in a
/// single left-to-right pass; substituted output is never re-scanned, and
/// none of the replacement entities contain the other raw characters, so
/// one pass suffices. Not guaranteed safe on already-escaped input; do not
/// escape twice.
pub fn escape_attribute(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// Neutralize literal closing-script-tag sequences in a script payload.
///
/// The general attribute escaper cannot be used inside a script element;
/// the only sequence able to break out of one is a literal `</script`,
/// handled as this narrower substring replacement.
pub fn neutralize_script_close(input: &str) -> String {
    input.replace("</script", "<\\/script")
}
