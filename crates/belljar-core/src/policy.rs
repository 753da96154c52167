//! Isolation policy assembly.
//!
//! The container's policy is a directive string built from a fixed
//! default-deny baseline plus caller-supplied relaxations. The relaxation
//! text is host-application configuration, trusted to be valid directive
//! syntax, and is appended verbatim. Escaping only happens later, when the
//! assembled string is embedded into markup.

/// The default-deny baseline.
///
/// Denies all resource and network loading, permits inline and dynamically
/// evaluated code (the guest's own code must run), and permits local-scheme
/// worker-like sub-context creation so the relay can bring up the guest.
/// The exact text is part of the compatibility surface.
pub const POLICY_BASELINE: &str =
    "default-src 'none'; script-src 'unsafe-inline' 'unsafe-eval'; worker-src blob:";

/// Assemble the container policy from the baseline and caller relaxations.
///
/// An empty relaxation yields the bare baseline; otherwise the relaxation is
/// appended after a `"; "` separator, verbatim.
pub fn assemble(extra: &str) -> String {
    if extra.is_empty() {
        POLICY_BASELINE.to_string()
    } else {
        format!("{POLICY_BASELINE}; {extra}")
    }
}
