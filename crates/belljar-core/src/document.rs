//! Container document construction.
//!
//! The isolation container is loaded with a small markup document carrying
//! two untrusted-length strings: the assembled policy (in a meta attribute)
//! and the relay payload (in a script element). Both are neutralized here so
//! no policy or payload text can break the document's structure.

use crate::escape::{escape_attribute, neutralize_script_close};

/// Build the document the container is loaded with.
pub fn container_document(policy: &str, relay_source: &str) -> String {
    format!(
        concat!(
            "<!DOCTYPE html>\n",
            "<html>\n",
            "<head>\n",
            "<meta http-equiv=\"Content-Security-Policy\" content=\"{policy}\">\n",
            "</head>\n",
            "<body>\n",
            "<script>{relay}</script>\n",
            "</body>\n",
            "</html>\n"
        ),
        policy = escape_attribute(policy),
        relay = neutralize_script_close(relay_source),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy;

    #[test]
    fn test_document_embeds_policy() {
        let document = container_document(policy::POLICY_BASELINE, "relay()");
        assert!(document.contains("Content-Security-Policy"));
        assert!(document.contains("default-src &#39;none&#39;"));
        assert!(document.contains("<script>relay()</script>"));
    }

    #[test]
    fn test_hostile_policy_cannot_break_attribute() {
        let document = container_document(r#""><script>alert(1)</script>"#, "relay()");

        // The attribute value may not contain a raw quote or angle bracket.
        let start = document.find("content=\"").unwrap() + "content=\"".len();
        let end = start + document[start..].find('"').unwrap();
        let attribute = &document[start..end];
        assert!(!attribute.contains('<'));
        assert!(!attribute.contains('>'));
        assert!(attribute.contains("&gt;"));

        // Exactly the one intended script element.
        assert_eq!(document.matches("<script>").count(), 1);
    }

    #[test]
    fn test_hostile_relay_payload_cannot_close_script() {
        let document = container_document("p", "a = '</script><script>evil()';");
        assert_eq!(document.matches("</script>").count(), 1);
    }
}
