//! Prompt Registry.
//!
//! Identity for a prompt is `sha256("{name}|{prompt}|{system_prompt}")`: the
//! same enrichment re-run with byte-identical prompt text resolves to the
//! same registry id, while any edit — to the name, the prompt, or the
//! system prompt — mints a new one. Registration is an upsert keyed on
//! `(enrichment_name, hash)`.

use sha2::{Digest, Sha256};

/// Computes the content hash used as a prompt's dedupe key.
#[must_use]
pub fn content_hash(enrichment_name: &str, prompt: &str, system_prompt: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(enrichment_name.as_bytes());
    hasher.update(b"|");
    hasher.update(prompt.as_bytes());
    hasher.update(b"|");
    hasher.update(system_prompt.unwrap_or_default().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_hash_identically() {
        let a = content_hash("sentiment", "classify {x}", None);
        let b = content_hash("sentiment", "classify {x}", None);
        assert_eq!(a, b);
    }

    #[test]
    fn different_prompt_text_changes_hash() {
        let a = content_hash("sentiment", "classify {x}", None);
        let b = content_hash("sentiment", "classify {y}", None);
        assert_ne!(a, b);
    }

    #[test]
    fn different_system_prompt_changes_hash() {
        let a = content_hash("sentiment", "classify {x}", None);
        let b = content_hash("sentiment", "classify {x}", Some("be terse"));
        assert_ne!(a, b);
    }

    #[test]
    fn different_enrichment_name_changes_hash() {
        let a = content_hash("sentiment", "classify {x}", None);
        let b = content_hash("other", "classify {x}", None);
        assert_ne!(a, b);
    }
}
