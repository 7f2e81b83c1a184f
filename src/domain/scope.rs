//! Scope canonicalization and cache key derivation
//!
//! Two identifiers come out of here: the L1 key, a full-width digest of
//! (normalized prompt, user id, canonical scope subset), and the scope hash,
//! a 16-character digest of the canonical scope subset used as an L2 filter
//! field. L1 key collisions are harmless: the worst case is an L1 miss and
//! the authoritative L2 lookup answers instead.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Named scoping attributes isolating cache entries from one another.
///
/// BTreeMap keeps keys sorted, which makes the JSON encoding canonical.
pub type Scope = BTreeMap<String, String>;

/// Width of the scope hash in hex characters
const SCOPE_HASH_LEN: usize = 16;

/// Derives L1 keys and scope hashes from prompts and scope attributes.
#[derive(Debug, Clone)]
pub struct KeyHasher {
    context_fields: Vec<String>,
    enable_context_hashing: bool,
}

impl KeyHasher {
    pub fn new(context_fields: Vec<String>, enable_context_hashing: bool) -> Self {
        Self {
            context_fields,
            enable_context_hashing,
        }
    }

    /// Normalize a prompt for key derivation: Unicode NFC, trimmed, internal
    /// whitespace runs collapsed to a single space. Case is preserved since
    /// the embedding sees the original text.
    pub fn normalize_prompt(prompt: &str) -> String {
        let composed: String = prompt.nfc().collect();
        composed.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Restrict a scope to the configured allowlist.
    pub fn scope_subset(&self, scope: &Scope) -> Scope {
        scope
            .iter()
            .filter(|(k, _)| self.context_fields.iter().any(|f| f == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Canonical encoding of a scope subset: JSON with sorted keys.
    fn canonical(subset: &Scope) -> String {
        serde_json::to_string(subset).unwrap_or_else(|_| "{}".to_string())
    }

    /// 16-hex-char digest of the canonical scope subset, usable as an L2
    /// filter field. `None` when context hashing is disabled. The empty
    /// subset hashes the canonical empty object, so all unscoped entries
    /// share one bucket.
    pub fn scope_hash(&self, scope: Option<&Scope>) -> Option<String> {
        if !self.enable_context_hashing {
            return None;
        }

        let subset = scope.map(|s| self.scope_subset(s)).unwrap_or_default();
        let canonical = Self::canonical(&subset);
        let digest = Sha256::digest(canonical.as_bytes());

        Some(hex_encode(&digest)[..SCOPE_HASH_LEN].to_string())
    }

    /// Full-width L1 key over (normalized prompt, user id, canonical scope
    /// subset). Unit separators keep the parts unambiguous.
    pub fn l1_key(&self, prompt: &str, user_id: Option<&str>, scope: Option<&Scope>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(Self::normalize_prompt(prompt).as_bytes());
        hasher.update([0x1f]);
        hasher.update(user_id.unwrap_or_default().as_bytes());
        hasher.update([0x1f]);

        if self.enable_context_hashing {
            let subset = scope.map(|s| self.scope_subset(s)).unwrap_or_default();
            hasher.update(Self::canonical(&subset).as_bytes());
        }

        hex_encode(&hasher.finalize())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> KeyHasher {
        KeyHasher::new(
            vec![
                "conversation_id".to_string(),
                "user_persona".to_string(),
                "session_id".to_string(),
            ],
            true,
        )
    }

    fn scope_of(pairs: &[(&str, &str)]) -> Scope {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(
            KeyHasher::normalize_prompt("  what   is\t rust? \n"),
            "what is rust?"
        );
    }

    #[test]
    fn test_normalize_preserves_case() {
        assert_eq!(KeyHasher::normalize_prompt("What Is Rust"), "What Is Rust");
    }

    #[test]
    fn test_normalize_unifies_composed_and_decomposed() {
        // U+00E9 vs U+0065 U+0301 both normalize to the composed form
        let composed = "caf\u{e9}";
        let decomposed = "cafe\u{301}";

        assert_eq!(
            KeyHasher::normalize_prompt(composed),
            KeyHasher::normalize_prompt(decomposed)
        );
    }

    #[test]
    fn test_scope_subset_filters_unknown_fields() {
        let h = hasher();
        let scope = scope_of(&[("user_persona", "dev"), ("favorite_color", "green")]);

        let subset = h.scope_subset(&scope);

        assert_eq!(subset.len(), 1);
        assert!(subset.contains_key("user_persona"));
    }

    #[test]
    fn test_scope_hash_width_and_stability() {
        let h = hasher();
        let scope = scope_of(&[("user_persona", "dev")]);

        let a = h.scope_hash(Some(&scope)).unwrap();
        let b = h.scope_hash(Some(&scope)).unwrap();

        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_scopes_distinct_hashes() {
        let h = hasher();
        let dev = scope_of(&[("user_persona", "dev")]);
        let gamer = scope_of(&[("user_persona", "gamer")]);

        assert_ne!(h.scope_hash(Some(&dev)), h.scope_hash(Some(&gamer)));
    }

    #[test]
    fn test_empty_scope_shares_one_bucket() {
        let h = hasher();
        let empty = Scope::new();
        // Attributes outside the allowlist reduce to the empty subset too
        let ignored = scope_of(&[("favorite_color", "green")]);

        let a = h.scope_hash(Some(&empty)).unwrap();
        let b = h.scope_hash(None).unwrap();
        let c = h.scope_hash(Some(&ignored)).unwrap();

        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_scope_hash_disabled() {
        let h = KeyHasher::new(vec!["user_persona".to_string()], false);
        let scope = scope_of(&[("user_persona", "dev")]);

        assert!(h.scope_hash(Some(&scope)).is_none());
    }

    #[test]
    fn test_l1_key_isolates_users() {
        let h = hasher();

        let a = h.l1_key("what is rust?", Some("alice"), None);
        let b = h.l1_key("what is rust?", Some("bob"), None);
        let anon = h.l1_key("what is rust?", None, None);

        assert_ne!(a, b);
        assert_ne!(a, anon);
    }

    #[test]
    fn test_l1_key_isolates_scopes() {
        let h = hasher();
        let dev = scope_of(&[("user_persona", "dev")]);
        let gamer = scope_of(&[("user_persona", "gamer")]);

        let a = h.l1_key("q", None, Some(&dev));
        let b = h.l1_key("q", None, Some(&gamer));

        assert_ne!(a, b);
    }

    #[test]
    fn test_l1_key_stable_under_whitespace_variants() {
        let h = hasher();

        assert_eq!(
            h.l1_key("what is rust?", None, None),
            h.l1_key("  what   is rust? ", None, None)
        );
    }

    #[test]
    fn test_l1_key_full_width() {
        let h = hasher();
        // sha256 hex
        assert_eq!(h.l1_key("q", None, None).len(), 64);
    }
}
