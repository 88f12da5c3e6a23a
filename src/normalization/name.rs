/// Derive the cross-provider join key from a display name.
///
/// Trim then lowercase, nothing else. Deterministic and idempotent: feeding
/// an already-derived key back through returns the same key. Whitespace-only
/// names collapse to the empty key and still participate in matching.
pub fn match_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_lowercases() {
        assert_eq!(match_key("  Cafe X "), "cafe x");
        assert_eq!(match_key("JOE'S GRILL"), "joe's grill");
    }

    #[test]
    fn is_idempotent() {
        let once = match_key("  Dooky Chase's Restaurant ");
        assert_eq!(match_key(&once), once);
    }

    #[test]
    fn interior_whitespace_is_preserved() {
        assert_eq!(match_key("Cafe  du  Monde"), "cafe  du  monde");
    }

    #[test]
    fn whitespace_only_collapses_to_empty_key() {
        assert_eq!(match_key("   "), "");
        assert_eq!(match_key(""), "");
    }

    #[test]
    fn non_ascii_names_lowercase() {
        assert_eq!(match_key("Café Dégas"), "café dégas");
    }
}
