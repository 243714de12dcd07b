//! Entity fingerprinting
//!
//! Text-valued entities (cause descriptions, symptoms, step instructions,
//! fix descriptions) dedup on a normalized fingerprint: lowercase, collapsed
//! whitespace, terminal punctuation stripped. The knowledge-graph unique
//! keys use `lower(text)`, so the fingerprint must be a superset of that
//! normalization applied consistently on both sides of the upsert.

/// Normalize entity text into its dedup fingerprint.
pub fn fingerprint(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(['.', '!', '?', ';', ':', ','])
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases() {
        assert_eq!(fingerprint("Worn Spark Plug"), "worn spark plug");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(
            fingerprint("worn  spark\n\tplug"),
            "worn spark plug"
        );
    }

    #[test]
    fn test_strips_terminal_punctuation() {
        assert_eq!(fingerprint("Replace the coil."), "replace the coil");
        assert_eq!(fingerprint("Replace the coil!?"), "replace the coil");
    }

    #[test]
    fn test_interior_punctuation_kept() {
        assert_eq!(
            fingerprint("Check plug, then coil."),
            "check plug, then coil"
        );
    }

    #[test]
    fn test_equivalent_variants_collide() {
        assert_eq!(
            fingerprint("  Worn spark plug. "),
            fingerprint("worn SPARK plug")
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(fingerprint("   "), "");
    }
}
