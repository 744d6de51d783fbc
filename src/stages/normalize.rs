//! Unicode canonical composition.

use unicode_normalization::{is_nfc_quick, IsNormalized, UnicodeNormalization};

use super::SanitizationStage;
use crate::error::Result;

/// Rewrites input into NFC so that canonically equivalent sequences are
/// byte-identical before any later stage inspects them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeStage;

impl SanitizationStage for NormalizeStage {
    fn name(&self) -> &'static str {
        "unicode-normalization"
    }

    fn apply(&self, input: &str) -> Result<String> {
        if is_nfc_quick(input.chars()) == IsNormalized::Yes {
            return Ok(input.to_string());
        }
        Ok(input.nfc().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combining_accent_composed() {
        // "e" + COMBINING ACUTE ACCENT
        let out = NormalizeStage.apply("cafe\u{0301}").unwrap();
        assert_eq!(out, "caf\u{e9}");
    }

    #[test]
    fn test_already_composed_unchanged() {
        let out = NormalizeStage.apply("caf\u{e9}").unwrap();
        assert_eq!(out, "caf\u{e9}");
    }

    #[test]
    fn test_hangul_jamo_composed() {
        let out = NormalizeStage.apply("\u{1100}\u{1161}").unwrap();
        assert_eq!(out, "\u{ac00}");
    }
}
