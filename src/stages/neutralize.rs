//! ANSI/VT100 escape sequence removal.

use lazy_static::lazy_static;
use regex::Regex;

use super::SanitizationStage;
use crate::error::{Result, SanitizeError};

lazy_static! {
    /// `ESC [ <params> <final letter>`; no terminator, no match.
    static ref ANSI_CSI: Option<Regex> = Regex::new(r"\x1B\[[0-9;]*[A-Za-z]").ok();
}

/// Removes terminal control sequences so they cannot execute downstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeutralizeStage;

impl SanitizationStage for NeutralizeStage {
    fn name(&self) -> &'static str {
        "escape-neutralization"
    }

    fn apply(&self, input: &str) -> Result<String> {
        if !input.contains('\u{1b}') {
            return Ok(input.to_string());
        }
        let csi = ANSI_CSI
            .as_ref()
            .ok_or_else(|| SanitizeError::stage(self.name(), "escape pattern failed to compile"))?;
        Ok(csi.replace_all(input, "").into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_codes_removed() {
        let out = NeutralizeStage
            .apply("\u{1b}[1;31mALERT\u{1b}[0m done")
            .unwrap();
        assert_eq!(out, "ALERT done");
    }

    #[test]
    fn test_cursor_movement_removed() {
        let out = NeutralizeStage.apply("a\u{1b}[2Jb\u{1b}[10;5Hc").unwrap();
        assert_eq!(out, "abc");
    }

    #[test]
    fn test_truncated_sequence_left_untouched() {
        let input = "text\u{1b}[31";
        assert_eq!(NeutralizeStage.apply(input).unwrap(), input);
    }

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(NeutralizeStage.apply("[31m").unwrap(), "[31m");
    }
}
