//! Invisible and control character removal.

use super::SanitizationStage;
use crate::error::Result;

/// Removes zero-width, invisible-format and control characters.
///
/// ESC (U+001B) survives this stage so that [`super::NeutralizeStage`] still
/// sees complete escape sequences. Any ESC left over is removed by the
/// symbol strip at the end of [`super::RedactStage`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StripStage;

impl SanitizationStage for StripStage {
    fn name(&self) -> &'static str {
        "symbol-stripping"
    }

    fn apply(&self, input: &str) -> Result<String> {
        Ok(input
            .chars()
            .filter_map(|c| match c {
                '\u{00A0}' => Some(' '),
                c if is_stripped_char(c) => None,
                c => Some(c),
            })
            .collect())
    }
}

/// True for every character this stage drops.
pub fn is_stripped_char(c: char) -> bool {
    is_zero_width(c) || is_invisible_format(c) || is_math_alphanumeric(c) || is_control(c)
}

fn is_zero_width(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}' | '\u{2028}' | '\u{2029}' | '\u{FEFF}'
    )
}

fn is_invisible_format(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{180E}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{206F}'
            | '\u{E0000}'..='\u{E007F}'
    )
}

// Bold/italic/script letter look-alikes; NFC leaves them alone.
fn is_math_alphanumeric(c: char) -> bool {
    matches!(c, '\u{1D400}'..='\u{1D7FF}')
}

fn is_control(c: char) -> bool {
    match c {
        '\t' | '\n' | '\r' | '\u{1B}' => false,
        '\u{00}'..='\u{1F}' | '\u{7F}'..='\u{9F}' => true,
        _ => false,
    }
}
