//! Markup removal, PII redaction and the final symbol strip.
//!
//! Patterns run in table order. The number patterns (phone, SSN, card) run
//! before [`SYMBOL_STRIP`] because it removes the separators they match on,
//! and again after it until nothing changes: stripping separators can join
//! digit groups into a run that only then looks like a number.

use lazy_static::lazy_static;
use regex::Regex;

use super::SanitizationStage;
use crate::error::{Result, SanitizeError};

/// Replacement for email addresses.
pub const EMAIL_SENTINEL: &str = "EMAIL_REDACTED";
/// Replacement for phone numbers.
pub const PHONE_SENTINEL: &str = "PHONE_REDACTED";
/// Replacement for US social security numbers.
pub const SSN_SENTINEL: &str = "SSN_REDACTED";
/// Replacement for 16-digit card numbers.
pub const CARD_SENTINEL: &str = "CARD_REDACTED";

/// A redaction rule
#[derive(Debug, Clone)]
pub struct RedactionPattern {
    /// Rule name
    pub name: &'static str,
    /// Regex pattern
    pub pattern: &'static str,
    /// Replacement text
    pub replacement: &'static str,
    /// Skip matches that touch another ASCII digit
    pub digit_isolated: bool,
}

/// Redaction rules, in application order.
pub static REDACTION_PATTERNS: &[RedactionPattern] = &[
    RedactionPattern {
        name: "script_block",
        pattern: r"(?is)<script\b[^>]*>.*?</script\s*>",
        replacement: "",
        digit_isolated: false,
    },
    RedactionPattern {
        name: "script_uri",
        pattern: r#"(?i)(?:javascript|vbscript)\s*:[^\s"'<>]*"#,
        replacement: "",
        digit_isolated: false,
    },
    RedactionPattern {
        name: "data_uri",
        pattern: r#"(?i)data\s*:\s*text/(?:html|javascript)[^\s"'<>]*"#,
        replacement: "",
        digit_isolated: false,
    },
    RedactionPattern {
        name: "event_handler",
        pattern: r#"(?i)\bon[a-z]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]*)"#,
        replacement: "",
        digit_isolated: false,
    },
    RedactionPattern {
        name: "encoded_markup",
        pattern: r"(?i)&(?:lt|gt|quot|apos|#0*(?:60|62|34|39)|#x0*(?:3c|3e|22|27));?",
        replacement: "",
        digit_isolated: false,
    },
    RedactionPattern {
        name: "email",
        pattern: r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}",
        replacement: EMAIL_SENTINEL,
        digit_isolated: false,
    },
    RedactionPattern {
        name: "phone",
        pattern: r"(?:\+?1[\s\p{P}\p{S}]?)?(?:\([0-9]{3}\)|[0-9]{3})[\s\p{P}\p{S}]?[0-9]{3}[\s\p{P}\p{S}]?[0-9]{4}",
        replacement: PHONE_SENTINEL,
        digit_isolated: true,
    },
    RedactionPattern {
        name: "ssn",
        pattern: r"[0-9]{3}[\s\p{P}\p{S}][0-9]{2}[\s\p{P}\p{S}][0-9]{4}",
        replacement: SSN_SENTINEL,
        digit_isolated: true,
    },
    RedactionPattern {
        name: "card",
        pattern: r"[0-9]{4}[\s\p{P}\p{S}]?[0-9]{4}[\s\p{P}\p{S}]?[0-9]{4}[\s\p{P}\p{S}]?[0-9]{4}",
        replacement: CARD_SENTINEL,
        digit_isolated: true,
    },
];

/// Everything that is not a letter, number, mark, whitespace or `_`.
pub const SYMBOL_STRIP: &str = r"[^\p{L}\p{N}\p{M}\s_]";

lazy_static! {
    /// Compiled redaction rules
    pub static ref REDACTION_REGEX: Vec<(Regex, &'static RedactionPattern)> = {
        REDACTION_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p.pattern).ok().map(|r| (r, p)))
            .collect()
    };

    static ref SYMBOL_STRIP_REGEX: Option<Regex> = Regex::new(SYMBOL_STRIP).ok();
}

/// Removes markup attacks and PII, then strips punctuation and symbols.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedactStage;

impl SanitizationStage for RedactStage {
    fn name(&self) -> &'static str {
        "pattern-redaction"
    }

    fn apply(&self, input: &str) -> Result<String> {
        if REDACTION_REGEX.len() != REDACTION_PATTERNS.len() {
            return Err(SanitizeError::stage(
                self.name(),
                "redaction rule table failed to compile",
            ));
        }
        let strip = SYMBOL_STRIP_REGEX
            .as_ref()
            .ok_or_else(|| SanitizeError::stage(self.name(), "symbol class failed to compile"))?;

        let mut current = input.to_string();
        for (regex, rule) in REDACTION_REGEX.iter() {
            current = if rule.digit_isolated {
                replace_isolated(regex, &current, rule.replacement)
            } else {
                regex.replace_all(&current, rule.replacement).into_owned()
            };
        }

        // Every pass that changes anything removes digits, so this ends.
        let mut current = strip.replace_all(&current, "").into_owned();
        loop {
            let next = redact_numbers(&current);
            if next == current {
                break;
            }
            current = next;
        }
        Ok(current.trim().to_string())
    }
}

/// One pass of the digit-isolated number rules.
fn redact_numbers(input: &str) -> String {
    REDACTION_REGEX
        .iter()
        .filter(|(_, rule)| rule.digit_isolated)
        .fold(input.to_string(), |text, (regex, rule)| {
            replace_isolated(regex, &text, rule.replacement)
        })
}

/// Replace matches that are not embedded in a longer digit run.
fn replace_isolated(regex: &Regex, input: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for m in regex.find_iter(input) {
        let before = input[..m.start()].chars().next_back();
        let after = input[m.end()..].chars().next();
        if before.is_some_and(|c| c.is_ascii_digit()) || after.is_some_and(|c| c.is_ascii_digit())
        {
            continue;
        }
        out.push_str(&input[last..m.start()]);
        out.push_str(replacement);
        last = m.end();
    }
    out.push_str(&input[last..]);
    out
}
