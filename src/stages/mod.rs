//! Leaf sanitization stages.
//!
//! Four stateless text transforms that the pipeline runs in a fixed order,
//! each on the previous stage's output:
//!
//! | Order | Stage                    | Name                    |
//! |-------|--------------------------|-------------------------|
//! | 1     | [`NormalizeStage`]       | `unicode-normalization` |
//! | 2     | [`StripStage`]           | `symbol-stripping`      |
//! | 3     | [`NeutralizeStage`]      | `escape-neutralization` |
//! | 4     | [`RedactStage`]          | `pattern-redaction`     |
//!
//! Normalization must come first: every later character-class match assumes
//! NFC input. Redaction must come last: its final symbol strip removes the
//! separators that the number patterns depend on.
//!
//! # Usage
//!
//! ```rust,ignore
//! use trustgate::stages::{default_stages, run_chain};
//!
//! let stages = default_stages();
//! let clean = run_chain(&stages, "Call 555-123-4567 <script>x</script>").unwrap();
//! assert_eq!(clean, "Call PHONE_REDACTED");
//! ```

mod neutralize;
mod normalize;
mod redact;
mod strip;

use std::sync::Arc;

pub use neutralize::NeutralizeStage;
pub use normalize::NormalizeStage;
pub use redact::{
    RedactStage, CARD_SENTINEL, EMAIL_SENTINEL, PHONE_SENTINEL, SSN_SENTINEL,
};
pub use strip::{is_stripped_char, StripStage};

use crate::error::Result;

/// A single text transform in the sanitization chain.
///
/// Stages hold no per-call state and may be shared across threads. The
/// built-in stages never fail on valid UTF-8; the `Result` lets custom
/// stages fail the whole call closed.
pub trait SanitizationStage: Send + Sync {
    /// Stable stage name, recorded in `rulesApplied`.
    fn name(&self) -> &'static str;

    /// Transform `input`.
    fn apply(&self, input: &str) -> Result<String>;
}

/// Shared handle to a stage.
pub type StageRef = Arc<dyn SanitizationStage>;

/// The built-in chain in its required order.
pub fn default_stages() -> Vec<StageRef> {
    vec![
        Arc::new(NormalizeStage),
        Arc::new(StripStage),
        Arc::new(NeutralizeStage),
        Arc::new(RedactStage),
    ]
}

/// Run `input` through every stage in order.
pub fn run_chain(stages: &[StageRef], input: &str) -> Result<String> {
    let mut current = input.to_string();
    for stage in stages {
        current = stage.apply(&current)?;
    }
    Ok(current)
}

/// Names of `stages`, in order.
pub fn stage_names(stages: &[StageRef]) -> Vec<String> {
    stages.iter().map(|s| s.name().to_string()).collect()
}
