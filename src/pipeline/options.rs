//! Per-call options and the enums they carry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SanitizeError;
use crate::token::TrustToken;

/// Destination classification of the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    /// Content is bound for (or came from) an LLM
    Llm,
    /// Content stays outside any LLM
    NonLlm,
    /// Caller could not tell
    #[default]
    Unclear,
}

impl Classification {
    /// Wire label
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Llm => "llm",
            Classification::NonLlm => "non-llm",
            Classification::Unclear => "unclear",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = SanitizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "llm" => Ok(Classification::Llm),
            "non-llm" | "nonllm" | "non_llm" => Ok(Classification::NonLlm),
            "unclear" => Ok(Classification::Unclear),
            other => Err(SanitizeError::Config(format!("Unknown classification: {other}"))),
        }
    }
}

/// Caller-assessed risk level. `Unset` means no assessment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Low risk
    Low,
    /// Medium risk
    Medium,
    /// High risk
    High,
    /// Not assessed
    #[default]
    Unset,
}

impl RiskLevel {
    /// Wire label
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Unset => "unset",
        }
    }

    /// True when no assessment was made
    pub fn is_unset(&self) -> bool {
        matches!(self, RiskLevel::Unset)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = SanitizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "unset" | "" => Ok(RiskLevel::Unset),
            other => Err(SanitizeError::Config(format!("Unknown risk level: {other}"))),
        }
    }
}

/// Sanitization mode. Recorded for audit; both modes run the full chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanitizeMode {
    /// Standard pass
    Standard,
    /// Final pass before content leaves the trust boundary
    #[default]
    Final,
}

impl FromStr for SanitizeMode {
    type Err = SanitizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(SanitizeMode::Standard),
            "final" => Ok(SanitizeMode::Final),
            other => Err(SanitizeError::Config(format!("Unknown sanitize mode: {other}"))),
        }
    }
}

/// Which side of an exchange the content belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Inbound request
    Request,
    /// Outbound response
    Response,
    /// Not stated
    #[default]
    Unknown,
}

impl Operation {
    /// Data-flow direction label
    pub fn direction(&self) -> &'static str {
        match self {
            Operation::Request => "inbound",
            Operation::Response => "outbound",
            Operation::Unknown => "unknown",
        }
    }
}

/// Options for one `sanitize` call.
///
/// None of these influence the sanitized output. A presented trust token
/// is validated and recorded, and the chain runs regardless.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SanitizeOptions {
    /// Destination classification
    pub classification: Classification,
    /// Caller-assessed risk level
    pub risk_level: RiskLevel,
    /// Caller confidence in `[0, 1]`
    pub risk_score: f64,
    /// Free-text reasons for the assessment
    pub triggers: Vec<String>,
    /// Mode override; the pipeline default applies when absent
    pub mode: Option<SanitizeMode>,
    /// Mint a trust token over the result
    pub generate_trust_token: bool,
    /// Token presented by an upstream stage
    pub trust_token: Option<TrustToken>,
    /// Request or response
    pub operation: Operation,
}

impl SanitizeOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the classification
    pub fn classification(mut self, classification: Classification) -> Self {
        self.classification = classification;
        self
    }

    /// Set risk level and confidence
    pub fn risk(mut self, level: RiskLevel, score: f64) -> Self {
        self.risk_level = level;
        self.risk_score = score;
        self
    }

    /// Add a trigger
    pub fn trigger(mut self, trigger: impl Into<String>) -> Self {
        self.triggers.push(trigger.into());
        self
    }

    /// Override the mode
    pub fn mode(mut self, mode: SanitizeMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Request a trust token
    pub fn with_trust_token(mut self) -> Self {
        self.generate_trust_token = true;
        self
    }

    /// Present an upstream token
    pub fn presenting(mut self, token: TrustToken) -> Self {
        self.trust_token = Some(token);
        self
    }

    /// Set the operation
    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }
}
