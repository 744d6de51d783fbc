//! Audit sink collaborator.
//!
//! The pipeline and the threat extractor report decisions through an
//! [`AuditSink`]. Every call is fire-and-forget from the caller's point of
//! view: a failing sink is logged and otherwise ignored.
//!
//! # Record Types
//!
//! | Method                               | Record                 | When                                  |
//! |--------------------------------------|------------------------|---------------------------------------|
//! | `log_risk_assessment_decision`       | [`RiskAssessmentRecord`] | every `sanitize` call               |
//! | `log_high_risk_case`                 | [`RiskCaseRecord`]     | level High and confidence > 0.8       |
//! | `log_unknown_risk_case`              | [`RiskCaseRecord`]     | level unset and confidence < 0.3      |
//! | `log_high_fidelity_data_collection`  | [`ProcessingRecord`]   | every `sanitize` call                 |
//! | `log_escalation_decision`            | [`EscalationRecord`]   | non-empty threat report               |
//!
//! Free-text fields (triggers, rationale) are PII-redacted when a record is
//! built, so no sink ever sees raw emails or phone numbers from them.

mod sinks;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub use sinks::{MemoryAuditSink, NoopAuditSink, TracingAuditSink, DEFAULT_MEMORY_CAPACITY};

use crate::hash::HashReference;
use crate::pipeline::{Classification, Operation, RiskLevel, SanitizeMode};
use crate::threat::ThreatSeverity;
use crate::token::TokenValidation;

/// Errors reported by audit sinks
#[derive(Debug, Error)]
pub enum AuditError {
    /// Sink storage or transport unavailable
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),

    /// Sink refused the record
    #[error("Audit record rejected: {0}")]
    Rejected(String),
}

/// Future returned by every sink method.
pub type AuditFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AuditError>> + Send + 'a>>;

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Record the caller-supplied risk assessment.
    fn log_risk_assessment_decision<'a>(&'a self, record: &'a RiskAssessmentRecord)
        -> AuditFuture<'a>;

    /// Record a high-risk, high-confidence case.
    fn log_high_risk_case<'a>(&'a self, record: &'a RiskCaseRecord) -> AuditFuture<'a>;

    /// Record an unassessed, low-confidence case.
    fn log_unknown_risk_case<'a>(&'a self, record: &'a RiskCaseRecord) -> AuditFuture<'a>;

    /// Record a processing summary.
    fn log_high_fidelity_data_collection<'a>(
        &'a self,
        record: &'a ProcessingRecord,
    ) -> AuditFuture<'a>;

    /// Record a human-review escalation.
    fn log_escalation_decision<'a>(&'a self, record: &'a EscalationRecord) -> AuditFuture<'a>;

    /// Sink name for logging.
    fn name(&self) -> &'static str;
}

/// Risk assessment supplied with a sanitize call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessmentRecord {
    /// Record id
    pub record_id: Uuid,
    /// Record time
    pub timestamp: DateTime<Utc>,
    /// Destination classification
    pub classification: Classification,
    /// Level supplied by the caller
    pub risk_level: RiskLevel,
    /// Level the configured mapping assigns, when the caller left it unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapped_risk_level: Option<RiskLevel>,
    /// Caller confidence / risk score
    pub confidence: f64,
    /// Caller triggers, PII-redacted
    pub triggers: Vec<String>,
    /// Request or response
    pub operation: Operation,
}

impl RiskAssessmentRecord {
    /// Build a record stamped now.
    pub fn new(
        classification: Classification,
        risk_level: RiskLevel,
        mapped_risk_level: Option<RiskLevel>,
        confidence: f64,
        triggers: &[String],
        operation: Operation,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            classification,
            risk_level,
            mapped_risk_level,
            confidence,
            triggers: redact_all(triggers),
            operation,
        }
    }
}

/// High-risk or unknown-risk case.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskCaseRecord {
    /// Record id
    pub record_id: Uuid,
    /// Record time
    pub timestamp: DateTime<Utc>,
    /// Destination classification
    pub classification: Classification,
    /// Level supplied by the caller
    pub risk_level: RiskLevel,
    /// Caller confidence / risk score
    pub confidence: f64,
    /// Caller triggers, PII-redacted
    pub triggers: Vec<String>,
    /// Hash of the original input
    pub input_hash: HashReference,
}

impl RiskCaseRecord {
    /// Build a record stamped now.
    pub fn new(
        classification: Classification,
        risk_level: RiskLevel,
        confidence: f64,
        triggers: &[String],
        input_hash: HashReference,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            classification,
            risk_level,
            confidence,
            triggers: redact_all(triggers),
            input_hash,
        }
    }
}

/// Summary of one sanitize call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRecord {
    /// Record id
    pub record_id: Uuid,
    /// Record time
    pub timestamp: DateTime<Utc>,
    /// Original input length in bytes
    pub input_length: usize,
    /// Sanitized output length in bytes
    pub output_length: usize,
    /// Wall time spent in the call
    pub processing_time_ms: u64,
    /// Stage names, in order
    pub rules_applied: Vec<String>,
    /// Requested or default mode
    pub mode: SanitizeMode,
    /// Request or response
    pub operation: Operation,
    /// Hash of the original input
    pub input_hash: HashReference,
    /// Hash of the sanitized content
    pub content_hash: String,
    /// Sanitized content was already cached
    pub cache_hit: bool,
    /// A trust token was minted
    pub token_minted: bool,
    /// Outcome of validating a presented token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presented_token: Option<TokenValidation>,
}

/// Human-review escalation for a threat report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRecord {
    /// Deterministic id derived from the job id
    pub escalation_id: String,
    /// Job or request id
    pub job_id: String,
    /// Record time
    pub timestamp: DateTime<Utc>,
    /// Assessed severity
    pub risk_level: ThreatSeverity,
    /// Trigger taxonomy entries, PII-redacted
    pub trigger_conditions: Vec<String>,
    /// Human-readable rationale, PII-redacted
    pub decision_rationale: String,
    /// Threat indicators found
    pub report_keys: Vec<String>,
}

impl EscalationRecord {
    /// Build a record stamped now.
    pub fn new(
        escalation_id: String,
        job_id: &str,
        risk_level: ThreatSeverity,
        trigger_conditions: &[String],
        decision_rationale: &str,
        report_keys: Vec<String>,
    ) -> Self {
        Self {
            escalation_id,
            job_id: job_id.to_string(),
            timestamp: Utc::now(),
            risk_level,
            trigger_conditions: redact_all(trigger_conditions),
            decision_rationale: redact_pii(decision_rationale),
            report_keys,
        }
    }
}

/// Any record, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Risk assessment decision
    RiskAssessment(RiskAssessmentRecord),
    /// High-risk case
    HighRisk(RiskCaseRecord),
    /// Unknown-risk case
    UnknownRisk(RiskCaseRecord),
    /// Processing summary
    HighFidelity(ProcessingRecord),
    /// Escalation decision
    Escalation(EscalationRecord),
}

impl AuditEvent {
    /// Kind label
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::RiskAssessment(_) => "risk_assessment",
            AuditEvent::HighRisk(_) => "high_risk",
            AuditEvent::UnknownRisk(_) => "unknown_risk",
            AuditEvent::HighFidelity(_) => "high_fidelity",
            AuditEvent::Escalation(_) => "escalation",
        }
    }
}

lazy_static! {
    static ref AUDIT_EMAIL: Option<Regex> =
        Regex::new(r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b").ok();
    static ref AUDIT_PHONE: Option<Regex> =
        Regex::new(r"\b[0-9]{3}[\-.]?[0-9]{3}[\-.]?[0-9]{4}\b").ok();
}

/// Mask emails and phone numbers in free text bound for an audit record.
pub fn redact_pii(text: &str) -> String {
    let mut out = text.to_string();
    if let Some(email) = AUDIT_EMAIL.as_ref() {
        out = email.replace_all(&out, "[EMAIL_REDACTED]").into_owned();
    }
    if let Some(phone) = AUDIT_PHONE.as_ref() {
        out = phone.replace_all(&out, "[PHONE_REDACTED]").into_owned();
    }
    out
}

/// True if `text` contains an email- or phone-shaped run.
pub fn contains_pii(text: &str) -> bool {
    AUDIT_EMAIL.as_ref().is_some_and(|r| r.is_match(text))
        || AUDIT_PHONE.as_ref().is_some_and(|r| r.is_match(text))
}

fn redact_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| redact_pii(s)).collect()
}
