//! Threat-key extraction and escalation.
//!
//! Upstream validators annotate payloads with well-known indicator keys
//! (`potentialXSS`, `emailAddresses`, ...). The extractor strips those keys
//! out of the payload, collects them into a flat [`ThreatReport`], grades
//! the report and files a human-review escalation.
//!
//! # Walk Order
//!
//! Depth-first, pre-order. At each object the indicator keys are removed
//! first and merged into the report, so a deeper occurrence of a key
//! overwrites a shallower one. The removed values are not walked.

use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::Span;
use uuid::Uuid;

use crate::audit::{contains_pii, AuditSink, EscalationRecord};

/// Indicator keys recognised in payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreatIndicator {
    /// `sanitizationTests`
    SanitizationTests,
    /// `potentialXSS`
    PotentialXss,
    /// `symbolsAndSpecialChars`
    SymbolsAndSpecialChars,
    /// `unicodeText`
    UnicodeText,
    /// `controlCharacters`
    ControlCharacters,
    /// `zeroWidthCharacters`
    ZeroWidthCharacters,
    /// `emailAddresses`
    EmailAddresses,
    /// `phoneNumbers`
    PhoneNumbers,
}

impl ThreatIndicator {
    /// All indicators
    pub const ALL: [ThreatIndicator; 8] = [
        ThreatIndicator::SanitizationTests,
        ThreatIndicator::PotentialXss,
        ThreatIndicator::SymbolsAndSpecialChars,
        ThreatIndicator::UnicodeText,
        ThreatIndicator::ControlCharacters,
        ThreatIndicator::ZeroWidthCharacters,
        ThreatIndicator::EmailAddresses,
        ThreatIndicator::PhoneNumbers,
    ];

    /// Payload key
    pub fn key(&self) -> &'static str {
        match self {
            ThreatIndicator::SanitizationTests => "sanitizationTests",
            ThreatIndicator::PotentialXss => "potentialXSS",
            ThreatIndicator::SymbolsAndSpecialChars => "symbolsAndSpecialChars",
            ThreatIndicator::UnicodeText => "unicodeText",
            ThreatIndicator::ControlCharacters => "controlCharacters",
            ThreatIndicator::ZeroWidthCharacters => "zeroWidthCharacters",
            ThreatIndicator::EmailAddresses => "emailAddresses",
            ThreatIndicator::PhoneNumbers => "phoneNumbers",
        }
    }

    /// Indicator for a payload key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.key() == key)
    }
}

/// Flat map of removed indicator keys to their values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreatReport(Map<String, Value>);

impl ThreatReport {
    /// Empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an indicator; a later insert of the same key wins.
    pub fn insert(&mut self, indicator: ThreatIndicator, value: Value) {
        self.0.insert(indicator.key().to_string(), value);
    }

    /// Value recorded for `indicator`
    pub fn get(&self, indicator: ThreatIndicator) -> Option<&Value> {
        self.0.get(indicator.key())
    }

    /// True if `indicator` was found
    pub fn contains(&self, indicator: ThreatIndicator) -> bool {
        self.0.contains_key(indicator.key())
    }

    /// Keys in discovery order
    pub fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    /// Number of indicators
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if nothing was found
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Underlying map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// True if `key` occurs anywhere in the report, including nested values
    fn mentions_key(&self, key: &str) -> bool {
        self.0.contains_key(key) || self.0.values().any(|v| value_has_key(v, key))
    }

    fn any_string(&self, predicate: &dyn Fn(&str) -> bool) -> bool {
        self.0.values().any(|v| value_any_string(v, predicate))
    }
}

/// Payload with indicator keys removed, plus what was removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    /// Payload without indicator keys
    pub cleaned: Value,
    /// Removed keys; absent when nothing was found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_report: Option<ThreatReport>,
}

/// Severity of a threat report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatSeverity {
    /// Suspicious content
    Medium,
    /// PII exposure
    High,
    /// Script injection
    Critical,
}

impl fmt::Display for ThreatSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThreatSeverity::Medium => "Medium",
            ThreatSeverity::High => "High",
            ThreatSeverity::Critical => "Critical",
        })
    }
}

/// Graded report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatAssessment {
    /// Severity
    pub severity: ThreatSeverity,
    /// Trigger taxonomy entries
    pub triggers: Vec<String>,
    /// Human-readable rationale
    pub rationale: String,
}

/// Result of [`ThreatKeyExtractor::extract_and_escalate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Triage {
    /// Extraction result
    #[serde(flatten)]
    pub extraction: Extraction,
    /// Assessment, when anything was found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<ThreatAssessment>,
    /// Escalation id, when an escalation was filed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_id: Option<String>,
}

/// Trigger for script-injection indicators
pub const TRIGGER_MALICIOUS_PAYLOAD: &str = "malicious_payload_detected";
/// Trigger for XSS indicators
pub const TRIGGER_XSS: &str = "xss_attempt";
/// Trigger for PII indicators
pub const TRIGGER_PII: &str = "pii_data_leakage";
/// Trigger for everything else
pub const TRIGGER_SUSPICIOUS: &str = "suspicious_content";

lazy_static! {
    static ref SCRIPT_SHAPED: Option<Regex> = Regex::new(
        r"(?i)<\s*script|javascript\s*:|vbscript\s*:|\bon[a-z]+\s*=|alert\s*\(|document\.cookie"
    )
    .ok();
}

fn is_script_shaped(text: &str) -> bool {
    SCRIPT_SHAPED.as_ref().is_some_and(|r| r.is_match(text))
}

/// Remove indicator keys from `value`, in place.
pub fn extract_threat_keys(mut value: Value) -> Extraction {
    let mut report = ThreatReport::new();
    strip_indicators(&mut value, &mut report);
    Extraction {
        cleaned: value,
        security_report: (!report.is_empty()).then_some(report),
    }
}

fn strip_indicators(value: &mut Value, report: &mut ThreatReport) {
    match value {
        Value::Object(map) => {
            let mut found = Vec::new();
            map.retain(|key, child| match ThreatIndicator::from_key(key) {
                Some(indicator) => {
                    found.push((indicator, std::mem::take(child)));
                    false
                },
                None => true,
            });
            for (indicator, removed) in found {
                report.insert(indicator, removed);
            }
            for child in map.values_mut() {
                strip_indicators(child, report);
            }
        },
        Value::Array(items) => {
            for item in items {
                strip_indicators(item, report);
            }
        },
        _ => {},
    }
}

fn value_has_key(value: &Value, key: &str) -> bool {
    match value {
        Value::Object(map) => map.contains_key(key) || map.values().any(|v| value_has_key(v, key)),
        Value::Array(items) => items.iter().any(|v| value_has_key(v, key)),
        _ => false,
    }
}

fn value_any_string(value: &Value, predicate: &dyn Fn(&str) -> bool) -> bool {
    match value {
        Value::String(text) => predicate(text),
        Value::Object(map) => map.values().any(|v| value_any_string(v, predicate)),
        Value::Array(items) => items.iter().any(|v| value_any_string(v, predicate)),
        _ => false,
    }
}

/// Deterministic escalation id for a job
pub fn escalation_id(job_id: &str) -> String {
    format!("esc-{}", Uuid::new_v5(&Uuid::NAMESPACE_OID, job_id.as_bytes()))
}

/// Extracts indicator keys and escalates non-empty reports.
pub struct ThreatKeyExtractor {
    audit: Arc<dyn AuditSink>,
    span: Span,
}

impl fmt::Debug for ThreatKeyExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreatKeyExtractor")
            .field("audit", &self.audit.name())
            .finish_non_exhaustive()
    }
}

impl ThreatKeyExtractor {
    /// Create an extractor reporting to `audit`
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            audit,
            span: tracing::info_span!("threat_extractor"),
        }
    }

    /// Attach a tracing span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Remove indicator keys. The input is consumed and edited in place.
    pub fn extract(&self, value: Value) -> Extraction {
        let extraction = extract_threat_keys(value);
        if let Some(report) = &extraction.security_report {
            tracing::debug!(parent: &self.span, keys = ?report.keys(), "Threat keys extracted");
        }
        extraction
    }

    /// Grade a report.
    pub fn assess(report: &ThreatReport) -> ThreatAssessment {
        let xss = report.mentions_key(ThreatIndicator::PotentialXss.key())
            || report.any_string(&is_script_shaped);
        if xss {
            return ThreatAssessment {
                severity: ThreatSeverity::Critical,
                triggers: vec![TRIGGER_MALICIOUS_PAYLOAD.into(), TRIGGER_XSS.into()],
                rationale: "Script injection indicators present; payload treated as malicious"
                    .into(),
            };
        }

        let pii = report.mentions_key(ThreatIndicator::EmailAddresses.key())
            || report.mentions_key(ThreatIndicator::PhoneNumbers.key())
            || report.any_string(&contains_pii);
        if pii {
            return ThreatAssessment {
                severity: ThreatSeverity::High,
                triggers: vec![TRIGGER_PII.into()],
                rationale: "Personal data indicators present; possible PII leakage".into(),
            };
        }

        ThreatAssessment {
            severity: ThreatSeverity::Medium,
            triggers: vec![TRIGGER_SUSPICIOUS.into()],
            rationale: "Suspicious content indicators present".into(),
        }
    }

    /// Escalation record for a graded report
    pub fn escalation_record(
        job_id: &str,
        report: &ThreatReport,
        assessment: &ThreatAssessment,
    ) -> EscalationRecord {
        EscalationRecord::new(
            escalation_id(job_id),
            job_id,
            assessment.severity,
            &assessment.triggers,
            &assessment.rationale,
            report.keys(),
        )
    }

    /// Extract, grade and escalate. Sink failures are logged and ignored.
    pub async fn extract_and_escalate(&self, job_id: &str, value: Value) -> Triage {
        let extraction = self.extract(value);
        let graded = extraction.security_report.as_ref().map(|report| {
            let assessment = Self::assess(report);
            let record = Self::escalation_record(job_id, report, &assessment);
            (assessment, record)
        });
        let Some((assessment, record)) = graded else {
            return Triage {
                extraction,
                assessment: None,
                escalation_id: None,
            };
        };

        if let Err(e) = self.audit.log_escalation_decision(&record).await {
            tracing::warn!(
                parent: &self.span,
                sink = self.audit.name(),
                "Escalation record not delivered: {e}"
            );
        }
        tracing::info!(
            parent: &self.span,
            escalation_id = %record.escalation_id,
            severity = %assessment.severity,
            "Escalated threat report"
        );

        Triage {
            escalation_id: Some(record.escalation_id),
            assessment: Some(assessment),
            extraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use serde_json::json;

    fn report(value: Value) -> ThreatReport {
        extract_threat_keys(value).security_report.unwrap()
    }

    #[test]
    fn test_extracts_nested_keys() {
        let extraction = extract_threat_keys(json!({
            "data": "ok",
            "potentialXSS": "<script>",
            "nested": [{"emailAddresses": ["a@b.io"], "keep": 1}],
        }));
        assert_eq!(extraction.cleaned, json!({"data": "ok", "nested": [{"keep": 1}]}));
        let report = extraction.security_report.unwrap();
        assert_eq!(report.keys(), vec!["potentialXSS", "emailAddresses"]);
    }

    #[test]
    fn test_deeper_occurrence_overwrites() {
        let report = report(json!({
            "unicodeText": "outer",
            "child": {"unicodeText": "inner"},
        }));
        assert_eq!(report.len(), 1);
        assert_eq!(report.get(ThreatIndicator::UnicodeText), Some(&json!("inner")));
    }

    #[test]
    fn test_removed_value_not_walked() {
        let extraction = extract_threat_keys(json!({
            "sanitizationTests": {"phoneNumbers": "555-123-4567"},
        }));
        let report = extraction.security_report.unwrap();
        assert_eq!(report.keys(), vec!["sanitizationTests"]);
        assert_eq!(
            report.get(ThreatIndicator::SanitizationTests),
            Some(&json!({"phoneNumbers": "555-123-4567"}))
        );
    }

    #[test]
    fn test_no_keys_no_report() {
        let extraction = extract_threat_keys(json!({"a": [1, {"b": 2}]}));
        assert!(extraction.security_report.is_none());
        let wire = serde_json::to_value(&extraction).unwrap();
        assert_eq!(wire, json!({"cleaned": {"a": [1, {"b": 2}]}}));
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(extract_threat_keys(json!("text")).cleaned, json!("text"));
        assert_eq!(extract_threat_keys(json!(null)).cleaned, json!(null));
    }

    #[test]
    fn test_indicator_keys_round_trip() {
        for indicator in ThreatIndicator::ALL {
            assert_eq!(ThreatIndicator::from_key(indicator.key()), Some(indicator));
        }
        assert!(ThreatIndicator::from_key("potentialxss").is_none());
    }

    #[test]
    fn test_assess_xss_is_critical() {
        let a = ThreatKeyExtractor::assess(&report(json!({"potentialXSS": true})));
        assert_eq!(a.severity, ThreatSeverity::Critical);
        assert_eq!(a.triggers, vec![TRIGGER_MALICIOUS_PAYLOAD, TRIGGER_XSS]);

        let nested = report(json!({"sanitizationTests": {"potentialXSS": "x"}}));
        assert_eq!(ThreatKeyExtractor::assess(&nested).severity, ThreatSeverity::Critical);

        let shaped = report(json!({"symbolsAndSpecialChars": "<img onerror=alert(1)>"}));
        assert_eq!(ThreatKeyExtractor::assess(&shaped).severity, ThreatSeverity::Critical);
    }

    #[test]
    fn test_assess_pii_is_high() {
        let a = ThreatKeyExtractor::assess(&report(json!({"phoneNumbers": []})));
        assert_eq!(a.severity, ThreatSeverity::High);
        assert_eq!(a.triggers, vec![TRIGGER_PII]);

        let shaped = report(json!({"unicodeText": "reach me at x@y.com"}));
        assert_eq!(ThreatKeyExtractor::assess(&shaped).severity, ThreatSeverity::High);
    }

    #[test]
    fn test_assess_other_is_medium() {
        let a = ThreatKeyExtractor::assess(&report(json!({"zeroWidthCharacters": "a\u{200b}b"})));
        assert_eq!(a.severity, ThreatSeverity::Medium);
        assert_eq!(a.triggers, vec![TRIGGER_SUSPICIOUS]);
    }

    #[test]
    fn test_escalation_id_deterministic() {
        assert_eq!(escalation_id("job-1"), escalation_id("job-1"));
        assert_ne!(escalation_id("job-1"), escalation_id("job-2"));
        assert!(escalation_id("job-1").starts_with("esc-"));
    }

    #[tokio::test]
    async fn test_extract_and_escalate() {
        let sink = Arc::new(MemoryAuditSink::new());
        let extractor = ThreatKeyExtractor::new(sink.clone());

        let triage = extractor
            .extract_and_escalate("job-7", json!({"msg": "hi", "emailAddresses": ["a@b.io"]}))
            .await;
        assert_eq!(triage.extraction.cleaned, json!({"msg": "hi"}));
        assert_eq!(triage.assessment.unwrap().severity, ThreatSeverity::High);
        assert_eq!(triage.escalation_id, Some(escalation_id("job-7")));

        let escalations = sink.escalations();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].job_id, "job-7");
        assert_eq!(escalations[0].report_keys, vec!["emailAddresses"]);
    }

    #[tokio::test]
    async fn test_clean_payload_not_escalated() {
        let sink = Arc::new(MemoryAuditSink::new());
        let extractor = ThreatKeyExtractor::new(sink.clone());

        let triage = extractor.extract_and_escalate("job-8", json!({"msg": "hi"})).await;
        assert!(triage.escalation_id.is_none());
        assert!(sink.is_empty());
    }
}
