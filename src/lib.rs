//! # Trustgate - Zero-Trust Content Sanitization
//!
//! Sanitizes content on its way to and from LLMs, certifies the result with
//! a signed trust token, and triages threat annotations left by upstream
//! validators.
//!
//! ## Features
//!
//! - **Sanitization pipeline**: Unicode normalization, invisible and control
//!   character stripping, ANSI escape neutralization, markup and PII
//!   redaction, applied recursively to JSON structures
//! - **Trust tokens**: HMAC-SHA256 signed, expiring certificates binding
//!   sanitized content to its origin
//! - **Threat triage**: extraction of indicator keys, severity grading and
//!   human-review escalation
//! - **Audit trail**: pluggable sink for every decision
//!
//! ## Architecture
//!
//! ```text
//!   value ──> [hook.before] ──> walk ──> Normalize ─> Strip ─> Neutralize ─> Redact
//!                                 │                                              │
//!                                 └───────────── sanitized value <───────────────┘
//!                                                      │
//!                         content hash ──> FIFO cache  │
//!                                                      v
//!                              [mint trust token] ──> output ──> [hook.after]
//!
//!   every call ──> AuditSink (risk assessment, risk cases, processing record)
//! ```
//!
//! ### Zero Trust
//!
//! A presented trust token never short-circuits sanitization. It is
//! validated and the outcome is logged, then the full chain runs.
//!
//! ### Failure Policy
//!
//! | Failure                          | Effect                         |
//! |----------------------------------|--------------------------------|
//! | Stage error                      | call fails, no partial output  |
//! | Nesting or size limit exceeded   | call fails, no partial output  |
//! | Audit sink error                 | logged, call continues         |
//! | Validation hook error            | logged, call continues         |
//! | Presented token invalid          | logged, call continues         |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use trustgate::{SanitizationPipeline, SanitizeOptions, SigningKey, TrustTokenIntegrity};
//! use trustgate::audit::TracingAuditSink;
//!
//! let pipeline = SanitizationPipeline::builder()
//!     .trust_tokens(TrustTokenIntegrity::new(SigningKey::from_env()?))
//!     .audit_sink(Arc::new(TracingAuditSink))
//!     .build();
//!
//! let out = pipeline
//!     .sanitize(
//!         &json!({"prompt": "email me at a@b.io <script>x</script>"}),
//!         &SanitizeOptions::new().with_trust_token(),
//!     )
//!     .await?;
//!
//! assert_eq!(out.value(), &json!({"prompt": "email me at EMAIL_REDACTED"}));
//! assert!(out.trust_token().is_some());
//! ```
//!
//! ### Threat Triage
//!
//! ```rust,ignore
//! use trustgate::{ThreatKeyExtractor, ThreatSeverity};
//!
//! let extractor = ThreatKeyExtractor::new(Arc::new(TracingAuditSink));
//! let triage = extractor
//!     .extract_and_escalate("job-42", json!({"msg": "hi", "potentialXSS": "<script>"}))
//!     .await;
//! assert_eq!(triage.assessment.unwrap().severity, ThreatSeverity::Critical);
//! ```
//!
//! ## Modules
//!
//! - [`stages`]: Leaf text transforms
//! - [`pipeline`]: Recursive sanitization, caching, audit emission
//! - [`token`]: Trust token minting and validation
//! - [`threat`]: Threat-key extraction and escalation
//! - [`audit`]: Audit sink trait and built-in sinks
//! - [`hash`]: Content hashing
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod audit;
pub mod config;
pub mod error;
pub mod hash;
pub mod pipeline;
pub mod stages;
pub mod threat;
pub mod token;

// Re-exports for convenience
pub use audit::{AuditSink, MemoryAuditSink, NoopAuditSink, TracingAuditSink};
pub use config::Config;
pub use error::{Result, SanitizeError};
pub use pipeline::{
    Classification, Operation, RiskLevel, SanitizationPipeline, SanitizeMode, SanitizeOptions,
    SanitizeOutput,
};
pub use stages::SanitizationStage;
pub use threat::{Extraction, ThreatKeyExtractor, ThreatReport, ThreatSeverity};
pub use token::{SigningKey, TokenValidation, TrustToken, TrustTokenIntegrity};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
