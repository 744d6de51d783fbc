//! Sanitization pipeline.
//!
//! Runs every string in a value through the leaf stages, records the
//! decision trail with the audit sink, caches results by content hash and
//! optionally mints a trust token over the output.
//!
//! # Zero Trust
//!
//! The chain always runs in full. Classification, risk level, mode and a
//! presented trust token are recorded but never change the output: the same
//! input yields the same sanitized value whether or not it arrives with a
//! valid token.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use trustgate::audit::TracingAuditSink;
//! use trustgate::pipeline::{SanitizationPipeline, SanitizeOptions};
//!
//! let pipeline = SanitizationPipeline::builder()
//!     .audit_sink(Arc::new(TracingAuditSink))
//!     .build();
//!
//! let out = pipeline
//!     .sanitize(&json!({"msg": "mail a@b.io"}), &SanitizeOptions::default())
//!     .await?;
//! assert_eq!(out.value(), &json!({"msg": "mail EMAIL_REDACTED"}));
//! ```

mod cache;
mod hook;
mod options;
mod stats;

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::Span;

pub use cache::{CacheEntry, FifoCache};
pub use hook::{HookFuture, ShapeHook, ValidationHook};
pub use options::{Classification, Operation, RiskLevel, SanitizeMode, SanitizeOptions};
pub use stats::{PipelineStats, StatsSummary};

use crate::audit::{
    AuditFuture, AuditSink, NoopAuditSink, ProcessingRecord, RiskAssessmentRecord,
    RiskCaseRecord,
};
use crate::config::{Config, PipelineConfig, RiskConfig};
use crate::error::{Result, SanitizeError};
use crate::hash::{content_hash, value_hash, HashReference};
use crate::stages::{default_stages, run_chain, stage_names, StageRef};
use crate::token::{MintOptions, TokenValidation, TrustToken, TrustTokenIntegrity};

/// Object keys whose whole subtree passes through untouched.
pub const PRESERVED_KEYS: &[&str] = &[
    "trustToken",
    "timestamp",
    "requestId",
    "correlationId",
    "validationId",
];

/// Confidence above which a High assessment gets its own record
pub const HIGH_RISK_CONFIDENCE: f64 = 0.8;

/// Confidence below which an unset assessment gets its own record
pub const UNKNOWN_RISK_CONFIDENCE: f64 = 0.3;

/// True if `key` is on the preserve list
pub fn is_preserved_key(key: &str) -> bool {
    PRESERVED_KEYS.contains(&key)
}

/// Result of a `sanitize` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SanitizeOutput {
    /// Sanitized value only
    Value(Value),
    /// Sanitized value with a trust token
    Certified {
        /// Sanitized value
        #[serde(rename = "sanitizedValue")]
        sanitized_value: Value,
        /// Token over the sanitized content
        #[serde(rename = "trustToken")]
        trust_token: TrustToken,
    },
}

impl SanitizeOutput {
    /// The sanitized value
    pub fn value(&self) -> &Value {
        match self {
            SanitizeOutput::Value(value) => value,
            SanitizeOutput::Certified {
                sanitized_value, ..
            } => sanitized_value,
        }
    }

    /// The minted token, if one was requested
    pub fn trust_token(&self) -> Option<&TrustToken> {
        match self {
            SanitizeOutput::Value(_) => None,
            SanitizeOutput::Certified { trust_token, .. } => Some(trust_token),
        }
    }

    /// Take the sanitized value
    pub fn into_value(self) -> Value {
        match self {
            SanitizeOutput::Value(value) => value,
            SanitizeOutput::Certified {
                sanitized_value, ..
            } => sanitized_value,
        }
    }
}

/// Builder for [`SanitizationPipeline`].
pub struct PipelineBuilder {
    config: PipelineConfig,
    risk: RiskConfig,
    stages: Vec<StageRef>,
    tokens: Option<TrustTokenIntegrity>,
    audit: Arc<dyn AuditSink>,
    hook: Option<Arc<dyn ValidationHook>>,
    span: Option<Span>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            config: PipelineConfig::default(),
            risk: RiskConfig::default(),
            stages: default_stages(),
            tokens: None,
            audit: Arc::new(NoopAuditSink),
            hook: None,
            span: None,
        }
    }
}

impl PipelineBuilder {
    /// Pipeline limits and cache settings
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Classification to risk mapping
    pub fn risk(mut self, risk: RiskConfig) -> Self {
        self.risk = risk;
        self
    }

    /// Replace the stage chain
    pub fn stages(mut self, stages: Vec<StageRef>) -> Self {
        self.stages = stages;
        self
    }

    /// Enable token minting and validation
    pub fn trust_tokens(mut self, tokens: TrustTokenIntegrity) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Audit destination
    pub fn audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Validation hook
    pub fn hook(mut self, hook: Arc<dyn ValidationHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Parent span for pipeline events
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Assemble the pipeline
    pub fn build(self) -> SanitizationPipeline {
        let span = self
            .span
            .unwrap_or_else(|| tracing::info_span!("sanitization_pipeline"));
        let tokens = self.tokens.map(|t| t.with_span(span.clone()));
        let rules = stage_names(&self.stages);

        SanitizationPipeline {
            cache: Mutex::new(FifoCache::new(self.config.cache_capacity)),
            config: self.config,
            risk: self.risk,
            stages: self.stages,
            rules,
            tokens,
            audit: self.audit,
            hook: self.hook,
            stats: PipelineStats::new(),
            span,
        }
    }
}

/// Sanitizes values, audits the decisions and certifies results.
pub struct SanitizationPipeline {
    config: PipelineConfig,
    risk: RiskConfig,
    stages: Vec<StageRef>,
    rules: Vec<String>,
    tokens: Option<TrustTokenIntegrity>,
    audit: Arc<dyn AuditSink>,
    hook: Option<Arc<dyn ValidationHook>>,
    cache: Mutex<FifoCache>,
    stats: PipelineStats,
    span: Span,
}

impl fmt::Debug for SanitizationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SanitizationPipeline")
            .field("config", &self.config)
            .field("rules", &self.rules)
            .field("audit", &self.audit.name())
            .field("trust_tokens", &self.tokens.is_some())
            .finish_non_exhaustive()
    }
}

impl SanitizationPipeline {
    /// Start building a pipeline
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Build from configuration. When trust tokens are enabled a signing
    /// secret must be configured or present in the environment.
    pub fn from_config(config: &Config, audit: Arc<dyn AuditSink>) -> Result<Self> {
        let mut builder = Self::builder()
            .config(config.pipeline.clone())
            .risk(config.risk.clone())
            .audit_sink(audit);
        if config.trust_token.enabled {
            builder = builder.trust_tokens(TrustTokenIntegrity::from_config(&config.trust_token)?);
        }
        Ok(builder.build())
    }

    /// Sanitize `input`.
    ///
    /// Stage failures and structural limit violations fail the whole call;
    /// audit, hook and token-validation problems are logged and ignored.
    pub async fn sanitize(
        &self,
        input: &Value,
        options: &SanitizeOptions,
    ) -> Result<SanitizeOutput> {
        let started = Instant::now();
        let result = self.run(input, options, started).await;
        if let Err(e) = &result {
            self.stats.record_failure();
            tracing::warn!(parent: &self.span, error = %e, "Sanitization failed closed");
        }
        result
    }

    async fn run(
        &self,
        input: &Value,
        options: &SanitizeOptions,
        started: Instant,
    ) -> Result<SanitizeOutput> {
        let original = match input {
            Value::String(text) => text.clone(),
            other => serde_json::to_string(other)?,
        };
        self.check_size(original.len())?;
        let input_hash = match input {
            Value::String(text) => HashReference::of(text),
            other => value_hash(other),
        };

        if let Some(hook) = &self.hook {
            if let Err(e) = hook.before(input).await {
                self.stats.record_hook_failure();
                tracing::warn!(parent: &self.span, "Validation hook (before) failed: {e}");
            }
        }

        let presented = options
            .trust_token
            .as_ref()
            .and_then(|token| self.check_presented(token));

        self.record_risk(options, &input_hash).await;

        let (sanitized, content) = self.sanitize_value(input)?;
        let hash = content_hash(&content);
        let cache_hit = self.remember(&hash, &sanitized);

        let token = if options.generate_trust_token {
            self.mint(&content, &original)?
        } else {
            None
        };

        let elapsed = started.elapsed();
        let record = ProcessingRecord {
            record_id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            input_length: original.len(),
            output_length: content.len(),
            processing_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            rules_applied: self.rules.clone(),
            mode: options.mode.unwrap_or(self.config.default_mode),
            operation: options.operation,
            input_hash,
            content_hash: hash,
            cache_hit,
            token_minted: token.is_some(),
            presented_token: presented,
        };
        self.emit(
            "high_fidelity",
            self.audit.log_high_fidelity_data_collection(&record),
        )
        .await;

        if let Some(hook) = &self.hook {
            if let Err(e) = hook.after(&sanitized).await {
                self.stats.record_hook_failure();
                tracing::warn!(parent: &self.span, "Validation hook (after) failed: {e}");
            }
        }

        self.stats
            .record_call(original.len(), content.len(), elapsed, cache_hit);
        tracing::debug!(
            parent: &self.span,
            operation = options.operation.direction(),
            input_len = original.len(),
            output_len = content.len(),
            cache_hit,
            "Sanitized"
        );

        Ok(match token {
            Some(trust_token) => SanitizeOutput::Certified {
                sanitized_value: sanitized,
                trust_token,
            },
            None => SanitizeOutput::Value(sanitized),
        })
    }

    /// Run the leaf chain over a single string.
    pub fn sanitize_text(&self, text: &str) -> Result<String> {
        self.check_size(text.len())?;
        run_chain(&self.stages, text)
    }

    /// Cached sanitized value for a content hash
    pub fn cached(&self, hash: &str) -> Option<Value> {
        let cache = self.cache.lock().ok()?;
        cache.get(hash).map(|entry| entry.sanitized_value.clone())
    }

    /// Number of cached entries
    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Runtime statistics
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Stage names in application order
    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    /// Token integrity, if configured
    pub fn trust_tokens(&self) -> Option<&TrustTokenIntegrity> {
        self.tokens.as_ref()
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.config.max_input_bytes {
            return Err(SanitizeError::ContentTooLarge {
                size,
                max: self.config.max_input_bytes,
            });
        }
        Ok(())
    }

    /// Returns the sanitized value and the text that was hashed for it.
    fn sanitize_value(&self, input: &Value) -> Result<(Value, String)> {
        match input {
            Value::String(text) => match parse_structured(text) {
                Some(parsed) => {
                    let clean = self.walk(&parsed, 0)?;
                    let serialized = serde_json::to_string(&clean)?;
                    Ok((Value::String(serialized.clone()), serialized))
                },
                None => {
                    let clean = run_chain(&self.stages, text)?;
                    Ok((Value::String(clean.clone()), clean))
                },
            },
            other => {
                let clean = self.walk(other, 0)?;
                let serialized = serde_json::to_string(&clean)?;
                Ok((clean, serialized))
            },
        }
    }

    fn walk(&self, value: &Value, depth: usize) -> Result<Value> {
        if depth > self.config.max_depth {
            return Err(SanitizeError::NestingTooDeep {
                depth,
                max: self.config.max_depth,
            });
        }

        match value {
            Value::String(text) => Ok(Value::String(run_chain(&self.stages, text)?)),
            Value::Array(items) => items
                .iter()
                .map(|item| self.walk(item, depth + 1))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, item) in map {
                    let clean = if is_preserved_key(key) {
                        item.clone()
                    } else {
                        self.walk(item, depth + 1)?
                    };
                    out.insert(key.clone(), clean);
                }
                Ok(Value::Object(out))
            },
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(value.clone()),
        }
    }

    /// Store the result; true if the hash was already present.
    fn remember(&self, hash: &str, sanitized: &Value) -> bool {
        let Ok(mut cache) = self.cache.lock() else {
            tracing::warn!(parent: &self.span, "Content cache poisoned, skipping");
            return false;
        };
        let hit = cache.contains(hash);
        if let Some(evicted) = cache.insert(hash.to_string(), CacheEntry::new(sanitized.clone())) {
            tracing::trace!(parent: &self.span, %evicted, "Evicted cache entry");
        }
        hit
    }

    fn check_presented(&self, token: &TrustToken) -> Option<TokenValidation> {
        let Some(tokens) = &self.tokens else {
            tracing::warn!(
                parent: &self.span,
                "Trust token presented but no signing key configured; ignoring"
            );
            return None;
        };

        let validation = tokens.validate(token);
        if let TokenValidation::Invalid(reason) = &validation {
            self.stats.record_token_rejected();
            tracing::warn!(
                parent: &self.span,
                %reason,
                "Presented trust token invalid; sanitizing in full"
            );
        }
        Some(validation)
    }

    /// Mint a token when minting is enabled; otherwise warn and return none.
    fn mint(&self, content: &str, original: &str) -> Result<Option<TrustToken>> {
        let Some(tokens) = &self.tokens else {
            tracing::warn!(
                parent: &self.span,
                "Trust token requested but token minting is disabled; returning value only"
            );
            return Ok(None);
        };
        let token = tokens.mint(content, original, &self.rules, &MintOptions::default())?;
        self.stats.record_token_minted();
        Ok(Some(token))
    }

    async fn record_risk(&self, options: &SanitizeOptions, input_hash: &HashReference) {
        let mapped = options
            .risk_level
            .is_unset()
            .then(|| self.risk.level_for(options.classification));
        let assessment = RiskAssessmentRecord::new(
            options.classification,
            options.risk_level,
            mapped,
            options.risk_score,
            &options.triggers,
            options.operation,
        );
        self.emit(
            "risk_assessment",
            self.audit.log_risk_assessment_decision(&assessment),
        )
        .await;

        let case = || {
            RiskCaseRecord::new(
                options.classification,
                options.risk_level,
                options.risk_score,
                &options.triggers,
                input_hash.clone(),
            )
        };
        if options.risk_level == RiskLevel::High && options.risk_score > HIGH_RISK_CONFIDENCE {
            let record = case();
            self.emit("high_risk", self.audit.log_high_risk_case(&record))
                .await;
        } else if options.risk_level.is_unset() && options.risk_score < UNKNOWN_RISK_CONFIDENCE {
            let record = case();
            self.emit("unknown_risk", self.audit.log_unknown_risk_case(&record))
                .await;
        }
    }

    async fn emit(&self, kind: &'static str, future: AuditFuture<'_>) {
        if let Err(e) = future.await {
            self.stats.record_audit_failure();
            tracing::warn!(
                parent: &self.span,
                sink = self.audit.name(),
                kind,
                "Audit sink failed: {e}"
            );
        }
    }
}

/// Parse text that looks like a JSON object or array.
fn parse_structured(text: &str) -> Option<Value> {
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditError, AuditEvent, EscalationRecord, MemoryAuditSink};
    use crate::token::SigningKey;
    use serde_json::json;

    fn pipeline_with(audit: Arc<dyn AuditSink>) -> SanitizationPipeline {
        SanitizationPipeline::builder()
            .trust_tokens(TrustTokenIntegrity::new(
                SigningKey::from_secret("pipeline-test-secret-0123").unwrap(),
            ))
            .audit_sink(audit)
            .build()
    }

    fn pipeline() -> SanitizationPipeline {
        pipeline_with(Arc::new(NoopAuditSink))
    }

    #[tokio::test]
    async fn test_plain_text() {
        let out = pipeline()
            .sanitize(&json!("Hello <script>x</script> world!"), &SanitizeOptions::default())
            .await
            .unwrap();
        assert_eq!(out, SanitizeOutput::Value(json!("Hello  world")));
    }

    #[tokio::test]
    async fn test_structure_walk() {
        let input = json!({
            "name": "Ann, <b>",
            "n": 3,
            "ok": true,
            "none": null,
            "list": ["a@b.io", {"deep": "x!"}],
            "requestId": "req-1!",
        });
        let out = pipeline()
            .sanitize(&input, &SanitizeOptions::default())
            .await
            .unwrap();
        assert_eq!(
            out.into_value(),
            json!({
                "name": "Ann b",
                "n": 3,
                "ok": true,
                "none": null,
                "list": ["EMAIL_REDACTED", {"deep": "x"}],
                "requestId": "req-1!",
            })
        );
    }

    #[tokio::test]
    async fn test_preserved_subtree_untouched() {
        let input = json!({"trustToken": {"signature": "<script>"}, "note": "<script>x</script>hi"});
        let out = pipeline()
            .sanitize(&input, &SanitizeOptions::default())
            .await
            .unwrap();
        assert_eq!(
            out.into_value(),
            json!({"trustToken": {"signature": "<script>"}, "note": "hi"})
        );
    }

    #[tokio::test]
    async fn test_json_text_reserialized() {
        let out = pipeline()
            .sanitize(&json!(r#"{"a":"x!","b":[1,"y?"]}"#), &SanitizeOptions::default())
            .await
            .unwrap();
        assert_eq!(out.into_value(), json!(r#"{"a":"x","b":[1,"y"]}"#));
    }

    #[tokio::test]
    async fn test_brace_text_that_is_not_json() {
        let out = pipeline()
            .sanitize(&json!("{not json"), &SanitizeOptions::default())
            .await
            .unwrap();
        assert_eq!(out.into_value(), json!("not json"));
    }

    #[tokio::test]
    async fn test_token_minted_on_request() {
        let p = pipeline();
        let out = p
            .sanitize(&json!("hello!"), &SanitizeOptions::new().with_trust_token())
            .await
            .unwrap();
        let token = out.trust_token().unwrap();
        assert_eq!(token.content_hash, content_hash("hello"));
        assert_eq!(token.original_hash, content_hash("hello!"));
        assert_eq!(token.rules_applied.as_deref(), Some(p.rules()));
        assert!(p.trust_tokens().unwrap().validate(token).is_valid());
        assert_eq!(p.stats().tokens_minted(), 1);

        let wire = serde_json::to_value(&out).unwrap();
        assert_eq!(wire["sanitizedValue"], "hello");
        assert!(wire["trustToken"]["signature"].is_string());
    }

    #[tokio::test]
    async fn test_token_request_without_minting_returns_value() {
        let p = SanitizationPipeline::builder().build();
        let out = p
            .sanitize(&json!("x!"), &SanitizeOptions::new().with_trust_token())
            .await
            .unwrap();
        assert_eq!(out, SanitizeOutput::Value(json!("x")));
        assert!(out.trust_token().is_none());
        assert_eq!(p.stats().total_failures(), 0);
        assert_eq!(p.stats().tokens_minted(), 0);
    }

    #[tokio::test]
    async fn test_token_request_with_minting_disabled_in_config() {
        let mut config = Config::default();
        config.trust_token.enabled = false;
        let sink = Arc::new(MemoryAuditSink::new());
        let p = SanitizationPipeline::from_config(&config, sink.clone()).unwrap();

        let out = p
            .sanitize(&json!({"msg": "hi!"}), &SanitizeOptions::new().with_trust_token())
            .await
            .unwrap();
        assert_eq!(out.into_value(), json!({"msg": "hi"}));
        assert!(!sink.processing_records()[0].token_minted);
    }

    #[tokio::test]
    async fn test_cache_hits_and_lookup() {
        let p = pipeline();
        let options = SanitizeOptions::default();
        p.sanitize(&json!("same!"), &options).await.unwrap();
        p.sanitize(&json!("same?"), &options).await.unwrap();

        assert_eq!(p.cache_len(), 1);
        assert_eq!(p.stats().cache_hits(), 1);
        assert_eq!(p.cached(&content_hash("same")), Some(json!("same")));
    }

    #[tokio::test]
    async fn test_cache_bound() {
        let p = SanitizationPipeline::builder()
            .config(PipelineConfig {
                cache_capacity: 2,
                ..PipelineConfig::default()
            })
            .build();
        for text in ["a", "b", "c"] {
            p.sanitize(&json!(text), &SanitizeOptions::default()).await.unwrap();
        }
        assert_eq!(p.cache_len(), 2);
        assert!(p.cached(&content_hash("a")).is_none());
        assert!(p.cached(&content_hash("c")).is_some());
    }

    #[tokio::test]
    async fn test_depth_limit_fails_closed() {
        let p = SanitizationPipeline::builder()
            .config(PipelineConfig {
                max_depth: 2,
                ..PipelineConfig::default()
            })
            .build();
        let ok = json!({"a": {"b": "x"}});
        assert!(p.sanitize(&ok, &SanitizeOptions::default()).await.is_ok());

        let deep = json!({"a": {"b": {"c": "x"}}});
        let err = p.sanitize(&deep, &SanitizeOptions::default()).await.unwrap_err();
        assert!(matches!(err, SanitizeError::NestingTooDeep { depth: 3, max: 2 }));
    }

    #[tokio::test]
    async fn test_size_limit_fails_closed() {
        let p = SanitizationPipeline::builder()
            .config(PipelineConfig {
                max_input_bytes: 4,
                ..PipelineConfig::default()
            })
            .build();
        let err = p
            .sanitize(&json!("too long"), &SanitizeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SanitizeError::ContentTooLarge { size: 8, max: 4 }));
        assert!(p.sanitize_text("too long").is_err());
    }

    #[tokio::test]
    async fn test_audit_records() {
        let sink = Arc::new(MemoryAuditSink::new());
        let p = pipeline_with(sink.clone());

        p.sanitize(
            &json!("x"),
            &SanitizeOptions::new()
                .classification(Classification::Llm)
                .risk(RiskLevel::High, 0.9),
        )
        .await
        .unwrap();
        assert_eq!(sink.count("risk_assessment"), 1);
        assert_eq!(sink.count("high_risk"), 1);
        assert_eq!(sink.count("unknown_risk"), 0);
        assert_eq!(sink.count("high_fidelity"), 1);

        p.sanitize(&json!("x"), &SanitizeOptions::new().risk(RiskLevel::Unset, 0.1))
            .await
            .unwrap();
        assert_eq!(sink.count("unknown_risk"), 1);
        assert_eq!(sink.count("high_risk"), 1);

        p.sanitize(&json!("x"), &SanitizeOptions::new().risk(RiskLevel::High, 0.8))
            .await
            .unwrap();
        assert_eq!(sink.count("high_risk"), 1);
    }

    #[tokio::test]
    async fn test_mapped_level_only_when_unset() {
        let sink = Arc::new(MemoryAuditSink::new());
        let p = pipeline_with(sink.clone());

        p.sanitize(&json!("x"), &SanitizeOptions::new().classification(Classification::Llm))
            .await
            .unwrap();
        p.sanitize(
            &json!("x"),
            &SanitizeOptions::new()
                .classification(Classification::Llm)
                .risk(RiskLevel::Low, 0.5),
        )
        .await
        .unwrap();

        let mapped: Vec<_> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                AuditEvent::RiskAssessment(r) => Some(r.mapped_risk_level),
                _ => None,
            })
            .collect();
        assert_eq!(mapped, vec![Some(RiskLevel::High), None]);
    }

    #[tokio::test]
    async fn test_processing_record_contents() {
        let sink = Arc::new(MemoryAuditSink::new());
        let p = pipeline_with(sink.clone());
        p.sanitize(&json!("ab!"), &SanitizeOptions::new().operation(Operation::Response))
            .await
            .unwrap();

        let record = &sink.processing_records()[0];
        assert_eq!(record.input_length, 3);
        assert_eq!(record.output_length, 2);
        assert_eq!(record.rules_applied, p.rules());
        assert_eq!(record.mode, SanitizeMode::Final);
        assert_eq!(record.operation, Operation::Response);
        assert!(!record.token_minted);
        assert!(record.presented_token.is_none());
    }

    #[tokio::test]
    async fn test_structured_input_hash_uses_value_hash() {
        let sink = Arc::new(MemoryAuditSink::new());
        let p = pipeline_with(sink.clone());
        let input = json!({"b": [1, "x!"], "a": null});
        p.sanitize(&input, &SanitizeOptions::default()).await.unwrap();

        let record = &sink.processing_records()[0];
        assert_eq!(record.input_hash, value_hash(&input));
        assert!(!record.input_hash.placeholder);
        assert_eq!(record.input_hash.hash, content_hash(r#"{"b":[1,"x!"],"a":null}"#));
    }

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn log_risk_assessment_decision<'a>(
            &'a self,
            _: &'a RiskAssessmentRecord,
        ) -> AuditFuture<'a> {
            Box::pin(async { Err(AuditError::Unavailable("down".into())) })
        }
        fn log_high_risk_case<'a>(&'a self, _: &'a RiskCaseRecord) -> AuditFuture<'a> {
            Box::pin(async { Err(AuditError::Unavailable("down".into())) })
        }
        fn log_unknown_risk_case<'a>(&'a self, _: &'a RiskCaseRecord) -> AuditFuture<'a> {
            Box::pin(async { Err(AuditError::Unavailable("down".into())) })
        }
        fn log_high_fidelity_data_collection<'a>(
            &'a self,
            _: &'a ProcessingRecord,
        ) -> AuditFuture<'a> {
            Box::pin(async { Err(AuditError::Unavailable("down".into())) })
        }
        fn log_escalation_decision<'a>(&'a self, _: &'a EscalationRecord) -> AuditFuture<'a> {
            Box::pin(async { Err(AuditError::Unavailable("down".into())) })
        }
        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_audit_failures_swallowed() {
        let p = pipeline_with(Arc::new(FailingSink));
        let out = p
            .sanitize(&json!("fine!"), &SanitizeOptions::default())
            .await
            .unwrap();
        assert_eq!(out.into_value(), json!("fine"));
        // risk assessment, unknown risk, high fidelity
        assert_eq!(p.stats().audit_failures(), 3);
    }

    #[tokio::test]
    async fn test_hook_failures_swallowed() {
        let p = SanitizationPipeline::builder()
            .hook(Arc::new(ShapeHook {
                max_collection_len: 1,
            }))
            .build();
        let out = p
            .sanitize(&json!(["a!", "b!"]), &SanitizeOptions::default())
            .await
            .unwrap();
        assert_eq!(out.into_value(), json!(["a", "b"]));
        assert_eq!(p.stats().hook_failures(), 2);
    }

    #[tokio::test]
    async fn test_invalid_presented_token_does_not_change_output() {
        let p = pipeline();
        let bogus = TrustToken {
            content_hash: "x".into(),
            ..TrustToken::default()
        };
        let plain = p
            .sanitize(&json!("a <script>b</script>!"), &SanitizeOptions::default())
            .await
            .unwrap();
        let presented = p
            .sanitize(
                &json!("a <script>b</script>!"),
                &SanitizeOptions::new().presenting(bogus),
            )
            .await
            .unwrap();
        assert_eq!(plain, presented);
        assert_eq!(p.stats().tokens_rejected(), 1);
    }

    #[test]
    fn test_sanitize_text_and_rules() {
        let p = pipeline();
        assert_eq!(p.sanitize_text("Call 555-123-4567!").unwrap(), "Call PHONE_REDACTED");
        assert_eq!(
            p.rules(),
            [
                "unicode-normalization",
                "symbol-stripping",
                "escape-neutralization",
                "pattern-redaction"
            ]
        );
    }

    #[test]
    fn test_from_config_requires_secret_when_enabled() {
        let mut config = Config::default();
        config.trust_token.secret = Some("configured-secret-0123456789".into());
        assert!(SanitizationPipeline::from_config(&config, Arc::new(NoopAuditSink))
            .unwrap()
            .trust_tokens()
            .is_some());

        config.trust_token.enabled = false;
        config.trust_token.secret = None;
        assert!(SanitizationPipeline::from_config(&config, Arc::new(NoopAuditSink))
            .unwrap()
            .trust_tokens()
            .is_none());
    }
}
