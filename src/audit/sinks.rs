//! Built-in audit sinks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{
    AuditError, AuditEvent, AuditFuture, AuditSink, EscalationRecord, ProcessingRecord,
    RiskAssessmentRecord, RiskCaseRecord,
};

/// Emits every record as a structured `tracing` event on the
/// `trustgate::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    fn emit(event: AuditEvent) -> Result<(), AuditError> {
        let kind = event.kind();
        let record =
            serde_json::to_string(&event).map_err(|e| AuditError::Rejected(e.to_string()))?;
        match event {
            AuditEvent::HighRisk(_) | AuditEvent::Escalation(_) => {
                tracing::warn!(target: "trustgate::audit", kind, %record, "audit record");
            },
            _ => {
                tracing::info!(target: "trustgate::audit", kind, %record, "audit record");
            },
        }
        Ok(())
    }
}

impl AuditSink for TracingAuditSink {
    fn log_risk_assessment_decision<'a>(
        &'a self,
        record: &'a RiskAssessmentRecord,
    ) -> AuditFuture<'a> {
        Box::pin(async move { Self::emit(AuditEvent::RiskAssessment(record.clone())) })
    }

    fn log_high_risk_case<'a>(&'a self, record: &'a RiskCaseRecord) -> AuditFuture<'a> {
        Box::pin(async move { Self::emit(AuditEvent::HighRisk(record.clone())) })
    }

    fn log_unknown_risk_case<'a>(&'a self, record: &'a RiskCaseRecord) -> AuditFuture<'a> {
        Box::pin(async move { Self::emit(AuditEvent::UnknownRisk(record.clone())) })
    }

    fn log_high_fidelity_data_collection<'a>(
        &'a self,
        record: &'a ProcessingRecord,
    ) -> AuditFuture<'a> {
        Box::pin(async move { Self::emit(AuditEvent::HighFidelity(record.clone())) })
    }

    fn log_escalation_decision<'a>(&'a self, record: &'a EscalationRecord) -> AuditFuture<'a> {
        Box::pin(async move { Self::emit(AuditEvent::Escalation(record.clone())) })
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// Default number of records a [`MemoryAuditSink`] retains
pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

/// Keeps the most recent records in memory. Used by tests and by embedders
/// that drain records in batches. Once `capacity` records are held, each new
/// record evicts the oldest one.
#[derive(Debug)]
pub struct MemoryAuditSink {
    events: Mutex<VecDeque<AuditEvent>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }
}

impl MemoryAuditSink {
    /// Create an empty sink holding up to [`DEFAULT_MEMORY_CAPACITY`] records
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty sink holding up to `capacity` records
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| AuditError::Unavailable("event buffer poisoned".to_string()))?;
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Remove and return all held records, oldest first
    pub fn drain(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|mut events| events.drain(..).collect())
            .unwrap_or_default()
    }

    /// Snapshot of all held records, oldest first
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Records evicted because the sink was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Maximum number of records held
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of records with the given kind label
    pub fn count(&self, kind: &str) -> usize {
        self.events().iter().filter(|e| e.kind() == kind).count()
    }

    /// Escalation records only
    pub fn escalations(&self) -> Vec<EscalationRecord> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AuditEvent::Escalation(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Processing records only
    pub fn processing_records(&self) -> Vec<ProcessingRecord> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AuditEvent::HighFidelity(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Total number of records
    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// True if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn log_risk_assessment_decision<'a>(
        &'a self,
        record: &'a RiskAssessmentRecord,
    ) -> AuditFuture<'a> {
        Box::pin(async move { self.push(AuditEvent::RiskAssessment(record.clone())) })
    }

    fn log_high_risk_case<'a>(&'a self, record: &'a RiskCaseRecord) -> AuditFuture<'a> {
        Box::pin(async move { self.push(AuditEvent::HighRisk(record.clone())) })
    }

    fn log_unknown_risk_case<'a>(&'a self, record: &'a RiskCaseRecord) -> AuditFuture<'a> {
        Box::pin(async move { self.push(AuditEvent::UnknownRisk(record.clone())) })
    }

    fn log_high_fidelity_data_collection<'a>(
        &'a self,
        record: &'a ProcessingRecord,
    ) -> AuditFuture<'a> {
        Box::pin(async move { self.push(AuditEvent::HighFidelity(record.clone())) })
    }

    fn log_escalation_decision<'a>(&'a self, record: &'a EscalationRecord) -> AuditFuture<'a> {
        Box::pin(async move { self.push(AuditEvent::Escalation(record.clone())) })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn log_risk_assessment_decision<'a>(&'a self, _: &'a RiskAssessmentRecord) -> AuditFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    fn log_high_risk_case<'a>(&'a self, _: &'a RiskCaseRecord) -> AuditFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    fn log_unknown_risk_case<'a>(&'a self, _: &'a RiskCaseRecord) -> AuditFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    fn log_high_fidelity_data_collection<'a>(
        &'a self,
        _: &'a ProcessingRecord,
    ) -> AuditFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    fn log_escalation_decision<'a>(&'a self, _: &'a EscalationRecord) -> AuditFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
