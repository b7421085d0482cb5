pub mod render;

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::types::{CheckOutcome, Severity};

#[derive(Debug, Default)]
struct Buckets {
    failures: Vec<CheckOutcome>,
    warnings: Vec<CheckOutcome>,
    successes: Vec<CheckOutcome>,
    infos: Vec<CheckOutcome>,
}

impl Buckets {
    fn bucket_mut(&mut self, severity: Severity) -> &mut Vec<CheckOutcome> {
        match severity {
            Severity::Failure => &mut self.failures,
            Severity::Warning => &mut self.warnings,
            Severity::Success => &mut self.successes,
            Severity::Info => &mut self.infos,
        }
    }
}

/// Report sink for one run. Checks push outcomes in; `summarize` reads a snapshot out.
#[derive(Debug)]
pub struct ResultClassifier {
    started_at: DateTime<Utc>,
    buckets: Mutex<Buckets>,
}

impl Default for ResultClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultClassifier {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            buckets: Mutex::new(Buckets::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Buckets> {
        // a panicking writer cannot leave a bucket half-pushed
        self.buckets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn ingest(&self, outcome: CheckOutcome) {
        match outcome.severity {
            Severity::Failure | Severity::Warning => warn!(
                cluster = %outcome.cluster,
                check = %outcome.check,
                "{} {}",
                outcome.severity.tag(),
                outcome.message
            ),
            Severity::Success | Severity::Info => info!(
                cluster = %outcome.cluster,
                check = %outcome.check,
                "{} {}",
                outcome.severity.tag(),
                outcome.message
            ),
        }
        self.lock().bucket_mut(outcome.severity).push(outcome);
    }

    pub fn ingest_all(&self, outcomes: impl IntoIterator<Item = CheckOutcome>) {
        for outcome in outcomes {
            self.ingest(outcome);
        }
    }

    pub fn total(&self) -> usize {
        let buckets = self.lock();
        buckets.failures.len() + buckets.warnings.len() + buckets.successes.len()
    }

    /// Snapshot of everything ingested so far, stamped with the current time.
    pub fn summarize(&self) -> RunReport {
        let buckets = self.lock();
        RunReport {
            started_at: self.started_at,
            completed_at: Utc::now(),
            failures: buckets.failures.clone(),
            warnings: buckets.warnings.clone(),
            successes: buckets.successes.clone(),
            infos: buckets.infos.clone(),
        }
    }
}

/// Classified outcome of one complete inspection run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub failures: Vec<CheckOutcome>,
    pub warnings: Vec<CheckOutcome>,
    pub successes: Vec<CheckOutcome>,
    pub infos: Vec<CheckOutcome>,
}

impl RunReport {
    pub fn outcomes(&self, severity: Severity) -> &[CheckOutcome] {
        match severity {
            Severity::Failure => &self.failures,
            Severity::Warning => &self.warnings,
            Severity::Success => &self.successes,
            Severity::Info => &self.infos,
        }
    }

    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.outcomes(severity)
            .iter()
            .map(|o| format!("{}: {}", o.cluster, o.message))
            .collect()
    }

    pub fn total(&self) -> usize {
        self.failures.len() + self.warnings.len() + self.successes.len()
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            failures: self.failures.len(),
            warnings: self.warnings.len(),
            successes: self.successes.len(),
            infos: self.infos.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub failures: usize,
    pub warnings: usize,
    pub successes: usize,
    pub infos: usize,
}

impl ReportSummary {
    pub fn total(&self) -> usize {
        self.failures + self.warnings + self.successes
    }

    pub fn has_issues(&self) -> bool {
        self.failures > 0 || self.warnings > 0
    }

    /// Share of the total per severity, `None` when nothing was counted.
    pub fn relative(&self) -> Option<(f64, f64, f64)> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let t = total as f64;
        Some((
            self.failures as f64 / t,
            self.warnings as f64 / t,
            self.successes as f64 / t,
        ))
    }
}

/// Most recently completed report, swapped as a whole.
#[derive(Debug, Clone, Default)]
pub struct LatestReport {
    inner: Arc<RwLock<Option<Arc<RunReport>>>>,
}

impl LatestReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, report: RunReport) {
        *self.inner.write().await = Some(Arc::new(report));
    }

    pub async fn current(&self) -> Option<Arc<RunReport>> {
        self.inner.read().await.clone()
    }
}
