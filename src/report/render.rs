//! Presentation of a `RunReport`: prose, JSON summary and one-line status.
//! Nothing here feeds back into classification.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::RunReport;
use crate::types::Severity;

pub const NOT_YET_RUN: &str = "not yet run";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Completed,
    NotYetRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeveritySection {
    pub description: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeverityShares {
    pub fails: f64,
    pub warnings: f64,
    pub success: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeverityCounts {
    pub fails: usize,
    pub warnings: usize,
    pub success: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Totals {
    pub total: usize,
    pub relative: Option<SeverityShares>,
    pub absolute: SeverityCounts,
}

/// Machine-readable summary served at `/v1/summarize`.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub environment: Option<String>,
    pub time: DateTime<Utc>,
    pub state: RunState,
    pub message: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub fails: Option<SeveritySection>,
    pub warnings: Option<SeveritySection>,
    pub success: Option<SeveritySection>,
    pub summarize: Option<Totals>,
}

fn section(report: &RunReport, severity: Severity) -> SeveritySection {
    let description = report.messages(severity);
    SeveritySection { count: description.len(), description }
}

pub fn build_summary_response(environment: Option<&str>, report: Option<&RunReport>) -> SummaryResponse {
    let environment = environment.map(str::to_string);
    let Some(report) = report else {
        return SummaryResponse {
            environment,
            time: Utc::now(),
            state: RunState::NotYetRun,
            message: Some(NOT_YET_RUN.to_string()),
            last_run: None,
            duration_seconds: None,
            fails: None,
            warnings: None,
            success: None,
            summarize: None,
        };
    };

    let summary = report.summary();
    let relative = summary.relative().map(|(fails, warnings, success)| SeverityShares {
        fails,
        warnings,
        success,
    });

    SummaryResponse {
        environment,
        time: Utc::now(),
        state: RunState::Completed,
        message: None,
        last_run: Some(report.completed_at),
        duration_seconds: Some(report.duration_seconds()),
        fails: Some(section(report, Severity::Failure)),
        warnings: Some(section(report, Severity::Warning)),
        success: Some(section(report, Severity::Success)),
        summarize: Some(Totals {
            total: summary.total(),
            relative,
            absolute: SeverityCounts {
                fails: summary.failures,
                warnings: summary.warnings,
                success: summary.successes,
            },
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusInfo {
    pub healthy: bool,
    pub info: String,
}

pub fn build_status(report: Option<&RunReport>) -> StatusInfo {
    let Some(report) = report else {
        return StatusInfo {
            healthy: false,
            info: format!("UNHEALTHY: inspection has {}", NOT_YET_RUN),
        };
    };

    if !report.failures.is_empty() {
        StatusInfo {
            healthy: false,
            info: format!("FAILED: inspection has failed: {:?}", report.messages(Severity::Failure)),
        }
    } else if !report.warnings.is_empty() {
        StatusInfo {
            healthy: false,
            info: format!("WARNING: inspection raised warnings: {:?}", report.messages(Severity::Warning)),
        }
    } else {
        StatusInfo {
            healthy: true,
            info: "HEALTHY: inspection completed successfully".to_string(),
        }
    }
}

fn pct(share: f64) -> String {
    format!("{:.2}%", share * 100.0)
}

/// Human-readable page served at `/` and `/summarize`.
pub fn render_text(environment: Option<&str>, report: Option<&RunReport>) -> String {
    let title = match environment {
        Some(env) => format!("Fleet inspection - {}", env),
        None => "Fleet inspection".to_string(),
    };
    let Some(report) = report else {
        return format!("{}\n\nStatus: {}\n", title, NOT_YET_RUN);
    };

    let summary = report.summary();
    let mut lines = vec![
        title,
        String::new(),
        format!(
            "Last run: {} ({:.1}s)",
            report.completed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            report.duration_seconds()
        ),
    ];
    match summary.relative() {
        Some((f, w, s)) => lines.push(format!(
            "Checks: {} total | {} failed ({}) | {} warned ({}) | {} passed ({})",
            summary.total(),
            summary.failures,
            pct(f),
            summary.warnings,
            pct(w),
            summary.successes,
            pct(s)
        )),
        None => lines.push("Checks: 0 total".to_string()),
    }

    for (heading, severity) in [("Failures", Severity::Failure), ("Warnings", Severity::Warning)] {
        let outcomes = report.outcomes(severity);
        if outcomes.is_empty() {
            continue;
        }
        lines.push(String::new());
        lines.push(format!("{}:", heading));
        for o in outcomes {
            lines.push(format!("• {} [{}] {}", o.cluster, o.check, o.message));
        }
    }

    lines.push(String::new());
    lines.join("\n")
}

/// Console summary table logged after every run.
pub fn summary_table(report: &RunReport) -> String {
    let summary = report.summary();
    let rule = "-".repeat(28);
    [
        "*".repeat(28),
        "Summary".to_string(),
        rule.clone(),
        format!("checks failed\t\t|{:3}", summary.failures),
        format!("checks warned\t\t|{:3}", summary.warnings),
        format!("checks succeeded\t|{:3}", summary.successes),
        rule,
        format!("total checks\t\t|{:3}", summary.total()),
        format!("ran {}", report.completed_at.format("%a, %d.%m.%y %H:%M:%S")),
        "*".repeat(28),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ResultClassifier;
    use crate::types::CheckOutcome;

    fn sample_report() -> RunReport {
        let classifier = ResultClassifier::new();
        classifier.ingest(CheckOutcome::failure("prod", "canal-scaling", "Desired: 3 | Available: 2"));
        classifier.ingest(CheckOutcome::warning("prod", "istiod-logs", "has failed istiod logs"));
        classifier.ingest(CheckOutcome::success("dev", "node-health", "passed node inspection"));
        classifier.ingest(CheckOutcome::success("dev", "canal-scaling", "passed scaling"));
        classifier.summarize()
    }

    #[test]
    fn test_not_yet_run_is_explicit() {
        let response = build_summary_response(Some("staging"), None);
        assert_eq!(response.state, RunState::NotYetRun);
        assert_eq!(response.message.as_deref(), Some(NOT_YET_RUN));
        assert!(response.summarize.is_none());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["state"], "not_yet_run");
        assert!(json["fails"].is_null());

        let status = build_status(None);
        assert!(!status.healthy);
        assert!(status.info.contains(NOT_YET_RUN));

        assert!(render_text(None, None).contains(NOT_YET_RUN));
    }

    #[test]
    fn test_summary_response_counts() {
        let report = sample_report();
        let response = build_summary_response(None, Some(&report));
        assert_eq!(response.state, RunState::Completed);

        let totals = response.summarize.unwrap();
        assert_eq!(totals.total, 4);
        assert_eq!(totals.absolute.fails, 1);
        assert_eq!(totals.absolute.success, 2);
        let relative = totals.relative.unwrap();
        assert_eq!(relative.success, 0.5);

        let fails = response.fails.unwrap();
        assert_eq!(fails.count, 1);
        assert_eq!(fails.description[0], "prod: Desired: 3 | Available: 2");
    }

    #[test]
    fn test_status_prefers_failures() {
        let report = sample_report();
        let status = build_status(Some(&report));
        assert!(!status.healthy);
        assert!(status.info.starts_with("FAILED"));

        let classifier = ResultClassifier::new();
        classifier.ingest(CheckOutcome::warning("prod", "x", "slow"));
        let status = build_status(Some(&classifier.summarize()));
        assert!(status.info.starts_with("WARNING"));

        let classifier = ResultClassifier::new();
        classifier.ingest(CheckOutcome::success("prod", "x", "fine"));
        let status = build_status(Some(&classifier.summarize()));
        assert!(status.healthy);
    }

    #[test]
    fn test_render_text_lists_issues() {
        let text = render_text(Some("prod-fleet"), Some(&sample_report()));
        assert!(text.contains("Fleet inspection - prod-fleet"));
        assert!(text.contains("4 total"));
        assert!(text.contains("25.00%"));
        assert!(text.contains("• prod [canal-scaling] Desired: 3 | Available: 2"));
        assert!(text.contains("Warnings:"));
        assert!(!text.contains("passed node inspection"));
    }

    #[test]
    fn test_summary_table() {
        let table = summary_table(&sample_report());
        assert!(table.contains("checks failed\t\t|  1"));
        assert!(table.contains("total checks\t\t|  4"));
    }
}
