use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use crate::core::{Finding, Severity, Termination};
use crate::engine::{RunOutcome, StepRecord};

#[derive(Debug, Serialize)]
struct RunLog<'a> {
    schema_version: &'static str,
    tool_version: &'a str,
    command: &'a str,
    started_at: String,
    finished_at: String,
    duration_ms: u128,
    status: &'static str,
    termination: Termination,
    steps: &'a [StepRecord],
    findings: &'a [Finding],
    summary: FindingSummary,
}

#[derive(Debug, Default, Serialize)]
struct FindingSummary {
    info: usize,
    warning: usize,
    danger: usize,
}

pub fn logs_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/rebel/logs")
}

pub fn write_run_log(home_dir: &Path, command: &str, outcome: &RunOutcome) -> Result<PathBuf> {
    let dir = logs_dir(home_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("ログディレクトリの作成に失敗しました: {}", dir.display()))?;

    let pid = std::process::id();
    let ts = outcome.ended_at.unix_timestamp_nanos();
    let path = dir.join(format!("{command}-{pid}-{ts}.json"));

    let mut summary = FindingSummary::default();
    for f in &outcome.report.findings {
        match f.severity {
            Severity::Info => summary.info += 1,
            Severity::Warning => summary.warning += 1,
            Severity::Danger => summary.danger += 1,
        }
    }

    let failed = outcome
        .steps
        .iter()
        .any(|s| matches!(s.status, crate::engine::StepStatus::Failed { .. }));
    let status = match (outcome.termination(), failed) {
        (Termination::Completed, false) => "ok",
        (Termination::Completed, true) => "partial_error",
        (Termination::Cancelled, _) => "cancelled",
        (Termination::Failed, _) => "error",
    };

    let log = RunLog {
        schema_version: "1.0",
        tool_version: &outcome.report.tool_version,
        command,
        started_at: outcome
            .started_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string()),
        finished_at: outcome
            .ended_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string()),
        duration_ms: outcome.duration().as_millis(),
        status,
        termination: outcome.termination(),
        steps: &outcome.steps,
        findings: &outcome.report.findings,
        summary,
    };

    let buf = serde_json::to_vec_pretty(&log).context("ログ(JSON)のシリアライズに失敗しました")?;
    std::fs::write(&path, buf)
        .with_context(|| format!("ログの書き込みに失敗しました: {}", path.display()))?;
    Ok(path)
}
