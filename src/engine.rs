use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::{Finding, Report, Termination};
use crate::oracle::RemoteOracle;
use crate::platform;
use crate::probe::{OsProbe, ProbeError};
use crate::rules::{self, Thresholds};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    EmptyTrash,
    ClearUpdateCache,
    ClearPrefetch,
    FlushDns,
    ClearThumbnails,
    ClearSystemTemp,
    ClearUserTemp,
    HealthChecks,
    VersionChecks,
    GraylistCheck,
}

impl StepKind {
    pub const MAINTENANCE: [StepKind; 7] = [
        StepKind::EmptyTrash,
        StepKind::ClearUpdateCache,
        StepKind::ClearPrefetch,
        StepKind::FlushDns,
        StepKind::ClearThumbnails,
        StepKind::ClearSystemTemp,
        StepKind::ClearUserTemp,
    ];

    pub const DIAGNOSTICS: [StepKind; 3] = [
        StepKind::HealthChecks,
        StepKind::VersionChecks,
        StepKind::GraylistCheck,
    ];

    pub const fn id(self) -> &'static str {
        match self {
            StepKind::EmptyTrash => "empty-trash",
            StepKind::ClearUpdateCache => "clear-update-cache",
            StepKind::ClearPrefetch => "clear-prefetch",
            StepKind::FlushDns => "flush-dns",
            StepKind::ClearThumbnails => "clear-thumbnails",
            StepKind::ClearSystemTemp => "clear-system-temp",
            StepKind::ClearUserTemp => "clear-user-temp",
            StepKind::HealthChecks => "health-checks",
            StepKind::VersionChecks => "version-checks",
            StepKind::GraylistCheck => "graylist-check",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            StepKind::EmptyTrash => "ごみ箱",
            StepKind::ClearUpdateCache => "アップデートのダウンロードキャッシュ",
            StepKind::ClearPrefetch => "プリフェッチキャッシュ",
            StepKind::FlushDns => "DNS キャッシュ",
            StepKind::ClearThumbnails => "サムネイルキャッシュ",
            StepKind::ClearSystemTemp => "システムの一時ファイル",
            StepKind::ClearUserTemp => "ユーザーの一時ファイル",
            StepKind::HealthChecks => "システム診断",
            StepKind::VersionChecks => "バージョン確認",
            StepKind::GraylistCheck => "グレーリスト照合",
        }
    }

    fn cleared_message(self) -> Option<&'static str> {
        Some(match self {
            StepKind::EmptyTrash => "ごみ箱を空にしました",
            StepKind::ClearUpdateCache => "アップデートのダウンロードキャッシュを削除しました",
            StepKind::ClearPrefetch => "プリフェッチキャッシュを削除しました",
            StepKind::FlushDns => "DNS キャッシュをフラッシュしました",
            StepKind::ClearThumbnails => "サムネイルキャッシュを削除しました",
            StepKind::ClearSystemTemp => "システムの一時ファイルを削除しました",
            StepKind::ClearUserTemp => "ユーザーの一時ファイルを削除しました",
            StepKind::HealthChecks | StepKind::VersionChecks | StepKind::GraylistCheck => {
                return None;
            }
        })
    }

    fn execute(self, ctx: &StepContext<'_>) -> Result<Vec<Finding>, ProbeError> {
        let probe = ctx.probe;
        match self {
            StepKind::EmptyTrash => probe.empty_trash()?,
            StepKind::ClearUpdateCache => probe.clear_update_download_cache()?,
            StepKind::ClearPrefetch => probe.clear_prefetch_cache()?,
            StepKind::FlushDns => probe.flush_dns_cache()?,
            StepKind::ClearThumbnails => probe.clear_thumbnail_caches()?,
            StepKind::ClearSystemTemp => probe.clear_system_temp_files()?,
            StepKind::ClearUserTemp => probe.clear_user_temp_files()?,
            StepKind::HealthChecks => return Ok(rules::health_rules(probe, ctx.thresholds)),
            StepKind::VersionChecks => {
                let mut out = rules::version_rules(probe, ctx.oracle);
                out.extend(rules::self_version_rule(probe, ctx.oracle));
                return Ok(out);
            }
            StepKind::GraylistCheck => return Ok(rules::graylist_rules(probe, ctx.oracle)),
        }
        Ok(self.cleared_message().map(Finding::info).into_iter().collect())
    }
}

struct StepContext<'a> {
    probe: &'a dyn OsProbe,
    oracle: &'a dyn RemoteOracle,
    thresholds: &'a Thresholds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedStep {
    pub kind: StepKind,
    pub checkpoint: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    steps: Vec<PlannedStep>,
}

impl Plan {
    pub fn full() -> Self {
        let kinds: Vec<StepKind> = StepKind::MAINTENANCE
            .into_iter()
            .chain(StepKind::DIAGNOSTICS)
            .collect();
        Self::partition(&kinds)
    }

    pub fn diagnostics_only() -> Self {
        Self::partition(&StepKind::DIAGNOSTICS)
    }

    fn partition(kinds: &[StepKind]) -> Self {
        let n = kinds.len();
        let steps = kinds
            .iter()
            .enumerate()
            .map(|(i, kind)| PlannedStep {
                kind: *kind,
                checkpoint: ((i + 1) * 100 / n) as u8,
            })
            .collect();
        Self { steps }
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }
}

/// Percentage reported when a run is cancelled.
pub const CANCELLED_PERCENT: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub percent: u8,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: StepKind,
    #[serde(flatten)]
    pub status: StepStatus,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: Report,
    pub steps: Vec<StepRecord>,
    pub started_at: OffsetDateTime,
    pub ended_at: OffsetDateTime,
}

impl RunOutcome {
    pub fn termination(&self) -> Termination {
        self.report.termination
    }

    pub fn duration(&self) -> Duration {
        (self.ended_at - self.started_at)
            .try_into()
            .unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug)]
pub enum RunEvent {
    Progress(ProgressEvent),
    Finished(RunOutcome),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("すでに実行中です")]
    AlreadyRunning,
    #[error("ワーカースレッドの起動に失敗しました: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
}

/// Cooperative cancellation flag, checked between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct RunState {
    started_at: OffsetDateTime,
    progress: u8,
    findings: Vec<Finding>,
    steps: Vec<StepRecord>,
}

impl RunState {
    fn start() -> Self {
        Self {
            started_at: OffsetDateTime::now_utc(),
            progress: 0,
            findings: Vec::new(),
            steps: Vec::new(),
        }
    }

    fn advance(&mut self, percent: u8) {
        debug_assert!(percent >= self.progress);
        self.progress = percent;
    }

    fn finish(self, termination: Termination) -> RunOutcome {
        let ended_at = OffsetDateTime::now_utc();
        let report = Report {
            schema_version: "1.0".to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            os: platform::os_info(),
            started_at: format_time(self.started_at),
            ended_at: format_time(ended_at),
            termination,
            findings: self.findings,
        };
        RunOutcome {
            report,
            steps: self.steps,
            started_at: self.started_at,
            ended_at,
        }
    }
}

fn format_time(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_else(|_| "unknown".to_string())
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    probe: Arc<dyn OsProbe>,
    oracle: Arc<dyn RemoteOracle>,
    thresholds: Thresholds,
    running: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        probe: Arc<dyn OsProbe>,
        oracle: Arc<dyn RemoteOracle>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            probe,
            oracle,
            thresholds,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn phase(&self) -> Phase {
        if self.running.load(Ordering::SeqCst) {
            Phase::Running
        } else {
            Phase::Idle
        }
    }

    fn acquire(&self) -> Result<RunningGuard, OrchestratorError> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| OrchestratorError::AlreadyRunning)?;
        Ok(RunningGuard(Arc::clone(&self.running)))
    }

    pub fn run(
        &self,
        plan: &Plan,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<RunOutcome, OrchestratorError> {
        let _guard = self.acquire()?;
        Ok(self.execute(plan, cancel, on_progress))
    }

    pub fn start(&self, plan: Plan, cancel: CancelToken) -> Result<RunHandle, OrchestratorError> {
        let guard = self.acquire()?;
        let (tx, rx) = mpsc::channel::<RunEvent>();
        let this = self.clone();
        let worker_cancel = cancel.clone();
        let worker = thread::Builder::new()
            .name("rebel-run".to_string())
            .spawn(move || {
                let _guard = guard;
                let outcome = this.execute(&plan, &worker_cancel, &mut |ev| {
                    let _ = tx.send(RunEvent::Progress(ev));
                });
                let _ = tx.send(RunEvent::Finished(outcome));
            })?;
        Ok(RunHandle {
            events: rx,
            cancel,
            worker: Some(worker),
        })
    }

    fn execute(
        &self,
        plan: &Plan,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> RunOutcome {
        let ctx = StepContext {
            probe: self.probe.as_ref(),
            oracle: self.oracle.as_ref(),
            thresholds: &self.thresholds,
        };
        let mut state = RunState::start();
        tracing::debug!(steps = plan.steps().len(), "run started");

        for planned in plan.steps() {
            if cancel.is_cancelled() {
                tracing::info!(at = planned.kind.id(), "run cancelled");
                on_progress(ProgressEvent {
                    percent: CANCELLED_PERCENT,
                    label: "キャンセルしました".to_string(),
                });
                return state.finish(Termination::Cancelled);
            }

            let status = match catch_unwind(AssertUnwindSafe(|| planned.kind.execute(&ctx))) {
                Ok(Ok(findings)) => {
                    state.findings.extend(findings);
                    StepStatus::Ok
                }
                Ok(Err(err)) => {
                    tracing::warn!(step = planned.kind.id(), error = %err, "step failed");
                    StepStatus::Failed {
                        error: err.to_string(),
                    }
                }
                Err(_) => {
                    tracing::error!(step = planned.kind.id(), "step panicked");
                    StepStatus::Failed {
                        error: "panic".to_string(),
                    }
                }
            };
            state.steps.push(StepRecord {
                step: planned.kind,
                status,
            });

            state.advance(planned.checkpoint);
            on_progress(ProgressEvent {
                percent: planned.checkpoint,
                label: planned.kind.label().to_string(),
            });
        }

        tracing::debug!(findings = state.findings.len(), "run completed");
        state.finish(Termination::Completed)
    }
}

pub struct RunHandle {
    events: mpsc::Receiver<RunEvent>,
    cancel: CancelToken,
    worker: Option<thread::JoinHandle<()>>,
}

impl RunHandle {
    /// Idempotent; takes effect at the next step boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<RunEvent, mpsc::RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    pub fn wait(mut self, mut on_progress: impl FnMut(ProgressEvent)) -> RunOutcome {
        loop {
            match self.events.recv() {
                Ok(RunEvent::Progress(ev)) => on_progress(ev),
                Ok(RunEvent::Finished(outcome)) => {
                    self.join();
                    return outcome;
                }
                Err(mpsc::RecvError) => {
                    self.join();
                    return RunState::start().finish(Termination::Failed);
                }
            }
        }
    }

    pub fn complete(mut self, outcome: RunOutcome) -> RunOutcome {
        self.join();
        outcome
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}
