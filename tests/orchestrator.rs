use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rebel::core::{GraylistRule, Severity, Termination, VersionRecord, remediation};
use rebel::engine::{
    CANCELLED_PERCENT, CancelToken, Orchestrator, OrchestratorError, Phase, Plan, ProgressEvent,
    RunEvent, StepKind, StepStatus,
};
use rebel::oracle::RemoteOracle;
use rebel::probe::{MemoryStats, OsProbe, ProbeError, ProductKey};
use rebel::rules::Thresholds;

#[derive(Default)]
struct FakeProbe {
    calls: Mutex<Vec<&'static str>>,
    failing: Vec<&'static str>,
    panicking: Vec<&'static str>,
    cancel_after: Option<(&'static str, CancelToken)>,
    gate: Option<Mutex<mpsc::Receiver<()>>>,
    memory: Option<MemoryStats>,
    disk_free: u64,
    versions: HashMap<&'static str, Vec<String>>,
    apps: Vec<String>,
}

impl FakeProbe {
    fn healthy() -> Self {
        Self {
            memory: Some(MemoryStats {
                total_kib: 16 * 1024 * 1024,
                free_kib: 12 * 1024 * 1024,
            }),
            disk_free: 100 * 1024 * 1024 * 1024,
            ..Self::default()
        }
    }

    fn step(&self, name: &'static str) -> Result<(), ProbeError> {
        if let Some(gate) = &self.gate {
            if name == "empty_trash" {
                let _ = gate.lock().expect("gate").recv();
            }
        }
        self.calls.lock().expect("calls").push(name);
        if let Some((after, token)) = &self.cancel_after {
            if *after == name {
                token.cancel();
            }
        }
        if self.panicking.contains(&name) {
            panic!("{name} exploded");
        }
        if self.failing.contains(&name) {
            return Err(ProbeError::Unavailable("fake"));
        }
        Ok(())
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("calls").clone()
    }
}

impl OsProbe for FakeProbe {
    fn empty_trash(&self) -> Result<(), ProbeError> {
        self.step("empty_trash")
    }
    fn clear_update_download_cache(&self) -> Result<(), ProbeError> {
        self.step("clear_update_download_cache")
    }
    fn clear_prefetch_cache(&self) -> Result<(), ProbeError> {
        self.step("clear_prefetch_cache")
    }
    fn flush_dns_cache(&self) -> Result<(), ProbeError> {
        self.step("flush_dns_cache")
    }
    fn clear_thumbnail_caches(&self) -> Result<(), ProbeError> {
        self.step("clear_thumbnail_caches")
    }
    fn clear_system_temp_files(&self) -> Result<(), ProbeError> {
        self.step("clear_system_temp_files")
    }
    fn clear_user_temp_files(&self) -> Result<(), ProbeError> {
        self.step("clear_user_temp_files")
    }

    fn memory_stats(&self) -> Result<MemoryStats, ProbeError> {
        self.memory.ok_or(ProbeError::Unavailable("memory"))
    }
    fn system_disk_free_bytes(&self) -> Result<u64, ProbeError> {
        Ok(self.disk_free)
    }
    fn installed_versions(&self, product: ProductKey) -> Result<Vec<String>, ProbeError> {
        Ok(self
            .versions
            .get(product.remote_name())
            .cloned()
            .unwrap_or_default())
    }
    fn installed_applications(&self) -> Result<Vec<String>, ProbeError> {
        Ok(self.apps.clone())
    }
    fn own_version(&self) -> String {
        "1.0.0".to_string()
    }
}

#[derive(Default)]
struct FakeOracle {
    versions: HashMap<&'static str, &'static str>,
    graylist: Option<Vec<GraylistRule>>,
}

impl RemoteOracle for FakeOracle {
    fn latest_version(&self, product: &str) -> Option<VersionRecord> {
        self.versions.get(product).map(|v| VersionRecord::new(*v))
    }
    fn graylist(&self) -> Option<Vec<GraylistRule>> {
        self.graylist.clone()
    }
}

fn orchestrator(probe: Arc<FakeProbe>, oracle: FakeOracle) -> Orchestrator {
    Orchestrator::new(probe, Arc::new(oracle), Thresholds::default())
}

fn run_collect(
    orch: &Orchestrator,
    plan: &Plan,
    cancel: &CancelToken,
) -> (rebel::engine::RunOutcome, Vec<ProgressEvent>) {
    let mut events = Vec::new();
    let outcome = orch
        .run(plan, cancel, &mut |ev| events.push(ev))
        .expect("run");
    (outcome, events)
}

#[test]
fn full_run_reports_strictly_increasing_progress_ending_at_100() {
    let probe = Arc::new(FakeProbe::healthy());
    let orch = orchestrator(Arc::clone(&probe), FakeOracle::default());

    let (outcome, events) = run_collect(&orch, &Plan::full(), &CancelToken::new());

    assert_eq!(outcome.termination(), Termination::Completed);
    let percents: Vec<u8> = events.iter().map(|e| e.percent).collect();
    assert_eq!(percents.len(), Plan::full().steps().len());
    assert!(percents.windows(2).all(|w| w[0] < w[1]), "{percents:?}");
    assert_eq!(percents.last(), Some(&100));
    assert_eq!(events[0].label, StepKind::EmptyTrash.label());

    assert_eq!(
        probe.calls(),
        vec![
            "empty_trash",
            "clear_update_download_cache",
            "clear_prefetch_cache",
            "flush_dns_cache",
            "clear_thumbnail_caches",
            "clear_system_temp_files",
            "clear_user_temp_files",
        ]
    );

    // One Info finding per maintenance step and nothing else on a healthy box.
    assert_eq!(outcome.report.findings.len(), 7);
    assert!(
        outcome
            .report
            .findings
            .iter()
            .all(|f| f.severity == Severity::Info && f.remediation_code.is_none())
    );
    assert!(!outcome.report.started_at.is_empty());
    assert!(outcome.ended_at >= outcome.started_at);
}

#[test]
fn cancelled_before_first_step_yields_no_findings() {
    let probe = Arc::new(FakeProbe::healthy());
    let orch = orchestrator(Arc::clone(&probe), FakeOracle::default());
    let cancel = CancelToken::new();
    cancel.cancel();
    cancel.cancel();

    let (outcome, events) = run_collect(&orch, &Plan::full(), &cancel);

    assert_eq!(outcome.termination(), Termination::Cancelled);
    assert!(outcome.report.findings.is_empty());
    assert!(probe.calls().is_empty());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].percent, CANCELLED_PERCENT);
}

#[test]
fn cancellation_takes_effect_at_next_step_boundary() {
    let cancel = CancelToken::new();
    let probe = Arc::new(FakeProbe {
        cancel_after: Some(("flush_dns_cache", cancel.clone())),
        ..FakeProbe::healthy()
    });
    let orch = orchestrator(Arc::clone(&probe), FakeOracle::default());

    let (outcome, events) = run_collect(&orch, &Plan::full(), &cancel);

    assert_eq!(outcome.termination(), Termination::Cancelled);
    assert_eq!(probe.calls().last(), Some(&"flush_dns_cache"));
    assert_eq!(probe.calls().len(), 4);
    assert_eq!(events.last().map(|e| e.percent), Some(CANCELLED_PERCENT));
}

#[test]
fn failing_step_adds_no_finding_and_run_continues() {
    let probe = Arc::new(FakeProbe {
        failing: vec!["flush_dns_cache"],
        panicking: vec!["clear_prefetch_cache"],
        ..FakeProbe::healthy()
    });
    let orch = orchestrator(Arc::clone(&probe), FakeOracle::default());

    let (outcome, events) = run_collect(&orch, &Plan::full(), &CancelToken::new());

    assert_eq!(outcome.termination(), Termination::Completed);
    assert_eq!(events.last().map(|e| e.percent), Some(100));
    assert_eq!(outcome.report.findings.len(), 5);
    assert!(
        !outcome
            .report
            .findings
            .iter()
            .any(|f| f.message.contains("DNS"))
    );
    let failed: Vec<StepKind> = outcome
        .steps
        .iter()
        .filter(|s| matches!(s.status, StepStatus::Failed { .. }))
        .map(|s| s.step)
        .collect();
    assert_eq!(failed, vec![StepKind::ClearPrefetch, StepKind::FlushDns]);
    assert_eq!(probe.calls().len(), 7);
}

#[test]
fn repeated_runs_are_idempotent() {
    let probe = Arc::new(FakeProbe::healthy());
    let orch = orchestrator(Arc::clone(&probe), FakeOracle::default());

    let (first, _) = run_collect(&orch, &Plan::full(), &CancelToken::new());
    let (second, _) = run_collect(&orch, &Plan::full(), &CancelToken::new());

    assert_eq!(first.report.findings, second.report.findings);
    assert_eq!(orch.phase(), Phase::Idle);
}

#[test]
fn diagnostics_flag_health_versions_and_graylist() {
    let mut versions = HashMap::new();
    versions.insert("java", vec!["1.8.0_301".to_string()]);
    versions.insert("reader", vec![]);
    let probe = Arc::new(FakeProbe {
        memory: Some(MemoryStats {
            total_kib: 1024 * 1024,
            free_kib: 100 * 1024,
        }),
        disk_free: 1024 * 1024 * 1024,
        versions,
        apps: vec!["Foo Toolbar 2.1".to_string(), "Editor".to_string()],
        ..FakeProbe::default()
    });
    let mut remote = HashMap::new();
    remote.insert("java", "1.8.0_401");
    remote.insert("rebel", "2.0.0");
    let oracle = FakeOracle {
        versions: remote,
        graylist: Some(vec![
            GraylistRule::contains("toolbar"),
            GraylistRule::contains("foo"),
            GraylistRule::equals("editor"),
        ]),
    };
    let orch = orchestrator(Arc::clone(&probe), oracle);

    let (outcome, _) = run_collect(&orch, &Plan::diagnostics_only(), &CancelToken::new());

    let codes: Vec<&str> = outcome
        .report
        .findings
        .iter()
        .filter_map(|f| f.remediation_code.as_deref())
        .collect();
    assert_eq!(
        codes,
        vec![
            remediation::HIGH_MEMORY_USAGE,
            remediation::LOW_PHYSICAL_MEMORY,
            remediation::LOW_FREE_SPACE,
            remediation::JAVA_OUTDATED,
            remediation::SELF_OUTDATED,
            remediation::GRAYLISTED_APPLICATION,
            remediation::GRAYLISTED_APPLICATION,
            remediation::GRAYLISTED_APPLICATION,
        ]
    );
    assert!(
        outcome
            .report
            .findings
            .iter()
            .all(|f| f.severity != Severity::Info)
    );
    assert!(probe.calls().is_empty(), "diagnostics must not clean");
}

#[test]
fn unreachable_remote_suppresses_remote_findings() {
    let mut versions = HashMap::new();
    versions.insert("java", vec!["1.6.0_20".to_string()]);
    let probe = Arc::new(FakeProbe {
        versions,
        apps: vec!["Foo Toolbar".to_string()],
        ..FakeProbe::healthy()
    });
    let orch = orchestrator(probe, FakeOracle::default());

    let (outcome, events) = run_collect(&orch, &Plan::diagnostics_only(), &CancelToken::new());

    assert_eq!(outcome.termination(), Termination::Completed);
    assert!(outcome.report.findings.is_empty());
    assert_eq!(events.last().map(|e| e.percent), Some(100));
}

#[test]
fn unreachable_remote_leaves_maintenance_findings_intact() {
    let mut versions = HashMap::new();
    versions.insert("java", vec!["1.6.0_20".to_string()]);
    let probe = Arc::new(FakeProbe {
        versions,
        apps: vec!["Foo Toolbar".to_string()],
        ..FakeProbe::healthy()
    });
    let orch = orchestrator(Arc::clone(&probe), FakeOracle::default());

    let (outcome, events) = run_collect(&orch, &Plan::full(), &CancelToken::new());

    assert_eq!(outcome.termination(), Termination::Completed);
    assert_eq!(outcome.report.findings.len(), 7);
    assert!(
        outcome
            .report
            .findings
            .iter()
            .all(|f| f.severity == Severity::Info && f.remediation_code.is_none())
    );
    assert_eq!(events.last().map(|e| e.percent), Some(100));
    assert_eq!(probe.calls().len(), 7);
}

#[test]
fn second_start_while_running_is_rejected() {
    let (release, gate) = mpsc::channel();
    let probe = Arc::new(FakeProbe {
        gate: Some(Mutex::new(gate)),
        ..FakeProbe::healthy()
    });
    let orch = orchestrator(Arc::clone(&probe), FakeOracle::default());

    let handle = orch
        .start(Plan::full(), CancelToken::new())
        .expect("first start");
    assert_eq!(orch.phase(), Phase::Running);
    assert!(matches!(
        orch.start(Plan::full(), CancelToken::new()),
        Err(OrchestratorError::AlreadyRunning)
    ));
    assert!(matches!(
        orch.run(&Plan::full(), &CancelToken::new(), &mut |_| {}),
        Err(OrchestratorError::AlreadyRunning)
    ));

    release.send(()).expect("release");
    let mut percents = Vec::new();
    let outcome = handle.wait(|ev| percents.push(ev.percent));
    assert_eq!(outcome.termination(), Termination::Completed);
    assert_eq!(percents.last(), Some(&100));
    assert_eq!(orch.phase(), Phase::Idle);

    let again = orch
        .start(Plan::diagnostics_only(), CancelToken::new())
        .expect("start after finish");
    assert_eq!(again.wait(|_| {}).termination(), Termination::Completed);
}

#[test]
fn background_run_delivers_events_over_channel() {
    let (release, gate) = mpsc::channel();
    let probe = Arc::new(FakeProbe {
        gate: Some(Mutex::new(gate)),
        ..FakeProbe::healthy()
    });
    let orch = orchestrator(probe, FakeOracle::default());
    let handle = orch
        .start(Plan::full(), CancelToken::new())
        .expect("start");

    assert!(matches!(
        handle.recv_timeout(Duration::from_millis(20)),
        Err(mpsc::RecvTimeoutError::Timeout)
    ));
    handle.cancel();
    release.send(()).expect("release");

    let mut last = None;
    let outcome = loop {
        match handle.recv_timeout(Duration::from_secs(5)).expect("event") {
            RunEvent::Progress(ev) => last = Some(ev.percent),
            RunEvent::Finished(outcome) => break handle.complete(outcome),
        }
    };
    assert_eq!(outcome.termination(), Termination::Cancelled);
    assert_eq!(last, Some(CANCELLED_PERCENT));
    assert_eq!(outcome.report.findings.len(), 1);
}
