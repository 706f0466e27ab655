use crate::core::{Finding, GraylistRule, VersionRecord, VersionScheme, remediation};
use crate::oracle::RemoteOracle;
use crate::probe::{MemoryStats, OsProbe, ProductKey};
use crate::ui::format_bytes;

pub const SELF_PRODUCT: &str = "rebel";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub memory_free_percent: f64,
    pub min_total_memory_kib: u64,
    pub min_free_disk_bytes: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            memory_free_percent: 70.0,
            min_total_memory_kib: 1_835_008,
            min_free_disk_bytes: 3 * 1024 * 1024 * 1024,
        }
    }
}

pub fn evaluate_memory_pressure(stats: MemoryStats, t: &Thresholds) -> Option<Finding> {
    let free = stats.free_percent()?;
    if free >= t.memory_free_percent {
        return None;
    }
    Some(Finding::warning(
        format!("メモリ使用率が高い状態です（空き {free:.0}%）"),
        remediation::HIGH_MEMORY_USAGE,
    ))
}

pub fn evaluate_total_memory(stats: MemoryStats, t: &Thresholds) -> Option<Finding> {
    if stats.total_kib >= t.min_total_memory_kib {
        return None;
    }
    Some(Finding::warning(
        format!(
            "物理メモリが不足しています（搭載 {}）",
            format_bytes(stats.total_kib.saturating_mul(1024))
        ),
        remediation::LOW_PHYSICAL_MEMORY,
    ))
}

pub fn evaluate_disk_space(free_bytes: u64, t: &Thresholds) -> Option<Finding> {
    if free_bytes > t.min_free_disk_bytes {
        return None;
    }
    Some(Finding::warning(
        format!(
            "システムディスクの空き容量が不足しています（空き {}）",
            format_bytes(free_bytes)
        ),
        remediation::LOW_FREE_SPACE,
    ))
}

pub fn evaluate_outdated(
    product: ProductKey,
    installed: &[String],
    latest: Option<&VersionRecord>,
) -> Option<Finding> {
    let latest = latest?;
    let scheme = product.scheme();
    let outdated: Vec<&str> = installed
        .iter()
        .map(|v| v.trim())
        .filter(|v| scheme.is_instance(v))
        .filter(|v| scheme.is_outdated(v, &latest.name) == Some(true))
        .collect();
    if outdated.is_empty() {
        return None;
    }
    Some(Finding::danger(
        format!(
            "古い {} が検出されました（インストール済み: {} / 最新: {}）",
            product.display_name(),
            outdated.join(", "),
            latest.name.trim()
        ),
        product.remediation_code(),
    ))
}

pub fn evaluate_self_version(own: &str, latest: Option<&VersionRecord>) -> Option<Finding> {
    let latest = latest?;
    match VersionScheme::Ordered.is_outdated(own, &latest.name) {
        Some(true) => Some(Finding::warning(
            format!(
                "新しいバージョンの {SELF_PRODUCT} が公開されています（現在: {own} / 最新: {}）",
                latest.name.trim()
            ),
            remediation::SELF_OUTDATED,
        )),
        Some(false) => None,
        None => {
            tracing::warn!(own, latest = %latest.name, "version not comparable");
            None
        }
    }
}

pub fn evaluate_graylist(applications: &[String], rules: &[GraylistRule]) -> Vec<Finding> {
    let mut out = Vec::new();
    for name in applications {
        let display = name.trim();
        if display.is_empty() {
            continue;
        }
        let lowered = display.to_lowercase();
        for rule in rules {
            if rule.matches(&lowered) {
                out.push(Finding::warning(
                    format!("グレーリスト対象のアプリケーション \"{display}\" が検出されました"),
                    remediation::GRAYLISTED_APPLICATION,
                ));
            }
        }
    }
    out
}

pub fn health_rules(probe: &dyn OsProbe, t: &Thresholds) -> Vec<Finding> {
    let mut out = Vec::new();
    match probe.memory_stats() {
        Ok(stats) => {
            out.extend(evaluate_memory_pressure(stats, t));
            out.extend(evaluate_total_memory(stats, t));
        }
        Err(err) => tracing::warn!(error = %err, "memory check skipped"),
    }
    match probe.system_disk_free_bytes() {
        Ok(free) => out.extend(evaluate_disk_space(free, t)),
        Err(err) => tracing::warn!(error = %err, "disk check skipped"),
    }
    out
}

pub fn version_rules(probe: &dyn OsProbe, oracle: &dyn RemoteOracle) -> Vec<Finding> {
    let mut out = Vec::new();
    for product in ProductKey::ALL {
        let installed = match probe.installed_versions(product) {
            Ok(installed) => installed,
            Err(err) => {
                tracing::warn!(
                    product = product.remote_name(),
                    error = %err,
                    "version inventory failed"
                );
                continue;
            }
        };
        let scheme = product.scheme();
        if !installed.iter().any(|v| scheme.is_instance(v)) {
            continue;
        }
        let latest = oracle.latest_version(product.remote_name());
        out.extend(evaluate_outdated(product, &installed, latest.as_ref()));
    }
    out
}

pub fn self_version_rule(probe: &dyn OsProbe, oracle: &dyn RemoteOracle) -> Option<Finding> {
    let latest = oracle.latest_version(SELF_PRODUCT);
    evaluate_self_version(&probe.own_version(), latest.as_ref())
}

pub fn graylist_rules(probe: &dyn OsProbe, oracle: &dyn RemoteOracle) -> Vec<Finding> {
    let Some(rules) = oracle.graylist() else {
        return Vec::new();
    };
    if rules.is_empty() {
        return Vec::new();
    }
    match probe.installed_applications() {
        Ok(apps) => evaluate_graylist(&apps, &rules),
        Err(err) => {
            tracing::warn!(error = %err, "application inventory failed");
            Vec::new()
        }
    }
}
