use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::rules::Thresholds;

pub const DEFAULT_BASE_URL: &str = "http://www.getrebel.com";
pub const DEFAULT_ARTICLES_URL: &str = "http://www.getrebel.com/articles";

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub ui: UiConfig,
    pub remote: RemoteConfig,
    pub checks: ChecksConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiConfig {
    pub color: bool,
    pub max_table_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub articles_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChecksConfig {
    pub memory_free_threshold_percent: f64,
    pub min_total_memory_kib: u64,
    pub min_free_disk_bytes: u64,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            ui: UiConfig {
                color: true,
                max_table_rows: 50,
            },
            remote: RemoteConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                timeout_secs: 10,
                articles_url: DEFAULT_ARTICLES_URL.to_string(),
            },
            checks: ChecksConfig {
                memory_free_threshold_percent: thresholds.memory_free_percent,
                min_total_memory_kib: thresholds.min_total_memory_kib,
                min_free_disk_bytes: thresholds.min_free_disk_bytes,
            },
            config_path: None,
        }
    }
}

impl EffectiveConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            memory_free_percent: self.checks.memory_free_threshold_percent,
            min_total_memory_kib: self.checks.min_total_memory_kib,
            min_free_disk_bytes: self.checks.min_free_disk_bytes,
        }
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    ui: Option<RawUiConfig>,
    remote: Option<RawRemoteConfig>,
    checks: Option<RawChecksConfig>,
}

#[derive(Debug, Deserialize)]
struct RawUiConfig {
    color: Option<bool>,
    max_table_rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawRemoteConfig {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    articles_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChecksConfig {
    memory_free_threshold_percent: Option<f64>,
    min_total_memory_kib: Option<u64>,
    min_free_disk_bytes: Option<u64>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/rebel/config.toml")
}

pub fn resolve_config_path(explicit: Option<&Path>, home_dir: &Path) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    match std::env::var_os("REBEL_CONFIG") {
        Some(p) if !p.is_empty() => PathBuf::from(p),
        _ => default_config_path(home_dir),
    }
}

pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();
    let path = resolve_config_path(config_path, home_dir);

    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("設定ファイルの読み取りに失敗しました: {}", path.display()))?;
        let raw: RawConfig =
            toml::from_str(&s).context("設定ファイル(TOML)の解析に失敗しました")?;
        apply_raw_config(&mut cfg, raw);
        cfg.config_path = Some(path.display().to_string());
    }

    apply_env_overrides(&mut cfg)?;
    validate(&cfg)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(ui) = raw.ui {
        if let Some(color) = ui.color {
            cfg.ui.color = color;
        }
        if let Some(max_table_rows) = ui.max_table_rows {
            cfg.ui.max_table_rows = max_table_rows;
        }
    }

    if let Some(remote) = raw.remote {
        if let Some(base_url) = remote.base_url {
            cfg.remote.base_url = base_url;
        }
        if let Some(timeout_secs) = remote.timeout_secs {
            cfg.remote.timeout_secs = timeout_secs;
        }
        if let Some(articles_url) = remote.articles_url {
            cfg.remote.articles_url = articles_url;
        }
    }

    if let Some(checks) = raw.checks {
        if let Some(pct) = checks.memory_free_threshold_percent {
            cfg.checks.memory_free_threshold_percent = pct;
        }
        if let Some(kib) = checks.min_total_memory_kib {
            cfg.checks.min_total_memory_kib = kib;
        }
        if let Some(bytes) = checks.min_free_disk_bytes {
            cfg.checks.min_free_disk_bytes = bytes;
        }
    }
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Ok(v) = std::env::var("REBEL_UI_COLOR") {
        cfg.ui.color = parse_bool(&v).with_context(|| "REBEL_UI_COLOR")?;
    }
    if let Ok(v) = std::env::var("REBEL_UI_MAX_TABLE_ROWS") {
        cfg.ui.max_table_rows = v
            .trim()
            .parse::<usize>()
            .with_context(|| "REBEL_UI_MAX_TABLE_ROWS")?;
    }
    if let Ok(v) = std::env::var("REBEL_REMOTE_BASE_URL") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.remote.base_url = v.to_string();
        }
    }
    if let Ok(v) = std::env::var("REBEL_REMOTE_TIMEOUT_SECS") {
        cfg.remote.timeout_secs = v
            .trim()
            .parse::<u64>()
            .with_context(|| "REBEL_REMOTE_TIMEOUT_SECS")?;
    }
    if let Ok(v) = std::env::var("REBEL_REMOTE_ARTICLES_URL") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.remote.articles_url = v.to_string();
        }
    }
    if let Ok(v) = std::env::var("REBEL_CHECKS_MEMORY_FREE_THRESHOLD_PERCENT") {
        cfg.checks.memory_free_threshold_percent = v
            .trim()
            .parse::<f64>()
            .with_context(|| "REBEL_CHECKS_MEMORY_FREE_THRESHOLD_PERCENT")?;
    }
    if let Ok(v) = std::env::var("REBEL_CHECKS_MIN_TOTAL_MEMORY_KIB") {
        cfg.checks.min_total_memory_kib = v
            .trim()
            .parse::<u64>()
            .with_context(|| "REBEL_CHECKS_MIN_TOTAL_MEMORY_KIB")?;
    }
    if let Ok(v) = std::env::var("REBEL_CHECKS_MIN_FREE_DISK_BYTES") {
        cfg.checks.min_free_disk_bytes = v
            .trim()
            .parse::<u64>()
            .with_context(|| "REBEL_CHECKS_MIN_FREE_DISK_BYTES")?;
    }

    Ok(())
}

fn validate(cfg: &EffectiveConfig) -> Result<()> {
    let pct = cfg.checks.memory_free_threshold_percent;
    if !(0.0..=100.0).contains(&pct) {
        return Err(anyhow::anyhow!(
            "memory_free_threshold_percent は 0〜100 の範囲で指定してください: {pct}"
        ));
    }
    if cfg.remote.timeout_secs == 0 {
        return Err(anyhow::anyhow!("timeout_secs は 1 以上を指定してください"));
    }
    Ok(())
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "真偽値が不正です: {s}（true|false|1|0|yes|no|on|off を指定してください）"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_thresholds() {
        let cfg = EffectiveConfig::default();
        let t = cfg.thresholds();
        assert_eq!(t.memory_free_percent, 70.0);
        assert_eq!(t.min_total_memory_kib, 1_835_008);
        assert_eq!(t.min_free_disk_bytes, 3 * 1024 * 1024 * 1024);
        assert_eq!(cfg.remote.base_url, "http://www.getrebel.com");
        assert_eq!(cfg.remote_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn raw_config_overrides_only_present_keys() {
        let raw: RawConfig = toml::from_str(
            r#"
[remote]
base_url = "http://127.0.0.1:9"

[checks]
memory_free_threshold_percent = 55.5
"#,
        )
        .expect("parse");
        let mut cfg = EffectiveConfig::default();
        apply_raw_config(&mut cfg, raw);
        assert_eq!(cfg.remote.base_url, "http://127.0.0.1:9");
        assert_eq!(cfg.remote.timeout_secs, 10);
        assert_eq!(cfg.checks.memory_free_threshold_percent, 55.5);
        assert_eq!(cfg.checks.min_total_memory_kib, 1_835_008);
        assert!(cfg.ui.color);
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool(" Yes ").expect("yes"));
        assert!(!parse_bool("off").expect("off"));
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut cfg = EffectiveConfig::default();
        cfg.checks.memory_free_threshold_percent = 120.0;
        assert!(validate(&cfg).is_err());
        cfg.checks.memory_free_threshold_percent = 70.0;
        cfg.remote.timeout_secs = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn explicit_config_path_wins() {
        let home = Path::new("/home/someone");
        let explicit = Path::new("/tmp/custom.toml");
        assert_eq!(resolve_config_path(Some(explicit), home), explicit);
    }
}
