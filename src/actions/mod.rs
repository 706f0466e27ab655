use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::platform::CleanTarget;
use crate::probe::ProbeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearError {
    pub path: PathBuf,
    pub kind: io::ErrorKind,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearOutcome {
    pub removed: Vec<PathBuf>,
    pub reclaimed_bytes: u64,
    pub skipped_missing: Vec<PathBuf>,
    pub skipped_in_use: Vec<PathBuf>,
    pub errors: Vec<ClearError>,
}

/// Entries of a shared temp directory touched this recently may belong to a
/// running program.
const SHARED_MIN_IDLE: Duration = Duration::from_secs(60 * 60);

pub fn clear_targets(targets: &[CleanTarget], dry_run: bool) -> Result<ClearOutcome, ProbeError> {
    let mut outcome = ClearOutcome::default();
    for target in targets {
        clear_target(target, dry_run, &mut outcome)?;
    }
    Ok(outcome)
}

fn clear_target(
    target: &CleanTarget,
    dry_run: bool,
    outcome: &mut ClearOutcome,
) -> Result<(), ProbeError> {
    let include = build_globset(&target.include)?;

    let entries = match std::fs::read_dir(&target.dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            outcome.skipped_missing.push(target.dir.clone());
            return Ok(());
        }
        Err(err) => return Err(ProbeError::io(&target.dir, err)),
    };

    let errors_before = outcome.errors.len();
    let now = SystemTime::now();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                outcome.errors.push(clear_error(&target.dir, &err));
                continue;
            }
        };
        let path = entry.path();
        if let Some(include) = &include {
            if !include.is_match(entry.file_name()) {
                continue;
            }
        }

        if target.shared {
            let reason = match std::fs::symlink_metadata(&path) {
                Ok(meta) => shared_skip_reason(&path, &meta, now),
                Err(err) => {
                    outcome.errors.push(clear_error(&path, &err));
                    continue;
                }
            };
            if let Some(reason) = reason {
                tracing::debug!(path = %path.display(), reason, "entry kept");
                outcome.skipped_in_use.push(path);
                continue;
            }
        }

        let bytes = entry_size(&path);
        if dry_run {
            tracing::debug!(path = %path.display(), bytes, "dry-run: would remove");
            outcome.removed.push(path);
            outcome.reclaimed_bytes = outcome.reclaimed_bytes.saturating_add(bytes);
            continue;
        }

        match remove_entry(&path) {
            Ok(()) => {
                outcome.removed.push(path);
                outcome.reclaimed_bytes = outcome.reclaimed_bytes.saturating_add(bytes);
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "entry not removed");
                outcome.errors.push(clear_error(&path, &err));
            }
        }
    }

    let failed = outcome.errors.len() - errors_before;
    if failed > 0 {
        tracing::warn!(dir = %target.dir.display(), failed, "some entries could not be removed");
    }
    Ok(())
}

fn shared_skip_reason(path: &Path, meta: &Metadata, now: SystemTime) -> Option<&'static str> {
    let file_type = meta.file_type();
    if !file_type.is_file() && !file_type.is_dir() {
        return Some("not a regular file or directory");
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if meta.uid() != crate::platform::current_uid() {
            return Some("owned by another user");
        }
    }

    let recent = match meta.modified() {
        Ok(modified) => now
            .duration_since(modified)
            .map_or(true, |idle| idle < SHARED_MIN_IDLE),
        Err(_) => false,
    };
    if recent {
        return Some("recently modified");
    }

    if file_type.is_dir() && holds_endpoint(path) {
        return Some("holds a socket or fifo");
    }
    None
}

fn holds_endpoint(dir: &Path) -> bool {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .any(|e| {
            let ft = e.file_type();
            !ft.is_file() && !ft.is_dir() && !ft.is_symlink()
        })
}

fn clear_error(path: &Path, err: &io::Error) -> ClearError {
    ClearError {
        path: path.to_path_buf(),
        kind: err.kind(),
        error: err.to_string(),
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, ProbeError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|err| {
            ProbeError::Other(anyhow::anyhow!("glob が不正です: {pattern}: {err}"))
        })?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|err| {
            ProbeError::Other(anyhow::anyhow!("glob の構築に失敗しました: {err}"))
        })?;
    Ok(Some(set))
}

fn entry_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .fold(0u64, |acc, n| acc.saturating_add(n))
}

fn remove_entry(path: &Path) -> io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    let result = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    #[cfg(windows)]
    if let Err(err) = &result {
        if err.kind() == io::ErrorKind::PermissionDenied && meta.permissions().readonly() {
            let mut perms = meta.permissions();
            perms.set_readonly(false);
            std::fs::set_permissions(path, perms)?;
            return if meta.is_dir() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };
        }
    }

    result
}
