use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use sysinfo::{Disks, System};

use crate::actions::{self, ClearOutcome};
use crate::inventory;
use crate::platform::{self, Cleanup, PlatformLayout};
use crate::probe::{MemoryStats, OsProbe, ProbeError, ProductKey};

#[derive(Debug, Clone)]
pub struct SystemProbe {
    layout: PlatformLayout,
    timeout: Duration,
    dry_run: bool,
}

impl SystemProbe {
    pub fn new(layout: PlatformLayout, timeout: Duration, dry_run: bool) -> Self {
        Self {
            layout,
            timeout,
            dry_run,
        }
    }

    pub fn detect(timeout: Duration, dry_run: bool) -> Result<Self> {
        let home_dir = platform::effective_home_dir()?;
        Ok(Self::new(platform::layout(&home_dir), timeout, dry_run))
    }

    fn clean(&self, what: &'static str, cleanup: &Cleanup) -> Result<(), ProbeError> {
        if let Some(spec) = &cleanup.command {
            if self.dry_run {
                tracing::info!(step = what, cmd = %spec.display(), "dry-run: command skipped");
            } else {
                let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
                let out = platform::run_command(&spec.cmd, &args, self.timeout)?;
                if out.exit_code != 0 {
                    return Err(ProbeError::CommandFailed {
                        cmd: spec.display(),
                        exit_code: out.exit_code,
                        stderr: out.stderr.trim().to_string(),
                    });
                }
            }
        }

        let outcome = actions::clear_targets(&cleanup.targets, self.dry_run)?;
        log_outcome(what, &outcome, self.dry_run);
        Ok(())
    }
}

fn log_outcome(what: &str, outcome: &ClearOutcome, dry_run: bool) {
    tracing::info!(
        step = what,
        dry_run,
        removed = outcome.removed.len(),
        reclaimed_bytes = outcome.reclaimed_bytes,
        skipped_missing = outcome.skipped_missing.len(),
        skipped_in_use = outcome.skipped_in_use.len(),
        errors = outcome.errors.len(),
        "cleanup finished"
    );
}

fn disk_for<'a>(mounts: impl Iterator<Item = (&'a Path, u64)>, path: &Path) -> Option<u64> {
    mounts
        .filter(|(mount, _)| path.starts_with(mount))
        .max_by_key(|(mount, _)| mount.as_os_str().len())
        .map(|(_, free)| free)
}

impl OsProbe for SystemProbe {
    fn empty_trash(&self) -> Result<(), ProbeError> {
        self.clean("trash", &self.layout.trash)
    }

    fn clear_update_download_cache(&self) -> Result<(), ProbeError> {
        self.clean("update-cache", &self.layout.update_cache)
    }

    fn clear_prefetch_cache(&self) -> Result<(), ProbeError> {
        self.clean("prefetch", &self.layout.prefetch)
    }

    fn flush_dns_cache(&self) -> Result<(), ProbeError> {
        self.clean("dns", &self.layout.dns)
    }

    fn clear_thumbnail_caches(&self) -> Result<(), ProbeError> {
        self.clean("thumbnails", &self.layout.thumbnails)
    }

    fn clear_system_temp_files(&self) -> Result<(), ProbeError> {
        self.clean("system-temp", &self.layout.system_temp)
    }

    fn clear_user_temp_files(&self) -> Result<(), ProbeError> {
        self.clean("user-temp", &self.layout.user_temp)
    }

    fn memory_stats(&self) -> Result<MemoryStats, ProbeError> {
        let mut sys = System::new();
        sys.refresh_memory();
        let total = sys.total_memory();
        if total == 0 {
            return Err(ProbeError::Unavailable("物理メモリ量"));
        }
        Ok(MemoryStats {
            total_kib: total / 1024,
            free_kib: sys.available_memory() / 1024,
        })
    }

    fn system_disk_free_bytes(&self) -> Result<u64, ProbeError> {
        let disks = Disks::new_with_refreshed_list();
        disk_for(
            disks
                .list()
                .iter()
                .map(|d| (d.mount_point(), d.available_space())),
            &self.layout.system_root,
        )
        .ok_or(ProbeError::Unavailable("システムディスクの空き容量"))
    }

    fn installed_versions(&self, product: ProductKey) -> Result<Vec<String>, ProbeError> {
        if self.layout.registry {
            return inventory::registry_versions(product, self.timeout);
        }
        match product {
            ProductKey::JavaRuntime => Ok(inventory::jvm_versions(&self.layout.jvm_dirs)),
            ProductKey::FlashPlayer | ProductKey::AcrobatReader => Ok(Vec::new()),
        }
    }

    fn installed_applications(&self) -> Result<Vec<String>, ProbeError> {
        if self.layout.registry {
            return inventory::registry_applications(self.timeout);
        }
        let mut names = inventory::bundle_applications(&self.layout.app_bundle_dirs);
        names.extend(inventory::desktop_applications(
            &self.layout.desktop_entry_dirs,
        ));
        Ok(names)
    }

    fn own_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
}
