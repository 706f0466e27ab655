use std::path::PathBuf;

use thiserror::Error;

use crate::core::{VersionScheme, remediation};

mod system;

pub use system::SystemProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub total_kib: u64,
    pub free_kib: u64,
}

impl MemoryStats {
    pub fn free_percent(self) -> Option<f64> {
        if self.total_kib == 0 {
            return None;
        }
        Some(self.free_kib as f64 / self.total_kib as f64 * 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductKey {
    JavaRuntime,
    FlashPlayer,
    AcrobatReader,
}

impl ProductKey {
    pub const ALL: [ProductKey; 3] = [
        ProductKey::JavaRuntime,
        ProductKey::FlashPlayer,
        ProductKey::AcrobatReader,
    ];

    pub const fn remote_name(self) -> &'static str {
        match self {
            ProductKey::JavaRuntime => "java",
            ProductKey::FlashPlayer => "flash",
            ProductKey::AcrobatReader => "reader",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            ProductKey::JavaRuntime => "Java Runtime",
            ProductKey::FlashPlayer => "Flash Player",
            ProductKey::AcrobatReader => "Adobe Reader",
        }
    }

    pub const fn scheme(self) -> VersionScheme {
        match self {
            ProductKey::JavaRuntime => VersionScheme::JavaUpdate,
            ProductKey::FlashPlayer | ProductKey::AcrobatReader => VersionScheme::Punctuated,
        }
    }

    pub const fn remediation_code(self) -> &'static str {
        match self {
            ProductKey::JavaRuntime => remediation::JAVA_OUTDATED,
            ProductKey::FlashPlayer => remediation::FLASH_OUTDATED,
            ProductKey::AcrobatReader => remediation::READER_OUTDATED,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("コマンドが失敗しました（exit_code={exit_code}）: {cmd}")]
    CommandFailed {
        cmd: String,
        exit_code: i32,
        stderr: String,
    },
    #[error("{0} を取得できませんでした")]
    Unavailable(&'static str),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProbeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProbeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Mutations must be idempotent: a second call with nothing left to clean
/// succeeds.
pub trait OsProbe: Send + Sync {
    fn empty_trash(&self) -> Result<(), ProbeError>;
    fn clear_update_download_cache(&self) -> Result<(), ProbeError>;
    fn clear_prefetch_cache(&self) -> Result<(), ProbeError>;
    fn flush_dns_cache(&self) -> Result<(), ProbeError>;
    fn clear_thumbnail_caches(&self) -> Result<(), ProbeError>;
    fn clear_system_temp_files(&self) -> Result<(), ProbeError>;
    fn clear_user_temp_files(&self) -> Result<(), ProbeError>;

    fn memory_stats(&self) -> Result<MemoryStats, ProbeError>;
    fn system_disk_free_bytes(&self) -> Result<u64, ProbeError>;
    fn installed_versions(&self, product: ProductKey) -> Result<Vec<String>, ProbeError>;
    fn installed_applications(&self) -> Result<Vec<String>, ProbeError>;
    fn own_version(&self) -> String;
}
