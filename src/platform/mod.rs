use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use wait_timeout::ChildExt;

use crate::core::OsInfo;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub fn run_command(cmd: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
    let mut command = Command::new(cmd);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("プロセス起動に失敗しました: {cmd}"))?;

    let status = match child
        .wait_timeout(timeout)
        .with_context(|| format!("プロセス待機に失敗しました: {cmd}"))?
    {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(anyhow!("タイムアウトしました（{timeout:?}）: {cmd}"));
        }
    };

    let mut stdout = String::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_string(&mut stdout);
    }
    let mut stderr = String::new();
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut stderr);
    }

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

#[derive(Debug, Clone)]
pub struct InvokingUser {
    pub username: Option<String>,
    pub home_dir: PathBuf,
}

pub fn invoking_user() -> Option<InvokingUser> {
    let uid = std::env::var("SUDO_UID").ok()?.parse::<u32>().ok()?;
    let username = std::env::var("SUDO_USER").ok();
    let home_dir = home_dir_for_uid(uid)?;

    Some(InvokingUser { username, home_dir })
}

pub fn effective_home_dir() -> Result<PathBuf> {
    if let Some(user) = invoking_user() {
        tracing::debug!(
            user = ?user.username,
            home = %user.home_dir.display(),
            "running under sudo"
        );
        return Ok(user.home_dir);
    }
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("環境変数 HOME が設定されていません"))
}

#[cfg(unix)]
fn home_dir_for_uid(uid: u32) -> Option<PathBuf> {
    use std::ffi::CStr;

    unsafe {
        let bufsize = libc::sysconf(libc::_SC_GETPW_R_SIZE_MAX);
        let bufsize = if bufsize <= 0 {
            16 * 1024
        } else {
            bufsize as usize
        };
        let mut buf = vec![0u8; bufsize];
        let mut pwd: libc::passwd = std::mem::zeroed();
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let rc = libc::getpwuid_r(
            uid as libc::uid_t,
            &mut pwd,
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
            &mut result,
        );
        if rc != 0 || result.is_null() {
            return None;
        }
        if pwd.pw_dir.is_null() {
            return None;
        }

        let dir = CStr::from_ptr(pwd.pw_dir).to_string_lossy().to_string();
        if dir.trim().is_empty() {
            return None;
        }
        Some(PathBuf::from(dir))
    }
}

#[cfg(not(unix))]
fn home_dir_for_uid(_uid: u32) -> Option<PathBuf> {
    None
}

#[cfg(unix)]
pub fn current_uid() -> u32 {
    unsafe { libc::geteuid() }
}

pub fn os_info() -> OsInfo {
    OsInfo {
        name: sysinfo::System::name().unwrap_or_else(|| "unknown".to_string()),
        version: sysinfo::System::os_version().unwrap_or_else(|| "unknown".to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanTarget {
    pub dir: PathBuf,
    pub include: Vec<String>,
    /// Shared with other users and running services: only idle regular files
    /// and directories owned by the current user are removed.
    pub shared: bool,
}

impl CleanTarget {
    pub fn all(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            include: Vec::new(),
            shared: false,
        }
    }

    pub fn matching(dir: impl Into<PathBuf>, patterns: &[&str]) -> Self {
        Self {
            dir: dir.into(),
            include: patterns.iter().map(|p| p.to_string()).collect(),
            shared: false,
        }
    }

    pub fn shared_temp(dir: impl Into<PathBuf>) -> Self {
        Self {
            shared: true,
            ..Self::all(dir)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub cmd: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(cmd: &str, args: &[&str]) -> Self {
        Self {
            cmd: cmd.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn display(&self) -> String {
        std::iter::once(self.cmd.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cleanup {
    pub command: Option<CommandSpec>,
    pub targets: Vec<CleanTarget>,
}

impl Cleanup {
    pub fn dirs(targets: Vec<CleanTarget>) -> Self {
        Self {
            command: None,
            targets,
        }
    }

    pub fn command(spec: CommandSpec) -> Self {
        Self {
            command: Some(spec),
            targets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlatformLayout {
    pub trash: Cleanup,
    pub update_cache: Cleanup,
    pub prefetch: Cleanup,
    pub dns: Cleanup,
    pub thumbnails: Cleanup,
    pub system_temp: Cleanup,
    pub user_temp: Cleanup,
    pub system_root: PathBuf,
    pub jvm_dirs: Vec<PathBuf>,
    pub app_bundle_dirs: Vec<PathBuf>,
    pub desktop_entry_dirs: Vec<PathBuf>,
    pub registry: bool,
}

pub fn layout(home_dir: &Path) -> PlatformLayout {
    #[cfg(target_os = "macos")]
    {
        return crate::platform::macos::layout(home_dir);
    }

    #[cfg(target_os = "linux")]
    {
        return crate::platform::linux::layout(home_dir);
    }

    #[cfg(windows)]
    {
        return crate::platform::windows::layout(home_dir);
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", windows)))]
    {
        let _ = home_dir;
        return PlatformLayout {
            system_root: PathBuf::from("/"),
            ..PlatformLayout::default()
        };
    }
}

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(windows)]
pub mod windows;
