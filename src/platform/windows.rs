use std::path::{Path, PathBuf};

use crate::platform::{CleanTarget, Cleanup, CommandSpec, PlatformLayout};

fn system_root() -> PathBuf {
    std::env::var_os("SystemRoot")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\Windows"))
}

fn user_homes(system_root: &Path, home_dir: &Path) -> Vec<PathBuf> {
    let users = system_root
        .ancestors()
        .last()
        .map(|drive| drive.join("Users"))
        .unwrap_or_else(|| PathBuf::from(r"C:\Users"));
    let mut homes: Vec<PathBuf> = std::fs::read_dir(&users)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect()
        })
        .unwrap_or_default();
    if homes.is_empty() {
        homes.push(home_dir.to_path_buf());
    }
    homes.sort();
    homes
}

fn powershell(script: &str) -> CommandSpec {
    CommandSpec::new("powershell", &["-NoProfile", "-NonInteractive", "-Command", script])
}

pub fn layout(home_dir: &Path) -> PlatformLayout {
    let root = system_root();
    let homes = user_homes(&root, home_dir);

    PlatformLayout {
        trash: Cleanup::command(powershell(
            "Clear-RecycleBin -Force -ErrorAction SilentlyContinue",
        )),
        update_cache: Cleanup {
            command: Some(powershell(
                "Stop-Service -Name wuauserv,BITS -Force -ErrorAction SilentlyContinue",
            )),
            targets: vec![CleanTarget::all(root.join(r"SoftwareDistribution\Download"))],
        },
        prefetch: Cleanup::dirs(vec![CleanTarget::all(root.join("Prefetch"))]),
        dns: Cleanup::command(CommandSpec::new("ipconfig", &["/flushdns"])),
        thumbnails: Cleanup::dirs(
            homes
                .iter()
                .map(|h| {
                    CleanTarget::matching(
                        h.join(r"AppData\Local\Microsoft\Windows\Explorer"),
                        &["thumbcache_*.db", "iconcache_*.db"],
                    )
                })
                .collect(),
        ),
        system_temp: Cleanup::dirs(vec![CleanTarget::all(root.join("Temp"))]),
        user_temp: Cleanup::dirs(
            homes
                .iter()
                .map(|h| CleanTarget::all(h.join(r"AppData\Local\Temp")))
                .collect(),
        ),
        system_root: root,
        jvm_dirs: Vec::new(),
        app_bundle_dirs: Vec::new(),
        desktop_entry_dirs: Vec::new(),
        registry: true,
    }
}
