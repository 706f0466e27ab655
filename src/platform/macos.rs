use std::path::{Path, PathBuf};

use crate::platform::{CleanTarget, Cleanup, CommandSpec, PlatformLayout};

pub fn layout(home_dir: &Path) -> PlatformLayout {
    PlatformLayout {
        trash: Cleanup::dirs(vec![CleanTarget::all(home_dir.join(".Trash"))]),
        update_cache: Cleanup::dirs(vec![CleanTarget::all("/Library/Updates")]),
        prefetch: Cleanup::default(),
        dns: Cleanup::command(CommandSpec::new("dscacheutil", &["-flushcache"])),
        thumbnails: Cleanup {
            command: Some(CommandSpec::new("qlmanage", &["-r", "cache"])),
            targets: vec![CleanTarget::all(
                home_dir.join("Library/Caches/com.apple.QuickLook.thumbnailcache"),
            )],
        },
        system_temp: Cleanup::dirs(vec![CleanTarget::shared_temp("/private/var/tmp")]),
        user_temp: Cleanup::dirs(vec![CleanTarget::all(std::env::temp_dir())]),
        system_root: PathBuf::from("/"),
        jvm_dirs: vec![PathBuf::from("/Library/Java/JavaVirtualMachines")],
        app_bundle_dirs: vec![
            PathBuf::from("/Applications"),
            home_dir.join("Applications"),
        ],
        desktop_entry_dirs: Vec::new(),
        registry: false,
    }
}
