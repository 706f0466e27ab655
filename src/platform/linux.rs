use std::path::{Path, PathBuf};

use crate::platform::{CleanTarget, Cleanup, CommandSpec, PlatformLayout};

fn xdg_dir(var: &str, home_dir: &Path, fallback: &str) -> PathBuf {
    std::env::var_os(var)
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .unwrap_or_else(|| home_dir.join(fallback))
}

pub fn layout(home_dir: &Path) -> PlatformLayout {
    let data_home = xdg_dir("XDG_DATA_HOME", home_dir, ".local/share");
    let cache_home = xdg_dir("XDG_CACHE_HOME", home_dir, ".cache");

    PlatformLayout {
        trash: Cleanup::dirs(vec![
            CleanTarget::all(data_home.join("Trash/files")),
            CleanTarget::all(data_home.join("Trash/info")),
        ]),
        update_cache: Cleanup::dirs(vec![CleanTarget::matching(
            "/var/cache/apt/archives",
            &["*.deb"],
        )]),
        prefetch: Cleanup::default(),
        dns: Cleanup::command(CommandSpec::new("resolvectl", &["flush-caches"])),
        thumbnails: Cleanup::dirs(vec![CleanTarget::all(cache_home.join("thumbnails"))]),
        system_temp: Cleanup::dirs(vec![CleanTarget::shared_temp("/var/tmp")]),
        user_temp: Cleanup::dirs(vec![CleanTarget::shared_temp(std::env::temp_dir())]),
        system_root: PathBuf::from("/"),
        jvm_dirs: vec![PathBuf::from("/usr/lib/jvm")],
        app_bundle_dirs: Vec::new(),
        desktop_entry_dirs: vec![
            PathBuf::from("/usr/share/applications"),
            data_home.join("applications"),
        ],
        registry: false,
    }
}
