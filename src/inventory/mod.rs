use std::path::{Path, PathBuf};
use std::time::Duration;

use walkdir::WalkDir;

use crate::platform;
use crate::probe::{ProbeError, ProductKey};

const UNINSTALL_KEYS: [&str; 2] = [
    r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
    r"HKLM\SOFTWARE\Wow6432Node\Microsoft\Windows\CurrentVersion\Uninstall",
];
const JAVA_KEY: &str = r"HKLM\SOFTWARE\JavaSoft\Java Runtime Environment";
const FLASH_KEYS: [&str; 2] = [
    r"HKLM\SOFTWARE\Wow6432Node\Macromedia\FlashPlayer",
    r"HKLM\SOFTWARE\Macromedia\FlashPlayer",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegValue {
    pub name: String,
    pub kind: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegKey {
    pub path: String,
    pub values: Vec<RegValue>,
}

impl RegKey {
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
            .map(|v| v.data.as_str())
    }

    pub fn leaf_name(&self) -> &str {
        self.path.rsplit('\\').next().unwrap_or(&self.path)
    }
}

pub fn parse_reg_query(stdout: &str) -> Vec<RegKey> {
    let mut keys: Vec<RegKey> = Vec::new();
    for line in stdout.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with("HKEY_") {
            keys.push(RegKey {
                path: line.to_string(),
                values: Vec::new(),
            });
            continue;
        }
        let Some(value) = parse_reg_value(line) else {
            continue;
        };
        if let Some(key) = keys.last_mut() {
            key.values.push(value);
        }
    }
    keys
}

fn parse_reg_value(line: &str) -> Option<RegValue> {
    let line = line.trim_start();
    let idx = line.find("    REG_")?;
    let name = line[..idx].trim().to_string();
    let rest = line[idx..].trim_start();
    let (kind, data) = match rest.split_once("    ") {
        Some((kind, data)) => (kind, data.trim()),
        None => (rest.trim(), ""),
    };
    Some(RegValue {
        name,
        kind: kind.to_string(),
        data: data.to_string(),
    })
}

fn is_system_component(data: Option<&str>) -> bool {
    let Some(data) = data.map(str::trim).filter(|d| !d.is_empty()) else {
        return false;
    };
    let parsed = match data.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => data.parse::<u64>().ok(),
    };
    parsed != Some(0)
}

pub fn uninstall_applications(keys: &[RegKey]) -> Vec<String> {
    keys.iter()
        .filter(|k| !is_system_component(k.value("SystemComponent")))
        .filter_map(|k| k.value("DisplayName"))
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn uninstall_versions(keys: &[RegKey], is_product: impl Fn(&str) -> bool) -> Vec<String> {
    keys.iter()
        .filter(|k| {
            k.value("DisplayName")
                .is_some_and(|n| is_product(&n.to_lowercase()))
        })
        .filter_map(|k| k.value("DisplayVersion"))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn subkey_names(keys: &[RegKey]) -> Vec<String> {
    keys.iter()
        .skip(1)
        .map(|k| k.leaf_name().to_string())
        .collect()
}

fn is_reader(name: &str) -> bool {
    name.contains("adobe") && name.contains("reader")
}

pub fn parse_java_release(contents: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let value = line.trim().strip_prefix("JAVA_VERSION=")?;
        let value = value.trim().trim_matches('"').trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    pub name: String,
    pub hidden: bool,
}

pub fn parse_desktop_entry(contents: &str) -> Option<DesktopEntry> {
    let mut in_group = false;
    let mut name = None;
    let mut hidden = false;
    for line in contents.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_group = line == "[Desktop Entry]";
            continue;
        }
        if !in_group {
            continue;
        }
        if let Some(v) = line.strip_prefix("Name=") {
            name.get_or_insert_with(|| v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("NoDisplay=") {
            hidden |= v.trim().eq_ignore_ascii_case("true");
        } else if let Some(v) = line.strip_prefix("Hidden=") {
            hidden |= v.trim().eq_ignore_ascii_case("true");
        }
    }
    let name = name.filter(|n| !n.is_empty())?;
    Some(DesktopEntry { name, hidden })
}

fn reg_query(key: &str, extra: &[&str], timeout: Duration) -> Result<Vec<RegKey>, ProbeError> {
    let mut args = vec!["query", key];
    args.extend_from_slice(extra);
    let out = platform::run_command("reg", &args, timeout)?;
    match out.exit_code {
        0 => Ok(parse_reg_query(&out.stdout)),
        // reg exits 1 when the key does not exist.
        1 => Ok(Vec::new()),
        code => Err(ProbeError::CommandFailed {
            cmd: format!("reg {}", args.join(" ")),
            exit_code: code,
            stderr: out.stderr,
        }),
    }
}

fn uninstall_entries(timeout: Duration) -> Result<Vec<RegKey>, ProbeError> {
    let mut keys = Vec::new();
    for key in UNINSTALL_KEYS {
        keys.extend(reg_query(key, &["/s"], timeout)?);
    }
    Ok(keys)
}

pub fn registry_applications(timeout: Duration) -> Result<Vec<String>, ProbeError> {
    Ok(uninstall_applications(&uninstall_entries(timeout)?))
}

pub fn registry_versions(
    product: ProductKey,
    timeout: Duration,
) -> Result<Vec<String>, ProbeError> {
    match product {
        ProductKey::JavaRuntime => Ok(subkey_names(&reg_query(JAVA_KEY, &[], timeout)?)),
        ProductKey::FlashPlayer => {
            for key in FLASH_KEYS {
                let keys = reg_query(key, &["/v", "CurrentVersion"], timeout)?;
                if let Some(v) = keys.iter().find_map(|k| k.value("CurrentVersion")) {
                    return Ok(vec![v.to_string()]);
                }
            }
            Ok(Vec::new())
        }
        ProductKey::AcrobatReader => {
            Ok(uninstall_versions(&uninstall_entries(timeout)?, is_reader))
        }
    }
}

pub fn jvm_versions(dirs: &[PathBuf]) -> Vec<String> {
    let mut versions = Vec::new();
    for dir in dirs {
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        let mut homes: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        homes.sort();
        for home in homes {
            for release in [home.join("release"), home.join("Contents/Home/release")] {
                if let Some(v) = std::fs::read_to_string(&release)
                    .ok()
                    .as_deref()
                    .and_then(parse_java_release)
                {
                    versions.push(v);
                    break;
                }
            }
        }
    }
    versions
}

pub fn bundle_applications(dirs: &[PathBuf]) -> Vec<String> {
    let mut names = Vec::new();
    for dir in dirs {
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("app") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    names
}

pub fn desktop_applications(dirs: &[PathBuf]) -> Vec<String> {
    let mut names = Vec::new();
    for dir in dirs {
        for entry in WalkDir::new(dir)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !is_desktop_file(entry.path()) {
                continue;
            }
            let Ok(contents) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            if let Some(parsed) = parse_desktop_entry(&contents) {
                if !parsed.hidden {
                    names.push(parsed.name);
                }
            }
        }
    }
    names.sort();
    names
}

fn is_desktop_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("desktop")
}
