use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub name: String,
}

impl VersionRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionScheme {
    JavaUpdate,
    Punctuated,
    Ordered,
}

impl VersionScheme {
    pub fn is_instance(self, installed: &str) -> bool {
        let installed = installed.trim();
        match self {
            VersionScheme::JavaUpdate => installed.len() > 3,
            VersionScheme::Punctuated | VersionScheme::Ordered => !installed.is_empty(),
        }
    }

    pub fn normalize(self, version: &str) -> String {
        match self {
            VersionScheme::JavaUpdate | VersionScheme::Punctuated => strip_separators(version),
            VersionScheme::Ordered => version.trim().to_string(),
        }
    }

    /// `None` when either side cannot be interpreted under this scheme.
    pub fn is_outdated(self, installed: &str, latest: &str) -> Option<bool> {
        match self {
            VersionScheme::JavaUpdate | VersionScheme::Punctuated => {
                let latest = self.normalize(latest);
                if latest.is_empty() {
                    return None;
                }
                Some(self.normalize(installed) != latest)
            }
            VersionScheme::Ordered => {
                let installed = installed.parse::<DottedVersion>().ok()?;
                let latest = latest.parse::<DottedVersion>().ok()?;
                Some(installed < latest)
            }
        }
    }
}

fn strip_separators(version: &str) -> String {
    version
        .trim()
        .chars()
        .filter(|c| *c != '.' && *c != ',')
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DottedVersion(Vec<u64>);

impl FromStr for DottedVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);
        if s.is_empty() {
            return Err("バージョンが空です".to_string());
        }
        let parts = s
            .split('.')
            .map(|p| {
                p.parse::<u64>()
                    .map_err(|_| format!("バージョンが不正です: {s}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(parts))
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: Vec<String> = self.0.iter().map(u64::to_string).collect();
        f.write_str(&s.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn java_update_compares_after_stripping_separators() {
        let s = VersionScheme::JavaUpdate;
        assert_eq!(s.is_outdated("1.7.0_67", "1.7.0_80"), Some(true));
        assert_eq!(s.is_outdated("1.7.0_80", "1.7.0_80"), Some(false));
        assert!(!s.is_instance("1.7"));
        assert!(s.is_instance("1.8.0_402"));
    }

    #[test]
    fn punctuated_treats_commas_and_dots_alike() {
        let s = VersionScheme::Punctuated;
        assert_eq!(s.normalize("15,0,0,189"), "1500189");
        assert_eq!(s.is_outdated("15,0,0,189", "15.0.0.189"), Some(false));
        assert_eq!(s.is_outdated("15,0,0,152", "1500189"), Some(true));
        assert_eq!(s.is_outdated("15,0,0,152", " "), None);
    }

    #[test]
    fn ordered_flags_only_strictly_older() {
        let s = VersionScheme::Ordered;
        assert_eq!(s.is_outdated("0.1.0", "0.2.0"), Some(true));
        assert_eq!(s.is_outdated("1.0", "1.0.0"), Some(false));
        assert_eq!(s.is_outdated("1.10.0", "1.9.9"), Some(false));
        assert_eq!(s.is_outdated("1.x", "1.0"), None);
    }

    #[test]
    fn dotted_version_accepts_leading_v() {
        let v: DottedVersion = "v2.4.1".parse().expect("parse");
        assert_eq!(v, "2.4.1".parse().expect("parse"));
        assert_eq!(v.to_string(), "2.4.1");
        assert!("".parse::<DottedVersion>().is_err());
    }
}
