use crate::core::Severity;
use serde::{Deserialize, Serialize};

pub mod remediation {
    pub const HIGH_MEMORY_USAGE: &str = "high-memory-usage";
    pub const LOW_PHYSICAL_MEMORY: &str = "low-physical-memory";
    pub const LOW_FREE_SPACE: &str = "low-free-space";
    pub const JAVA_OUTDATED: &str = "java-outdated";
    pub const FLASH_OUTDATED: &str = "flash-outdated";
    pub const READER_OUTDATED: &str = "reader-outdated";
    pub const SELF_OUTDATED: &str = "rebel-outdated";
    pub const GRAYLISTED_APPLICATION: &str = "graylisted-application-detected";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_code: Option<String>,
}

impl Finding {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            remediation_code: None,
        }
    }

    pub fn warning(message: impl Into<String>, remediation_code: &'static str) -> Self {
        Self::flagged(Severity::Warning, message.into(), remediation_code)
    }

    pub fn danger(message: impl Into<String>, remediation_code: &'static str) -> Self {
        Self::flagged(Severity::Danger, message.into(), remediation_code)
    }

    fn flagged(severity: Severity, message: String, remediation_code: &'static str) -> Self {
        debug_assert!(!remediation_code.is_empty());
        Self {
            severity,
            message,
            remediation_code: Some(remediation_code.to_string()),
        }
    }

    pub fn article_url(&self, articles_url: &str) -> Option<String> {
        let code = self.remediation_code.as_deref()?;
        Some(format!("{}/{code}", articles_url.trim_end_matches('/')))
    }
}
