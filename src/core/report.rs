use crate::core::Finding;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Termination {
    Completed,
    Cancelled,
    Failed,
}

impl Termination {
    pub const fn as_str(self) -> &'static str {
        match self {
            Termination::Completed => "completed",
            Termination::Cancelled => "cancelled",
            Termination::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub schema_version: String,
    pub tool_version: String,
    pub os: OsInfo,
    pub started_at: String,
    pub ended_at: String,
    pub termination: Termination,
    pub findings: Vec<Finding>,
}
