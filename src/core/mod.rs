mod finding;
mod graylist;
mod report;
mod severity;
mod version;

pub use finding::{Finding, remediation};
pub use graylist::{GraylistEntry, GraylistRule, MatchMethod, normalize_graylist};
pub use report::{OsInfo, Report, Termination};
pub use severity::Severity;
pub use version::{DottedVersion, VersionRecord, VersionScheme};
