use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Contains,
    Equals,
}

impl MatchMethod {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contains" => Some(MatchMethod::Contains),
            "equals" => Some(MatchMethod::Equals),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraylistRule {
    pub method: MatchMethod,
    pub value: String,
}

impl GraylistRule {
    pub fn contains(value: impl Into<String>) -> Self {
        Self {
            method: MatchMethod::Contains,
            value: value.into().to_lowercase(),
        }
    }

    pub fn equals(value: impl Into<String>) -> Self {
        Self {
            method: MatchMethod::Equals,
            value: value.into().to_lowercase(),
        }
    }

    /// `name` must already be lower-cased.
    pub fn matches(&self, name: &str) -> bool {
        match self.method {
            MatchMethod::Contains => name.contains(self.value.as_str()),
            MatchMethod::Equals => name == self.value,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireRule {
    pub method: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GraylistEntry {
    Rule(WireRule),
    Substring(String),
}

impl GraylistEntry {
    pub fn into_rule(self) -> Option<GraylistRule> {
        match self {
            GraylistEntry::Rule(wire) => {
                let Some(method) = MatchMethod::parse(&wire.method) else {
                    tracing::debug!(method = %wire.method, "unsupported graylist method skipped");
                    return None;
                };
                Some(GraylistRule {
                    method,
                    value: wire.value.to_lowercase(),
                })
            }
            GraylistEntry::Substring(value) => Some(GraylistRule::contains(value)),
        }
    }
}

pub fn normalize_graylist(entries: Vec<GraylistEntry>) -> Vec<GraylistRule> {
    entries
        .into_iter()
        .filter_map(GraylistEntry::into_rule)
        .collect()
}
