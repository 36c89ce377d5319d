use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Canonical metric label as stored for a firm. Casing is preserved; matching is not case-sensitive.
pub type MetricName = String;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct FocalFirm {
    #[schemars(description = "Ticker symbol of the firm currently in context (e.g. JPM)")]
    pub ticker: String,

    #[schemars(description = "Stable identifier of the reporting entity (RSSD ID)")]
    #[serde(alias = "rssd_id")]
    pub firm_id: String,
}

impl FocalFirm {
    pub fn new(ticker: impl Into<String>, firm_id: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            firm_id: firm_id.into(),
        }
    }

    /// A firm with a blank ticker or firm id is treated as no firm at all.
    pub fn is_complete(&self) -> bool {
        !self.ticker.trim().is_empty() && !self.firm_id.trim().is_empty()
    }
}

pub fn has_focal_firm(firm: Option<&FocalFirm>) -> bool {
    firm.is_some_and(FocalFirm::is_complete)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionFlags {
    #[schemars(description = "Report intermediate steps back to the user")]
    pub verbose: bool,

    #[schemars(description = "Stream the per-request log alongside the reply. Implies verbose.")]
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TickerResolution {
    pub ticker: String,
    pub firm_id: Option<String>,
}

impl TickerResolution {
    pub fn as_focal_firm(&self) -> Option<FocalFirm> {
        self.firm_id
            .as_ref()
            .map(|firm_id| FocalFirm::new(self.ticker.clone(), firm_id.clone()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CommandOutcome {
    /// Input from the first non-directive line onwards, trimmed.
    pub residual_text: String,
    /// Notes produced while scanning, one per line, in order.
    pub status_message: String,
    /// Every ticker directive seen, in order, with its resolution.
    pub resolutions: Vec<TickerResolution>,
}

impl CommandOutcome {
    pub fn last_resolved_firm(&self) -> Option<FocalFirm> {
        self.resolutions
            .iter()
            .rev()
            .find_map(TickerResolution::as_focal_firm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    System,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_firm_is_not_focal() {
        assert!(has_focal_firm(Some(&FocalFirm::new("JPM", "852218"))));
        assert!(!has_focal_firm(Some(&FocalFirm::new("JPM", ""))));
        assert!(!has_focal_firm(Some(&FocalFirm::new("  ", "852218"))));
        assert!(!has_focal_firm(None));
    }

    #[test]
    fn test_focal_firm_accepts_rssd_id_alias() {
        let firm: FocalFirm =
            serde_json::from_str(r#"{"ticker":"JPM","rssd_id":"852218"}"#).unwrap();
        assert_eq!(firm, FocalFirm::new("JPM", "852218"));
    }

    #[test]
    fn test_last_resolved_firm_skips_unresolved() {
        let outcome = CommandOutcome {
            residual_text: String::new(),
            status_message: String::new(),
            resolutions: vec![
                TickerResolution {
                    ticker: "JPM".to_string(),
                    firm_id: Some("852218".to_string()),
                },
                TickerResolution {
                    ticker: "ZZZZ".to_string(),
                    firm_id: None,
                },
            ],
        };

        assert_eq!(
            outcome.last_resolved_firm(),
            Some(FocalFirm::new("JPM", "852218"))
        );
    }
}
