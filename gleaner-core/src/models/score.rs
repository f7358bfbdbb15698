use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkScore {
    pub url: String,
    /// 0.0 to 1.0, higher is better.
    pub score: f64,
    pub reason: String,
    pub categories: Vec<String>,
    pub is_recommended: bool,
    #[serde(default)]
    pub malicious_indicators: Vec<String>,
    /// True when the model produced the score, false for the rule-based fallback.
    pub ai_used: bool,
}
