//! Content quality scoring.
//!
//! Two interchangeable strategies behind `QualityScorer`: the AI scorer and a
//! pure rule-based scorer. `FallbackScorer` picks the AI one when a backend is
//! configured and drops to the rules whenever it fails.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use gleaner_core::models::LinkScore;

use crate::augment::{AugmentError, Augmenter};

/// Score plus explanation, before the recommendation threshold is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub score: f64,
    pub reason: String,
    pub categories: Vec<String>,
    pub indicators: Vec<String>,
}

#[async_trait]
pub trait QualityScorer: Send + Sync {
    async fn assess(
        &self,
        url: &str,
        title: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<Assessment, AugmentError>;

    fn name(&self) -> &str;
}

// ============================================================================
// Rule-based scorer
// ============================================================================

const NEUTRAL_SCORE: f64 = 0.5;
const BLOCKED_SCORE: f64 = 0.1;

/// URL substrings that end the evaluation immediately. Checked in order.
const BLOCK_LIST: &[(&str, &str)] = &[
    ("facebook.com", "social_media"),
    ("twitter.com", "social_media"),
    ("x.com", "social_media"),
    ("instagram.com", "social_media"),
    ("tiktok.com", "social_media"),
    ("linkedin.com", "social_media"),
    ("pinterest.com", "social_media"),
    ("snapchat.com", "social_media"),
    ("reddit.com", "forum"),
    ("betting", "gambling"),
    ("casino", "gambling"),
    ("poker", "gambling"),
    ("bet", "gambling"),
    ("xxx", "adult_content"),
    ("porn", "adult_content"),
    ("adult", "adult_content"),
    ("cannabis", "drugs"),
    ("weed", "drugs"),
    ("ebay.com", "marketplace"),
    ("amazon.com", "marketplace"),
    ("craigslist.org", "marketplace"),
];

const QUALITY_DOMAINS: &[&str] = &[
    ".edu",
    ".gov",
    ".org",
    "wikipedia",
    "arxiv",
    "github",
    "stackoverflow",
];

const TECHNICAL_KEYWORDS: &[&str] = &[
    "documentation",
    "tutorial",
    "guide",
    "research",
    "study",
    "analysis",
    "technical",
];

/// Deterministic scorer. Same input, same output, no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedScorer;

#[derive(Default)]
struct Tally {
    score: f64,
    reasons: Vec<&'static str>,
    categories: Vec<String>,
    indicators: Vec<String>,
}

impl Tally {
    fn apply(&mut self, delta: f64, reason: Option<&'static str>, categories: &[&str]) {
        self.score += delta;
        if let Some(reason) = reason {
            self.reasons.push(reason);
        }
        for category in categories {
            if !self.categories.iter().any(|c| c == category) {
                self.categories.push(category.to_string());
            }
        }
    }
}

impl RuleBasedScorer {
    pub fn evaluate(&self, url: &str, title: &str, content: &str) -> Assessment {
        let url_lower = url.to_lowercase();

        if let Some((needle, category)) = BLOCK_LIST.iter().find(|(n, _)| url_lower.contains(n)) {
            tracing::debug!(url = %url, matched = needle, category, "URL is block-listed");
            return Assessment {
                score: BLOCKED_SCORE,
                reason: format!("Rule-based: Blocked content type detected: {}", category),
                categories: vec![category.to_string(), "low_quality".to_string()],
                indicators: vec![category.to_string()],
            };
        }

        let title_lower = title.to_lowercase();
        let content_lower = content.to_lowercase();
        let length = content.chars().count();
        let word_count = content.split_whitespace().count();

        let mut tally = Tally {
            score: NEUTRAL_SCORE,
            ..Tally::default()
        };

        if length < 100 {
            tally.apply(-0.3, Some("Very short content"), &["low_quality"]);
        } else if length < 500 {
            tally.apply(-0.1, Some("Short content"), &[]);
        } else if length > 1000 {
            tally.apply(0.2, Some("Substantial content"), &["informational"]);
        }

        if word_count < 20 {
            tally.apply(-0.2, Some("Minimal word count"), &["minimal_content"]);
        }

        let spammy = content_lower.matches("click here").count() > 2
            || content_lower.matches("buy now").count() > 2
            || content_lower.matches("limited offer").count() > 1;
        if spammy {
            tally.apply(-0.3, Some("Spam indicators detected"), &["spam"]);
            tally.indicators.push("spam_keywords".to_string());
        }

        let exclamations = content.matches('!').count();
        if exclamations > word_count / 10 && exclamations > 5 {
            tally.apply(-0.2, Some("Excessive punctuation"), &[]);
        }

        if QUALITY_DOMAINS.iter().any(|d| url_lower.contains(d)) {
            tally.apply(0.3, Some("Quality domain detected"), &["reference", "trusted_source"]);
        }

        if TECHNICAL_KEYWORDS
            .iter()
            .any(|k| title_lower.contains(k) || content_lower.contains(k))
        {
            tally.apply(0.1, Some("Technical content detected"), &["technical", "educational"]);
        }

        let score = tally.score.clamp(0.0, 1.0);

        let reason = if tally.reasons.is_empty() {
            "Rule-based assessment (service unavailable)".to_string()
        } else {
            format!("Rule-based: {}", tally.reasons.join("; "))
        };

        let categories = if tally.categories.is_empty() {
            vec![if score >= 0.6 { "informational" } else { "general" }.to_string()]
        } else {
            tally.categories
        };

        Assessment {
            score,
            reason,
            categories,
            indicators: tally.indicators,
        }
    }
}

#[async_trait]
impl QualityScorer for RuleBasedScorer {
    async fn assess(
        &self,
        url: &str,
        title: &str,
        content: &str,
        _cancel: &CancellationToken,
    ) -> Result<Assessment, AugmentError> {
        Ok(self.evaluate(url, title, content))
    }

    fn name(&self) -> &str {
        "rule-based"
    }
}

// ============================================================================
// AI scorer
// ============================================================================

pub struct AiScorer {
    augmenter: Augmenter,
}

impl AiScorer {
    pub fn new(augmenter: Augmenter) -> Self {
        Self { augmenter }
    }
}

#[async_trait]
impl QualityScorer for AiScorer {
    async fn assess(
        &self,
        url: &str,
        title: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<Assessment, AugmentError> {
        self.augmenter.score_content(url, title, content, cancel).await
    }

    fn name(&self) -> &str {
        "ai"
    }
}

// ============================================================================
// FallbackScorer
// ============================================================================

/// Primary scorer when available, rule-based otherwise. Never fails.
#[derive(Clone)]
pub struct FallbackScorer {
    primary: Option<Arc<dyn QualityScorer>>,
    rules: RuleBasedScorer,
    threshold: f64,
}

impl FallbackScorer {
    pub fn new(primary: Option<Arc<dyn QualityScorer>>, threshold: f64) -> Self {
        Self {
            primary,
            rules: RuleBasedScorer,
            threshold,
        }
    }

    /// AI scoring when the augmenter has a backend, rules alone otherwise.
    pub fn from_augmenter(augmenter: &Augmenter, threshold: f64) -> Self {
        let primary = augmenter
            .is_available()
            .then(|| Arc::new(AiScorer::new(augmenter.clone())) as Arc<dyn QualityScorer>);
        Self::new(primary, threshold)
    }

    pub async fn score(
        &self,
        url: &str,
        title: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> LinkScore {
        if let Some(primary) = &self.primary {
            match primary.assess(url, title, content, cancel).await {
                Ok(assessment) => return self.link_score(url, assessment, true),
                Err(e) => tracing::warn!(
                    url = %url,
                    scorer = primary.name(),
                    error = %e,
                    "Scoring failed, using rule-based fallback"
                ),
            }
        }
        let assessment = self.rules.evaluate(url, title, content);
        self.link_score(url, assessment, false)
    }

    fn link_score(&self, url: &str, assessment: Assessment, ai_used: bool) -> LinkScore {
        LinkScore {
            url: url.to_string(),
            is_recommended: assessment.score >= self.threshold,
            score: assessment.score,
            reason: assessment.reason,
            categories: assessment.categories,
            malicious_indicators: assessment.indicators,
            ai_used,
        }
    }
}
