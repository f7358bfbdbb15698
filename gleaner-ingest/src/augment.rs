//! AI augmentation with deterministic fallbacks.
//!
//! Four operations, each bounded by the AI call timeout and the caller's
//! cancellation token:
//! - **clean_content**: strip boilerplate from page text (fallback: raw text)
//! - **filter_links**: keep substantive links (fallback: all links)
//! - **analyze_image**: caption and tag an image (fallback: nothing)
//! - **score_content**: quality assessment, see `scoring` for the fallback
//!
//! Model output is untrusted. Anything that does not decode strictly into the
//! expected shape is treated as a failed call.

use serde::Deserialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use gleaner_core::config::{AiConfig, ScraperConfig};
use gleaner_core::{AiBackend, AiError};
use regex::Regex;

use crate::scoring::Assessment;

#[derive(Error, Debug)]
pub enum AugmentError {
    #[error("AI service is not configured")]
    Unavailable,

    #[error("AI call timed out after {0:?}")]
    Timeout(Duration),

    #[error("AI call cancelled")]
    Cancelled,

    #[error("AI backend error: {0}")]
    Backend(#[from] AiError),

    #[error("could not decode AI response: {0}")]
    Decode(String),
}

/// A value plus whether the model produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Augmented<T> {
    pub value: T,
    pub ai_used: bool,
}

impl<T> Augmented<T> {
    fn ai(value: T) -> Self {
        Self { value, ai_used: true }
    }

    fn fallback(value: T) -> Self {
        Self {
            value,
            ai_used: false,
        }
    }
}

/// Caption and tags for one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageAnalysis {
    pub summary: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct ScoreResponse {
    score: f64,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    malicious_indicators: Vec<String>,
}

fn fence_pattern() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)^```[^\n]*\n(.*?)\n?\s*```$").ok())
        .as_ref()
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    fence_pattern()
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed)
}

/// Cut `text` to at most `limit` characters without splitting a code point.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn decode<T: for<'de> Deserialize<'de>>(response: &str) -> Result<T, AugmentError> {
    serde_json::from_str(strip_code_fences(response)).map_err(|e| AugmentError::Decode(e.to_string()))
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn clean_content_prompt(raw: &str) -> String {
    format!(
        r#"You are a content extraction assistant. Given the following text extracted from a webpage, identify and return ONLY the meaningful human-readable content. Remove advertisements, navigation menus, footers, cookie notices, social media widgets, and other non-essential elements.

Return only the main content that a human would want to read. Do not add any commentary or explanations.

Text:
{raw}

Extracted content:"#
    )
}

fn filter_links_prompt(links: &[String], title: &str, content: &str) -> String {
    let listed = serde_json::to_string(links).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"You are a link filtering assistant. Given a list of URLs extracted from a webpage, identify and return ONLY the links that point to substantive content (articles, blog posts, reports, guides, documentation).

INCLUDE:
- Articles, news stories, blog posts and features
- Opinion pieces and editorials
- Reports, guides and documentation
- Pages for individual pieces of multimedia content

EXCLUDE:
- Advertising and sponsored links
- Site navigation (home, sections, categories, topics, tags)
- Social media share or follow links
- Login, signup and account links
- Footer links (privacy, terms, about, contact, jobs, press)
- Newsletter, subscription and cookie prompts
- Search links and pagination controls (next, previous, page numbers)
- Site tools (print, save, bookmark) and comment links

If this page is a homepage or aggregator, its many article links are the primary content and should all be kept.

Page Title: {title}

Page Content: {content}

Links to filter:
{listed}

Return ONLY a JSON array of the filtered URLs, with no explanation.
Format: ["url1", "url2", "url3"]"#
    )
}

fn analyze_image_prompt(alt_text: &str) -> String {
    let mut prompt = String::from(
        r#"Analyze this image and provide:
1. A 4-5 sentence summary describing what you see
2. A list of 5-10 relevant tags for categorizing the image

Format your response as JSON with the following structure:
{
  "summary": "Your 4-5 sentence description here",
  "tags": ["tag1", "tag2", "tag3"]
}"#,
    );
    let alt_text = alt_text.trim();
    if !alt_text.is_empty() {
        prompt.push_str("\n\nImage alt text (may provide context): ");
        prompt.push_str(alt_text);
    }
    prompt
}

fn score_prompt(url: &str, title: &str, content: &str) -> String {
    format!(
        r#"You are a content quality assessor. Decide whether the following web page is worth ingesting into a knowledge base.

Score it from 0.0 (worthless or harmful) to 1.0 (excellent reference material). Penalize social media, gambling, adult content, spam, marketplaces and thin content. Reward substantive, informative, technical or educational material. List any malicious indicators you notice (phishing, malware, scam, spam).

URL: {url}
Title: {title}

Content:
{content}

Respond ONLY with JSON in this exact structure:
{{"score": 0.0, "reason": "short explanation", "categories": ["category"], "malicious_indicators": []}}"#
    )
}

/// Runs augmentation calls against an optional AI backend.
#[derive(Clone)]
pub struct Augmenter {
    backend: Option<Arc<dyn AiBackend>>,
    call_timeout: Duration,
    prompt_char_limit: usize,
}

impl Augmenter {
    pub fn new(backend: Option<Arc<dyn AiBackend>>, ai: &AiConfig, scraper: &ScraperConfig) -> Self {
        Self {
            backend,
            call_timeout: ai.timeout(),
            prompt_char_limit: scraper.prompt_char_limit,
        }
    }

    /// No backend: every operation returns its fallback immediately.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            call_timeout: AiConfig::default().timeout(),
            prompt_char_limit: ScraperConfig::default().prompt_char_limit,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> Result<&Arc<dyn AiBackend>, AugmentError> {
        self.backend.as_ref().ok_or(AugmentError::Unavailable)
    }

    async fn bounded<F>(&self, cancel: &CancellationToken, call: F) -> Result<String, AugmentError>
    where
        F: Future<Output = Result<String, AiError>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AugmentError::Cancelled),
            result = tokio::time::timeout(self.call_timeout, call) => match result {
                Ok(response) => response.map_err(AugmentError::from),
                Err(_) => Err(AugmentError::Timeout(self.call_timeout)),
            },
        }
    }

    async fn generate(&self, prompt: &str, cancel: &CancellationToken) -> Result<String, AugmentError> {
        let backend = self.backend()?;
        self.bounded(cancel, backend.generate(prompt)).await
    }

    pub async fn try_clean_content(
        &self,
        raw: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AugmentError> {
        let response = self.generate(&clean_content_prompt(raw), cancel).await?;
        let cleaned = strip_code_fences(&response);
        if cleaned.is_empty() {
            return Err(AugmentError::Decode("empty content".to_string()));
        }
        Ok(cleaned.to_string())
    }

    /// Falls back to the raw text unchanged.
    pub async fn clean_content(&self, raw: &str, cancel: &CancellationToken) -> Augmented<String> {
        match self.try_clean_content(raw, cancel).await {
            Ok(cleaned) => Augmented::ai(cleaned),
            Err(e) => {
                log_fallback("clean_content", &e);
                Augmented::fallback(raw.to_string())
            }
        }
    }

    /// The answer is restricted to links that were actually offered, in
    /// their original order.
    pub async fn try_filter_links(
        &self,
        links: &[String],
        title: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, AugmentError> {
        let content = truncate_chars(content, self.prompt_char_limit);
        let response = self
            .generate(&filter_links_prompt(links, title, content), cancel)
            .await?;
        let kept: Vec<String> = decode(&response)?;
        let kept: HashSet<&str> = kept.iter().map(|l| l.trim()).collect();
        Ok(links
            .iter()
            .filter(|l| kept.contains(l.as_str()))
            .cloned()
            .collect())
    }

    /// Falls back to the unfiltered list.
    pub async fn filter_links(
        &self,
        links: &[String],
        title: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Augmented<Vec<String>> {
        match self.try_filter_links(links, title, content, cancel).await {
            Ok(filtered) => Augmented::ai(filtered),
            Err(e) => {
                log_fallback("filter_links", &e);
                Augmented::fallback(links.to_vec())
            }
        }
    }

    pub async fn try_analyze_image(
        &self,
        image: &[u8],
        alt_text: &str,
        cancel: &CancellationToken,
    ) -> Result<ImageAnalysis, AugmentError> {
        let backend = self.backend()?;
        let prompt = analyze_image_prompt(alt_text);
        let response = self
            .bounded(cancel, backend.generate_with_vision(&prompt, image))
            .await?;
        let decoded: ImageResponse = decode(&response)?;
        let summary = decoded.summary.trim();
        Ok(ImageAnalysis {
            summary: (!summary.is_empty()).then(|| summary.to_string()),
            tags: clean_tags(decoded.tags),
        })
    }

    /// Falls back to no summary and no tags.
    pub async fn analyze_image(
        &self,
        image: &[u8],
        alt_text: &str,
        cancel: &CancellationToken,
    ) -> Augmented<ImageAnalysis> {
        match self.try_analyze_image(image, alt_text, cancel).await {
            Ok(analysis) => Augmented::ai(analysis),
            Err(e) => {
                log_fallback("analyze_image", &e);
                Augmented::fallback(ImageAnalysis::default())
            }
        }
    }

    /// No fallback here; `scoring::FallbackScorer` owns that decision.
    pub async fn score_content(
        &self,
        url: &str,
        title: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<Assessment, AugmentError> {
        let content = truncate_chars(content, self.prompt_char_limit);
        let response = self.generate(&score_prompt(url, title, content), cancel).await?;
        let decoded: ScoreResponse = decode(&response)?;
        if !decoded.score.is_finite() || !(0.0..=1.0).contains(&decoded.score) {
            return Err(AugmentError::Decode(format!(
                "score {} outside [0, 1]",
                decoded.score
            )));
        }
        Ok(Assessment {
            score: decoded.score,
            reason: decoded.reason.trim().to_string(),
            categories: clean_tags(decoded.categories),
            indicators: clean_tags(decoded.malicious_indicators),
        })
    }
}

fn log_fallback(operation: &str, error: &AugmentError) {
    match error {
        AugmentError::Unavailable => {
            tracing::debug!(operation, "AI disabled, using fallback")
        }
        _ => tracing::warn!(operation, error = %error, "AI augmentation failed, using fallback"),
    }
}
