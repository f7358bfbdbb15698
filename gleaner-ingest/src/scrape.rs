//! Scrape orchestrator: one URL in, one `ScrapedRecord` out.
//!
//! Validating, fetching and parsing can fail the scrape. Everything after
//! that degrades through the augmentation fallbacks and always reaches Done.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use gleaner_core::config::{GleanerConfig, ScraperConfig};
use gleaner_core::models::{LinkScore, ScrapedRecord};
use gleaner_core::AiBackend;

use crate::augment::Augmenter;
use crate::error::{ScrapeError, ScrapeStage};
use crate::extract::{extract_fields, looks_binary, parse_document, PageFields};
use crate::images::ImagePipeline;
use crate::links::LinkSanitizer;
use crate::scoring::FallbackScorer;

/// A fetched and parsed page, before augmentation.
struct LoadedPage {
    url: Url,
    fields: PageFields,
    fetched_at: DateTime<Utc>,
}

pub struct Scraper {
    client: Client,
    config: ScraperConfig,
    augmenter: Augmenter,
    images: ImagePipeline,
    links: LinkSanitizer,
    scorer: FallbackScorer,
}

impl Scraper {
    /// `backend` of `None` runs every augmentation on its fallback.
    pub fn new(config: &GleanerConfig, backend: Option<Arc<dyn AiBackend>>) -> Result<Self, ScrapeError> {
        // No client-wide timeout: pages and images each set their own per request.
        let client = Client::builder().build().map_err(ScrapeError::Client)?;

        let augmenter = Augmenter::new(backend, &config.ai, &config.scraper);
        let images = ImagePipeline::new(
            client.clone(),
            config.images.clone(),
            config.scraper.user_agent.clone(),
            augmenter.clone(),
        );
        let scorer = FallbackScorer::from_augmenter(&augmenter, config.scraper.link_score_threshold);

        tracing::info!(
            ai_enabled = augmenter.is_available(),
            images_enabled = config.images.enabled,
            threshold = config.scraper.link_score_threshold,
            "Scraper ready"
        );

        Ok(Self {
            client,
            config: config.scraper.clone(),
            links: LinkSanitizer::new(augmenter.clone()),
            augmenter,
            images,
            scorer,
        })
    }

    /// Accept only absolute http(s) URLs.
    pub fn validate_url(raw: &str) -> Result<Url, ScrapeError> {
        let url = Url::parse(raw.trim()).map_err(|e| ScrapeError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(ScrapeError::UnsupportedScheme(other.to_string())),
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(ScrapeError::InvalidUrl {
                url: raw.to_string(),
                reason: "missing host".to_string(),
            });
        }
        Ok(url)
    }

    /// The store key for `raw`: the URL as re-serialized after parsing.
    pub fn normalize_url(raw: &str) -> Result<String, ScrapeError> {
        Self::validate_url(raw).map(|u| u.to_string())
    }

    fn transport_error(&self, url: &Url, source: reqwest::Error) -> ScrapeError {
        if source.is_timeout() {
            ScrapeError::Timeout {
                url: url.to_string(),
                timeout: self.config.http_timeout(),
            }
        } else {
            ScrapeError::Fetch {
                url: url.to_string(),
                source,
            }
        }
    }

    async fn fetch(&self, url: &Url, cancel: &CancellationToken) -> Result<Bytes, ScrapeError> {
        let request = async {
            let response = self
                .client
                .get(url.clone())
                .header(USER_AGENT, &self.config.user_agent)
                .timeout(self.config.http_timeout())
                .send()
                .await
                .map_err(|e| self.transport_error(url, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ScrapeError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            response.bytes().await.map_err(|e| self.transport_error(url, e))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ScrapeError::Cancelled { stage: ScrapeStage::Fetching }),
            result = request => result,
        }
    }

    fn parse(url: &Url, body: &[u8]) -> Result<PageFields, ScrapeError> {
        if looks_binary(body) {
            return Err(ScrapeError::Parse {
                url: url.to_string(),
                reason: "response body is binary, not HTML".to_string(),
            });
        }
        let document = parse_document(body);
        Ok(extract_fields(&document, url))
    }

    /// Validating, Fetching, Parsing and Extracting.
    async fn load(&self, raw_url: &str, cancel: &CancellationToken) -> Result<LoadedPage, ScrapeError> {
        let url = Self::validate_url(raw_url)?;

        tracing::debug!(url = %url, stage = %ScrapeStage::Fetching, "Fetching page");
        let body = self.fetch(&url, cancel).await?;
        let fetched_at = Utc::now();

        if cancel.is_cancelled() {
            return Err(ScrapeError::Cancelled {
                stage: ScrapeStage::Parsing,
            });
        }
        tracing::debug!(url = %url, stage = %ScrapeStage::Parsing, bytes = body.len(), "Parsing page");
        let fields = Self::parse(&url, &body)?;

        Ok(LoadedPage {
            url,
            fields,
            fetched_at,
        })
    }

    /// Run the full pipeline for one URL.
    pub async fn scrape(&self, raw_url: &str, cancel: &CancellationToken) -> Result<ScrapedRecord, ScrapeError> {
        let started = Instant::now();
        let LoadedPage {
            url,
            fields,
            fetched_at,
        } = self.load(raw_url, cancel).await?;
        let PageFields {
            title,
            text,
            images,
            links,
            metadata,
        } = fields;
        let url = url.to_string();

        tracing::debug!(url = %url, stage = %ScrapeStage::Augmenting, images = images.len(), links = links.len(), "Augmenting page");
        let content = self.augmenter.clean_content(&text, cancel).await;
        let images = self.images.process(images, cancel).await;
        let links = self.links.sanitize(links, &title, &content.value, cancel).await;

        tracing::debug!(url = %url, stage = %ScrapeStage::Scoring, "Scoring page");
        let score = self.scorer.score(&url, &title, &content.value, cancel).await;

        let record = ScrapedRecord {
            id: Uuid::new_v4(),
            url,
            title,
            content: content.value,
            images,
            links: links.value,
            fetched_at,
            created_at: Utc::now(),
            processing_time: started.elapsed().as_secs_f64(),
            cached: false,
            metadata,
            score: Some(score),
        };

        tracing::info!(
            url = %record.url,
            id = %record.id,
            stage = %ScrapeStage::Done,
            images = record.images.len(),
            links = record.links.len(),
            content_ai = content.ai_used,
            links_ai = links.ai_used,
            seconds = record.processing_time,
            "Scrape complete"
        );
        Ok(record)
    }

    /// Fetch a page and return its sanitized links only.
    pub async fn extract_links(&self, raw_url: &str, cancel: &CancellationToken) -> Result<Vec<String>, ScrapeError> {
        let page = self.load(raw_url, cancel).await?;
        let content = self.augmenter.clean_content(&page.fields.text, cancel).await;
        let links = self
            .links
            .sanitize(page.fields.links, &page.fields.title, &content.value, cancel)
            .await;
        Ok(links.value)
    }

    /// Fetch a page and score its raw text without storing anything.
    pub async fn score_link(&self, raw_url: &str, cancel: &CancellationToken) -> Result<LinkScore, ScrapeError> {
        let page = self.load(raw_url, cancel).await?;
        let score = self
            .scorer
            .score(page.url.as_str(), &page.fields.title, &page.fields.text, cancel)
            .await;
        tracing::info!(url = %page.url, score = score.score, ai_used = score.ai_used, "Link scored");
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scraper() -> Scraper {
        let mut config = GleanerConfig::default();
        config.images.enabled = false;
        Scraper::new(&config, None).unwrap()
    }

    #[test]
    fn test_validate_url() {
        assert!(Scraper::validate_url("https://example.com/path?q=1").is_ok());
        assert!(matches!(
            Scraper::validate_url("ftp://example.com/file"),
            Err(ScrapeError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(
            Scraper::validate_url("not a url"),
            Err(ScrapeError::InvalidUrl { .. })
        ));
        assert!(matches!(
            Scraper::validate_url("javascript:alert(1)"),
            Err(ScrapeError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            Scraper::normalize_url("HTTPS://Example.COM").unwrap(),
            "https://example.com/"
        );
        assert_eq!(
            Scraper::normalize_url("  http://example.com:80/a/../b  ").unwrap(),
            "http://example.com/b"
        );
    }

    #[tokio::test]
    async fn test_scrape_without_ai_reaches_done_with_fallbacks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article"))
            .and(header("user-agent", "Mozilla/5.0 (compatible; Gleaner/1.0)"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><title>Article</title>
                   <meta name="author" content="Ann"></head>
                   <body><p>Some text.</p><a href="/next">next</a><img src="/i.png"></body></html>"#,
            ))
            .mount(&server)
            .await;

        let url = format!("{}/article", server.uri());
        let record = scraper().scrape(&url, &CancellationToken::new()).await.unwrap();

        assert_eq!(record.title, "Article");
        assert_eq!(record.content, "Article Some text. next");
        assert_eq!(record.links, vec![format!("{}/next", server.uri())]);
        assert_eq!(record.images.len(), 1);
        assert!(record.images[0].id.is_none(), "analysis disabled leaves images bare");
        assert_eq!(record.metadata.author.as_deref(), Some("Ann"));
        let score = record.score.expect("score");
        assert!(!score.ai_used);
        assert!(score.reason.starts_with("Rule-based"));
        assert!(!record.cached);
        assert!(record.processing_time >= 0.0);
    }

    #[tokio::test]
    async fn test_non_2xx_and_binary_fail_early() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/blob"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 159, 146, 150]))
            .mount(&server)
            .await;

        let scraper = scraper();
        let cancel = CancellationToken::new();

        let missing = scraper.scrape(&format!("{}/missing", server.uri()), &cancel).await;
        match missing {
            Err(e @ ScrapeError::Status { status: 404, .. }) => assert_eq!(e.stage(), ScrapeStage::Fetching),
            other => panic!("Expected Status error, got {:?}", other),
        }

        let blob = scraper.scrape(&format!("{}/blob", server.uri()), &cancel).await;
        match blob {
            Err(e) => assert_eq!(e.stage(), ScrapeStage::Parsing),
            Ok(_) => panic!("binary body must not parse"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_fetch() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = scraper().scrape("http://127.0.0.1:9/never", &cancel).await;
        assert!(matches!(
            result,
            Err(ScrapeError::Cancelled { stage: ScrapeStage::Fetching })
        ));
    }

    #[tokio::test]
    async fn test_image_deadline_is_independent_of_page_timeout() {
        let server = MockServer::start().await;
        Mock::given(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><title>Slow image</title></head><body><img src="/slow.png"></body></html>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(path("/slow.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late but fine".to_vec())
                    .set_delay(std::time::Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;

        let mut config = GleanerConfig::default();
        config.scraper.http_timeout_seconds = 1;
        config.images.timeout_seconds = 5;
        let scraper = Scraper::new(&config, None).unwrap();

        let record = scraper
            .scrape(&format!("{}/page", server.uri()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record.images.len(), 1);
        assert!(
            record.images[0].base64_data.is_some(),
            "image download must use the image deadline, not the page timeout"
        );
    }

    #[tokio::test]
    async fn test_score_link_uses_rules_without_ai() {
        let server = MockServer::start().await;
        Mock::given(path("/short"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<title>Hi</title><p>Tiny page.</p>"))
            .mount(&server)
            .await;

        let score = scraper()
            .score_link(&format!("{}/short", server.uri()), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!score.ai_used);
        assert!(!score.is_recommended);
        assert!(score.categories.contains(&"low_quality".to_string()));
    }
}
