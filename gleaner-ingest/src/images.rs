//! Image download and analysis.
//!
//! Each image gets an id, a size-capped download under its own deadline and,
//! when that works, an AI caption. Failures keep the image in the list with
//! whatever was learned so far. Output order always equals discovery order.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};
use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use gleaner_core::config::ImageConfig;
use gleaner_core::models::ExtractedImage;

use crate::augment::Augmenter;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("failed to fetch image: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error: status {0}")]
    Status(u16),

    #[error("image too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("image download timed out after {0:?}")]
    Timeout(Duration),

    #[error("image download cancelled")]
    Cancelled,
}

pub struct ImagePipeline {
    client: Client,
    config: ImageConfig,
    user_agent: String,
    augmenter: Augmenter,
}

impl ImagePipeline {
    pub fn new(client: Client, config: ImageConfig, user_agent: String, augmenter: Augmenter) -> Self {
        Self {
            client,
            config,
            user_agent,
            augmenter,
        }
    }

    /// Download one image, bounded by the byte ceiling and the per-image deadline.
    pub async fn download(&self, url: &str, cancel: &CancellationToken) -> Result<Bytes, ImageError> {
        let timeout = self.config.timeout();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ImageError::Cancelled),
            result = tokio::time::timeout(timeout, self.fetch_capped(url)) => {
                result.unwrap_or(Err(ImageError::Timeout(timeout)))
            }
        }
    }

    async fn fetch_capped(&self, url: &str) -> Result<Bytes, ImageError> {
        let max = self.config.max_size_bytes;
        let mut response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .timeout(self.config.timeout())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Status(status.as_u16()));
        }

        if let Some(advertised) = response.content_length() {
            if advertised > max {
                return Err(ImageError::TooLarge {
                    size: advertised,
                    max,
                });
            }
        }

        // The advertised length can be missing or wrong, so count what arrives.
        let mut buffer = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            let received = (buffer.len() + chunk.len()) as u64;
            if received > max {
                return Err(ImageError::TooLarge { size: received, max });
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }

    async fn process_one(&self, mut image: ExtractedImage, cancel: &CancellationToken) -> ExtractedImage {
        image.id = Some(Uuid::new_v4());

        let data = match self.download(&image.url, cancel).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(url = %image.url, error = %e, "Image download failed, keeping bare entry");
                return image;
            }
        };

        tracing::debug!(url = %image.url, bytes = data.len(), "Downloaded image");
        image.base64_data = Some(STANDARD.encode(&data));

        let analysis = self
            .augmenter
            .analyze_image(&data, &image.alt_text, cancel)
            .await;
        image.summary = analysis.value.summary;
        image.tags = analysis.value.tags;
        image
    }

    /// Download and analyze every image. Returns the list untouched when
    /// image analysis is disabled.
    pub async fn process(
        &self,
        images: Vec<ExtractedImage>,
        cancel: &CancellationToken,
    ) -> Vec<ExtractedImage> {
        if !self.config.enabled {
            tracing::debug!(count = images.len(), "Image analysis disabled");
            return images;
        }
        let total = images.len();
        let processed: Vec<ExtractedImage> = stream::iter(images)
            .map(|image| self.process_one(image, cancel))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;
        let analyzed = processed.iter().filter(|i| i.summary.is_some()).count();
        tracing::debug!(total, analyzed, "Processed images");
        processed
    }
}
