use tokio_util::sync::CancellationToken;

use crate::augment::{Augmented, Augmenter};

/// Narrows a page's raw links to the ones pointing at substantive content.
/// Never loses links because the AI failed.
#[derive(Clone)]
pub struct LinkSanitizer {
    augmenter: Augmenter,
}

impl LinkSanitizer {
    pub fn new(augmenter: Augmenter) -> Self {
        Self { augmenter }
    }

    pub async fn sanitize(
        &self,
        raw: Vec<String>,
        title: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Augmented<Vec<String>> {
        if raw.is_empty() {
            return Augmented {
                value: raw,
                ai_used: false,
            };
        }
        let filtered = self.augmenter.filter_links(&raw, title, content, cancel).await;
        tracing::debug!(
            raw = raw.len(),
            kept = filtered.value.len(),
            ai_used = filtered.ai_used,
            "Sanitized links"
        );
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::tests::{augmenter_with, ScriptedBackend};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_empty_list_skips_the_ai() {
        let backend = ScriptedBackend::new(&["[]"], &[]);
        let sanitizer = LinkSanitizer::new(augmenter_with(backend.clone()));
        let result = sanitizer
            .sanitize(vec![], "t", "c", &CancellationToken::new())
            .await;
        assert!(result.value.is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_returns_raw_links() {
        let raw = vec!["https://example.com/a".to_string(), "https://example.com/b".to_string()];
        let sanitizer = LinkSanitizer::new(augmenter_with(ScriptedBackend::new(&[], &[])));
        let result = sanitizer
            .sanitize(raw.clone(), "t", "c", &CancellationToken::new())
            .await;
        assert!(!result.ai_used);
        assert_eq!(result.value, raw);
    }
}
