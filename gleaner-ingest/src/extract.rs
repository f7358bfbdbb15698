//! Field extraction from parsed HTML.
//!
//! Everything here is synchronous. `scraper::Html` is not `Send`, so callers
//! parse and extract inside one non-async scope and only carry the owned
//! `PageFields` across await points.

use scraper::{ElementRef, Html, Node};
use std::collections::HashSet;
use url::Url;

use gleaner_core::models::{ExtractedImage, PageMetadata};

/// Bytes inspected when deciding whether a body is text at all.
const SNIFF_LEN: usize = 8192;

/// Fields pulled out of one page before any augmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct PageFields {
    pub title: String,
    pub text: String,
    pub images: Vec<ExtractedImage>,
    pub links: Vec<String>,
    pub metadata: PageMetadata,
}

/// A NUL byte near the start means the body is not a character stream.
/// Broken markup is fine; binary data is not.
pub fn looks_binary(body: &[u8]) -> bool {
    body.iter().take(SNIFF_LEN).any(|b| *b == 0)
}

/// Tolerant HTML parse. Invalid UTF-8 sequences are replaced, never rejected.
pub fn parse_document(body: &[u8]) -> Html {
    Html::parse_document(&String::from_utf8_lossy(body))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetaField {
    Description,
    Keywords,
    Author,
    PublishedDate,
}

#[derive(Debug, Clone, Copy)]
enum MetaKey {
    Name(&'static str),
    Property(&'static str),
}

/// Which `<meta>` tags feed which field. For each field the first tag in
/// document order with non-empty content wins.
const META_RULES: &[(MetaKey, MetaField)] = &[
    (MetaKey::Name("description"), MetaField::Description),
    (MetaKey::Property("og:description"), MetaField::Description),
    (MetaKey::Name("keywords"), MetaField::Keywords),
    (MetaKey::Name("author"), MetaField::Author),
    (MetaKey::Property("article:author"), MetaField::Author),
    (MetaKey::Property("article:published_time"), MetaField::PublishedDate),
];

struct MetaTag {
    name: Option<String>,
    property: Option<String>,
    content: String,
}

impl MetaTag {
    fn field(&self) -> Option<MetaField> {
        META_RULES.iter().find_map(|(key, field)| {
            let hit = match key {
                MetaKey::Name(n) => self.name.as_deref() == Some(*n),
                MetaKey::Property(p) => self.property.as_deref() == Some(*p),
            };
            hit.then_some(*field)
        })
    }
}

fn build_metadata(tags: &[MetaTag]) -> PageMetadata {
    let mut metadata = PageMetadata::default();
    for tag in tags {
        let content = tag.content.trim();
        if content.is_empty() {
            continue;
        }
        match tag.field() {
            Some(MetaField::Description) if metadata.description.is_none() => {
                metadata.description = Some(content.to_string());
            }
            Some(MetaField::Keywords) if metadata.keywords.is_empty() => {
                metadata.keywords = content
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            Some(MetaField::Author) if metadata.author.is_none() => {
                metadata.author = Some(content.to_string());
            }
            Some(MetaField::PublishedDate) if metadata.published_date.is_none() => {
                metadata.published_date = Some(content.to_string());
            }
            _ => {}
        }
    }
    metadata
}

fn resolve(base: &Url, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    base.join(reference).ok().map(|u| u.to_string())
}

/// Walk the document once, depth first, and collect every field.
pub fn extract_fields(document: &Html, base: &Url) -> PageFields {
    let mut title: Option<String> = None;
    let mut words: Vec<&str> = Vec::new();
    let mut images = Vec::new();
    let mut links = Vec::new();
    let mut seen_links = HashSet::new();
    let mut meta_tags = Vec::new();

    let mut stack = vec![document.tree.root()];
    while let Some(node) = stack.pop() {
        match node.value() {
            Node::Text(text) => words.extend(text.split_whitespace()),
            Node::Element(element) => match element.name() {
                "script" | "style" => continue,
                "title" if title.is_none() => {
                    title = ElementRef::wrap(node)
                        .map(|el| el.text().collect::<String>().trim().to_string());
                }
                "img" => {
                    if let Some(src) = element.attr("src").and_then(|s| resolve(base, s)) {
                        let alt = element.attr("alt").unwrap_or_default().trim();
                        images.push(ExtractedImage::new(src, alt));
                    }
                }
                "a" => {
                    if let Some(href) = element.attr("href").and_then(|h| resolve(base, h)) {
                        if seen_links.insert(href.clone()) {
                            links.push(href);
                        }
                    }
                }
                "meta" => meta_tags.push(MetaTag {
                    name: element.attr("name").map(str::to_ascii_lowercase),
                    property: element.attr("property").map(str::to_ascii_lowercase),
                    content: element.attr("content").unwrap_or_default().to_string(),
                }),
                _ => {}
            },
            _ => {}
        }
        // Reverse so the stack pops children in document order.
        for child in node.children().rev() {
            stack.push(child);
        }
    }

    let title = title
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| base.to_string());

    PageFields {
        title,
        text: words.join(" "),
        images,
        links,
        metadata: build_metadata(&meta_tags),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str, base: &str) -> PageFields {
        let base = Url::parse(base).unwrap();
        extract_fields(&parse_document(html.as_bytes()), &base)
    }

    #[test]
    fn test_extracts_title_text_images_links() {
        let page = extract(
            r#"<html><head><title>  Hello World </title>
               <style>body { color: red }</style></head>
               <body>
                 <h1>Heading</h1>
                 <p>First   paragraph
                    here.</p>
                 <script>var hidden = "nope";</script>
                 <img src="/img/a.png" alt=" A cat ">
                 <img alt="no source">
                 <a href="/about">About</a>
                 <a href="https://other.org/x">X</a>
                 <a href="/about">About again</a>
               </body></html>"#,
            "https://example.com/blog/post",
        );

        assert_eq!(page.title, "Hello World");
        assert_eq!(page.text, "Hello World Heading First paragraph here. About X About again");
        assert!(!page.text.contains("hidden"));
        assert!(!page.text.contains("color"));

        assert_eq!(page.images.len(), 1);
        assert_eq!(page.images[0].url, "https://example.com/img/a.png");
        assert_eq!(page.images[0].alt_text, "A cat");
        assert!(page.images[0].id.is_none());

        assert_eq!(
            page.links,
            vec!["https://example.com/about".to_string(), "https://other.org/x".to_string()]
        );
    }

    #[test]
    fn test_missing_title_falls_back_to_url() {
        let page = extract("<p>No title here</p>", "https://example.com/page");
        assert_eq!(page.title, "https://example.com/page");

        let blank = extract("<title>   </title><p>x</p>", "https://example.com/");
        assert_eq!(blank.title, "https://example.com/");
    }

    #[test]
    fn test_relative_references_resolve_against_base() {
        let page = extract(
            r#"<a href="../up">up</a><a href="sibling">s</a><img src="pic.jpg">"#,
            "https://example.com/a/b/page.html",
        );
        assert_eq!(
            page.links,
            vec!["https://example.com/a/up".to_string(), "https://example.com/a/b/sibling".to_string()]
        );
        assert_eq!(page.images[0].url, "https://example.com/a/b/pic.jpg");
    }

    #[test]
    fn test_metadata_first_non_empty_match_wins() {
        let page = extract(
            r#"<head>
                 <meta name="description" content="">
                 <meta property="og:description" content="From OpenGraph">
                 <meta name="Description" content="Later description">
                 <meta name="keywords" content="rust, , scraping ,html">
                 <meta property="article:author" content="Jane Doe">
                 <meta name="author" content="Someone Else">
                 <meta property="article:published_time" content="2024-03-01T10:00:00Z">
               </head><body></body>"#,
            "https://example.com/",
        );

        let metadata = page.metadata;
        assert_eq!(metadata.description.as_deref(), Some("From OpenGraph"));
        assert_eq!(metadata.keywords, vec!["rust", "scraping", "html"]);
        assert_eq!(metadata.author.as_deref(), Some("Jane Doe"));
        assert_eq!(metadata.published_date.as_deref(), Some("2024-03-01T10:00:00Z"));
    }

    #[test]
    fn test_malformed_html_still_extracts() {
        let page = extract(
            r#"<html><title>Broken</title><body><p>Unclosed <b>bold <a href="/x">link<div>tail"#,
            "https://example.com/",
        );
        assert_eq!(page.title, "Broken");
        assert_eq!(page.links, vec!["https://example.com/x".to_string()]);
        assert!(page.text.ends_with("link tail"), "text was {:?}", page.text);
    }

    #[test]
    fn test_binary_detection() {
        assert!(looks_binary(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"));
        assert!(!looks_binary(b"<html><body>plain</body></html>"));
        assert!(!looks_binary(b""));
    }
}
