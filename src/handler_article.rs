//! Generic article handler: the classification fallback.
//!
//! Never claims a URL by pattern; every page that no specific handler
//! recognizes (and that content sniffing can't place) lands here.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerError;
use crate::extract::{meta_property, page_title, strip_tags, truncate_chars};
use crate::fetch::PageFetcher;
use crate::models::ContentRecord;
use crate::traits::ContentHandler;

/// Page text beyond this length is trimmed before prompting.
const CONTENT_MAX_CHARS: usize = 12_000;

pub struct ArticleHandler {
    fetcher: Arc<PageFetcher>,
}

impl ArticleHandler {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl ContentHandler for ArticleHandler {
    fn type_tag(&self) -> &str {
        "article"
    }

    fn description(&self) -> &str {
        "a written article, blog post, essay, or news story"
    }

    fn requires_content_sniff(&self) -> bool {
        true
    }

    async fn can_handle_url(&self, _url: &str) -> bool {
        // Fallback handler: reached by tag lookup, never by URL match.
        false
    }

    async fn fetch(
        &self,
        url: &str,
        cached_body: Option<&str>,
    ) -> Result<ContentRecord, HandlerError> {
        let html = match cached_body {
            Some(body) => body.to_string(),
            None => self.fetcher.fetch_text(url).await?,
        };

        let title = meta_property(&html, "og:title")
            .or_else(|| page_title(&html))
            .unwrap_or_else(|| url.to_string());

        let mut record = ContentRecord::new(title, url);
        record.author = meta_property(&html, "author")
            .or_else(|| meta_property(&html, "article:author"));
        record.image_url = meta_property(&html, "og:image");
        if let Some(site) = meta_property(&html, "og:site_name") {
            record.extra.insert("site".to_string(), site);
        }
        record.content = Some(truncate_chars(&strip_tags(&html), CONTENT_MAX_CHARS));
        Ok(record)
    }

    fn build_prompt(&self, record: &ContentRecord) -> Result<String, HandlerError> {
        let content = record
            .content
            .as_deref()
            .ok_or(HandlerError::MissingField("content"))?;
        Ok(format!(
            "Summarize the following article as a markdown note. Start with a \
one-paragraph summary, then list the key points as bullets.\n\n\
Title: {}\n\nArticle text:\n{}",
            record.title, content
        ))
    }

    fn parse_generated(&self, text: &str) -> Value {
        serde_json::json!({ "summary": text.trim() })
    }

    fn validate_output(&self, output: &mut Value) -> bool {
        output
            .get("summary")
            .and_then(Value::as_str)
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }

    fn render(&self, generated: &str, record: &ContentRecord) -> String {
        format!(
            "{}\n# {}\n\n{}\n",
            record.frontmatter(self.type_tag()),
            record.title,
            generated.trim()
        )
    }

    fn folder_for(&self, _record: Option<&ContentRecord>) -> String {
        "Articles".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;

    const PAGE: &str = r#"<html><head>
        <title>Fallback Title</title>
        <meta property="og:title" content="How Rust Borrowing Works">
        <meta name="author" content="Jo Writer">
        <meta property="og:site_name" content="Rust Weekly">
        </head><body><article><p>Ownership is the core idea.</p></article></body></html>"#;

    fn handler() -> ArticleHandler {
        let fetcher = Arc::new(PageFetcher::new(&FetchConfig::default()).unwrap());
        ArticleHandler::new(fetcher)
    }

    #[tokio::test]
    async fn fetch_prefers_og_title_and_keeps_metadata() {
        let record = handler()
            .fetch("https://example.com/post", Some(PAGE))
            .await
            .unwrap();

        assert_eq!(record.title, "How Rust Borrowing Works");
        assert_eq!(record.author.as_deref(), Some("Jo Writer"));
        assert_eq!(record.extra.get("site").map(String::as_str), Some("Rust Weekly"));
        assert!(record.content.unwrap().contains("Ownership is the core idea."));
    }

    #[tokio::test]
    async fn fetch_falls_back_to_title_tag() {
        let html = "<html><head><title>Plain Page</title></head><body>x</body></html>";
        let record = handler()
            .fetch("https://example.com", Some(html))
            .await
            .unwrap();
        assert_eq!(record.title, "Plain Page");
    }

    #[tokio::test]
    async fn never_claims_urls() {
        assert!(!handler().can_handle_url("https://example.com/post").await);
    }

    #[test]
    fn prompt_requires_content() {
        let record = ContentRecord::new("t", "https://example.com");
        assert!(matches!(
            handler().build_prompt(&record),
            Err(HandlerError::MissingField("content"))
        ));
    }

    #[test]
    fn empty_generation_is_rejected() {
        let h = handler();
        let mut ok = h.parse_generated("A summary.");
        assert!(h.validate_output(&mut ok));
        let mut empty = h.parse_generated("   ");
        assert!(!h.validate_output(&mut empty));
    }

    #[test]
    fn render_includes_frontmatter_and_heading() {
        let h = handler();
        let record = ContentRecord::new("A Post", "https://example.com/a");
        let note = h.render("Body text.", &record);
        assert!(note.starts_with("---\n"));
        assert!(note.contains("type: article"));
        assert!(note.contains("# A Post"));
        assert!(note.trim_end().ends_with("Body text."));
    }
}
