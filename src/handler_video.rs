//! Video handler for YouTube and Vimeo links.
//!
//! Recognized purely by URL, so it skips content sniffing.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerError;
use crate::extract::{meta_name, meta_property, page_title, strip_tags, truncate_chars};
use crate::fetch::PageFetcher;
use crate::models::ContentRecord;
use crate::traits::{url_host_matches, ContentHandler};

const VIDEO_DOMAINS: &[&str] = &["youtube.com", "youtu.be", "vimeo.com"];

const CONTENT_MAX_CHARS: usize = 6_000;

pub struct VideoHandler {
    fetcher: Arc<PageFetcher>,
}

impl VideoHandler {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl ContentHandler for VideoHandler {
    fn type_tag(&self) -> &str {
        "video"
    }

    fn description(&self) -> &str {
        "an online video with a title, channel, and description"
    }

    async fn can_handle_url(&self, url: &str) -> bool {
        url_host_matches(url, VIDEO_DOMAINS)
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
            .ok_or(HandlerError::MissingField("title"))?;

        let mut record = ContentRecord::new(title, url);
        record.author = meta_name(&html, "author")
            .or_else(|| meta_property(&html, "og:video:tag"));
        record.image_url = meta_property(&html, "og:image");
        if let Some(desc) = meta_property(&html, "og:description") {
            record.extra.insert("description".to_string(), desc);
        }
        record.content = Some(truncate_chars(&strip_tags(&html), CONTENT_MAX_CHARS));
        Ok(record)
    }

    fn build_prompt(&self, record: &ContentRecord) -> Result<String, HandlerError> {
        let description = record
            .extra
            .get("description")
            .map(String::as_str)
            .or(record.content.as_deref())
            .ok_or(HandlerError::MissingField("description"))?;
        Ok(format!(
            "Write a short markdown note about this video: what it covers and \
why someone might watch it. Keep it under 150 words.\n\n\
Title: {}\nChannel: {}\nDescription:\n{}",
            record.title,
            record.author.as_deref().unwrap_or("unknown"),
            description
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
            "{}\n# {}\n\n{}\n\n[Watch]({})\n",
            record.frontmatter(self.type_tag()),
            record.title,
            generated.trim(),
            record.url
        )
    }

    fn folder_for(&self, _record: Option<&ContentRecord>) -> String {
        "Videos".to_string()
    }
}
