//! Movie handler for film database and review sites.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::error::HandlerError;
use crate::extract::{
    json_ld_block, json_ld_string, meta_property, page_title, strip_tags, truncate_chars,
};
use crate::fetch::PageFetcher;
use crate::models::ContentRecord;
use crate::traits::{url_host_matches, ContentHandler};

const MOVIE_DOMAINS: &[&str] = &["imdb.com", "letterboxd.com", "rottentomatoes.com"];

const CONTENT_MAX_CHARS: usize = 8_000;

pub struct MovieHandler {
    fetcher: Arc<PageFetcher>,
}

impl MovieHandler {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Pull a release year out of a title like `Arrival (2016)`.
    fn year_from_title(title: &str) -> Option<String> {
        let re = Regex::new(r"\((19|20)\d{2}\)").ok()?;
        re.find(title)
            .map(|m| m.as_str().trim_matches(&['(', ')'][..]).to_string())
    }
}

#[async_trait]
impl ContentHandler for MovieHandler {
    fn type_tag(&self) -> &str {
        "movie"
    }

    fn description(&self) -> &str {
        "a film or TV listing with a title, director, and synopsis"
    }

    fn requires_content_sniff(&self) -> bool {
        true
    }

    async fn can_handle_url(&self, url: &str) -> bool {
        url_host_matches(url, MOVIE_DOMAINS)
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

        let block = json_ld_block(&html, "Movie");

        let title = block
            .as_deref()
            .and_then(|b| json_ld_string(b, "name"))
            .or_else(|| meta_property(&html, "og:title"))
            .or_else(|| page_title(&html))
            .ok_or(HandlerError::MissingField("title"))?;

        let mut record = ContentRecord::new(title, url);
        record.image_url = meta_property(&html, "og:image");

        if let Some(block) = &block {
            // Only the plain-string director form; nested Person objects
            // fall through to the meta tag below.
            if let Some(director) = json_ld_string(block, "director")
                .filter(|d| !d.is_empty())
            {
                record.author = Some(director);
            }
            if let Some(date) = json_ld_string(block, "datePublished") {
                let year = date.chars().take(4).collect::<String>();
                record.extra.insert("year".to_string(), year);
            }
        }
        if record.author.is_none() {
            record.author = meta_property(&html, "video:director");
        }
        if !record.extra.contains_key("year") {
            if let Some(year) = Self::year_from_title(&record.title) {
                record.extra.insert("year".to_string(), year);
            }
        }
        if let Some(synopsis) = meta_property(&html, "og:description") {
            record.extra.insert("synopsis".to_string(), synopsis);
        }

        record.content = Some(truncate_chars(&strip_tags(&html), CONTENT_MAX_CHARS));
        Ok(record)
    }

    fn build_prompt(&self, record: &ContentRecord) -> Result<String, HandlerError> {
        let synopsis = record
            .extra
            .get("synopsis")
            .map(String::as_str)
            .or(record.content.as_deref())
            .ok_or(HandlerError::MissingField("synopsis"))?;
        Ok(format!(
            "Write a spoiler-free markdown note about this film: premise, tone, \
and who would enjoy it. Keep it under 150 words.\n\n\
Title: {}\nYear: {}\nSynopsis:\n{}",
            record.title,
            record.extra.get("year").map(String::as_str).unwrap_or("unknown"),
            synopsis
        ))
    }

    fn parse_generated(&self, text: &str) -> Value {
        serde_json::json!({ "note": text.trim() })
    }

    fn validate_output(&self, output: &mut Value) -> bool {
        output
            .get("note")
            .and_then(Value::as_str)
            .map(|s| !s.is_empty())
            .unwrap_or(false)
    }

    fn render(&self, generated: &str, record: &ContentRecord) -> String {
        let year = record
            .extra
            .get("year")
            .map(|y| format!(" ({})", y))
            .unwrap_or_default();
        format!(
            "{}\n# {}{}\n\n{}\n",
            record.frontmatter(self.type_tag()),
            record.title,
            year,
            generated.trim()
        )
    }

    fn folder_for(&self, _record: Option<&ContentRecord>) -> String {
        "Movies".to_string()
    }
}
