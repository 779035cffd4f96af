//! Book handler for catalog and review sites.

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

const BOOK_DOMAINS: &[&str] = &["goodreads.com", "openlibrary.org", "books.google.com"];

const CONTENT_MAX_CHARS: usize = 8_000;

pub struct BookHandler {
    fetcher: Arc<PageFetcher>,
}

impl BookHandler {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Find an ISBN-10 or ISBN-13 anywhere in the page text.
    fn find_isbn(text: &str) -> Option<String> {
        let re = Regex::new(r"\b(?:97[89][- ]?)?\d{1,5}[- ]?\d{1,7}[- ]?\d{1,7}[- ]?[\dX]\b")
            .ok()?;
        let isbn = re
            .find_iter(text)
            .map(|m| m.as_str().replace(&['-', ' '][..], ""))
            .find(|digits| digits.len() == 10 || digits.len() == 13);
        isbn
    }
}

#[async_trait]
impl ContentHandler for BookHandler {
    fn type_tag(&self) -> &str {
        "book"
    }

    fn description(&self) -> &str {
        "a book listing with a title, author, and description"
    }

    fn requires_content_sniff(&self) -> bool {
        true
    }

    async fn can_handle_url(&self, url: &str) -> bool {
        url_host_matches(url, BOOK_DOMAINS)
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

        let block = json_ld_block(&html, "Book");

        let title = block
            .as_deref()
            .and_then(|b| json_ld_string(b, "name"))
            .or_else(|| meta_property(&html, "og:title"))
            .or_else(|| page_title(&html))
            .ok_or(HandlerError::MissingField("title"))?;

        let mut record = ContentRecord::new(title, url);
        record.image_url = meta_property(&html, "og:image");
        record.author = meta_property(&html, "books:author")
            .or_else(|| block.as_deref().and_then(|b| json_ld_string(b, "author")));

        let isbn = meta_property(&html, "books:isbn")
            .or_else(|| block.as_deref().and_then(|b| json_ld_string(b, "isbn")))
            .or_else(|| Self::find_isbn(&html));
        if let Some(isbn) = isbn {
            record.extra.insert("isbn".to_string(), isbn);
        }
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
            "Write a markdown note about this book: what it's about, its main \
themes, and who should read it. Keep it under 200 words.\n\n\
Title: {}\nAuthor: {}\nDescription:\n{}",
            record.title,
            record.author.as_deref().unwrap_or("unknown"),
            description
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
        let mut note = format!(
            "{}\n# {}\n\n",
            record.frontmatter(self.type_tag()),
            record.title
        );
        if let Some(author) = &record.author {
            note.push_str(&format!("*by {}*\n\n", author));
        }
        note.push_str(generated.trim());
        note.push('\n');
        note
    }

    fn folder_for(&self, _record: Option<&ContentRecord>) -> String {
        "Books".to_string()
    }
}
