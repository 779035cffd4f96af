//! Restaurant handler for review and booking sites.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerError;
use crate::extract::{
    json_ld_block, json_ld_string, meta_property, page_title, strip_tags, truncate_chars,
};
use crate::fetch::PageFetcher;
use crate::models::ContentRecord;
use crate::traits::{url_host_matches, ContentHandler};

const RESTAURANT_DOMAINS: &[&str] = &["yelp.com", "tripadvisor.com", "opentable.com"];

const CONTENT_MAX_CHARS: usize = 8_000;

pub struct RestaurantHandler {
    fetcher: Arc<PageFetcher>,
}

impl RestaurantHandler {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl ContentHandler for RestaurantHandler {
    fn type_tag(&self) -> &str {
        "restaurant"
    }

    fn description(&self) -> &str {
        "a restaurant, cafe, or bar listing with location and reviews"
    }

    fn requires_content_sniff(&self) -> bool {
        true
    }

    async fn can_handle_url(&self, url: &str) -> bool {
        url_host_matches(url, RESTAURANT_DOMAINS)
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

        let block = json_ld_block(&html, "Restaurant");

        let title = block
            .as_deref()
            .and_then(|b| json_ld_string(b, "name"))
            .or_else(|| meta_property(&html, "og:title"))
            .or_else(|| page_title(&html))
            .ok_or(HandlerError::MissingField("title"))?;

        let mut record = ContentRecord::new(title, url);
        record.image_url = meta_property(&html, "og:image");

        if let Some(block) = &block {
            if let Some(cuisine) = json_ld_string(block, "servesCuisine") {
                record.extra.insert("cuisine".to_string(), cuisine);
            }
            if let Some(price) = json_ld_string(block, "priceRange") {
                record.extra.insert("price_range".to_string(), price);
            }
            if let Some(phone) = json_ld_string(block, "telephone") {
                record.extra.insert("phone".to_string(), phone);
            }
            // Address blocks nest; the street line is the useful part.
            if let Some(street) = json_ld_string(block, "streetAddress") {
                let locality = json_ld_string(block, "addressLocality");
                let address = match locality {
                    Some(city) => format!("{}, {}", street, city),
                    None => street,
                };
                record.extra.insert("address".to_string(), address);
            }
        }

        record.content = Some(truncate_chars(&strip_tags(&html), CONTENT_MAX_CHARS));
        Ok(record)
    }

    fn build_prompt(&self, record: &ContentRecord) -> Result<String, HandlerError> {
        let content = record
            .content
            .as_deref()
            .ok_or(HandlerError::MissingField("content"))?;
        let mut facts = String::new();
        for key in ["cuisine", "price_range", "address"] {
            if let Some(value) = record.extra.get(key) {
                facts.push_str(&format!("{}: {}\n", key, value));
            }
        }
        Ok(format!(
            "Write a short markdown note about this restaurant: what kind of \
food, the vibe, and anything reviewers highlight. End with a `**Worth \
noting:**` line.\n\nName: {}\n{}\nPage text:\n{}",
            record.title, facts, content
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
        if let Some(address) = record.extra.get("address") {
            note.push_str(&format!("**Address:** {}\n\n", address));
        }
        note.push_str(generated.trim());
        note.push('\n');
        note
    }

    fn folder_for(&self, _record: Option<&ContentRecord>) -> String {
        "Restaurants".to_string()
    }
}
