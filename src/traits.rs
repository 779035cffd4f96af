//! The content-handler trait and its registry.
//!
//! A [`ContentHandler`] is a pluggable unit that knows how to recognize,
//! fetch, and transform one kind of page (recipe, movie, article, ...).
//! The [`HandlerRegistry`] holds handler instances in registration order;
//! the classifier walks it during URL-based detection, so order matters:
//! specific handlers first, the generic fallback last.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::HandlerError;
use crate::models::ContentRecord;

/// A pluggable unit covering one content type end to end.
///
/// # Lifecycle within a run
///
/// 1. `can_handle_url` / `requires_content_sniff` during classification.
/// 2. `fetch` turns the page into a [`ContentRecord`].
/// 3. `build_prompt` feeds the record to the generation backend.
/// 4. `parse_generated` + `validate_output` check the model's answer.
/// 5. `render` + `folder_for` shape the final note.
#[async_trait]
pub trait ContentHandler: Send + Sync {
    /// Unique type tag, e.g. `"recipe"`. Used as cache key and as the
    /// candidate token during content-based classification.
    fn type_tag(&self) -> &str;

    /// One-line description shown to the classification backend.
    fn description(&self) -> &str;

    /// Whether this handler participates in content-based (phase 2)
    /// detection when no URL pattern matched.
    fn requires_content_sniff(&self) -> bool {
        false
    }

    /// Cheap URL-based ownership check. Async because a handler may need
    /// to probe the URL (e.g. follow a shortener redirect).
    async fn can_handle_url(&self, url: &str) -> bool;

    /// Fetch and normalize the page. `cached_body` carries the raw page
    /// the classifier already downloaded, avoiding a second round-trip.
    async fn fetch(
        &self,
        url: &str,
        cached_body: Option<&str>,
    ) -> Result<ContentRecord, HandlerError>;

    /// Build the generation prompt. Fails when a required field is absent
    /// from the record.
    fn build_prompt(&self, record: &ContentRecord) -> Result<String, HandlerError>;

    /// The handler's own parse of the raw generated text into a
    /// structured value for validation.
    fn parse_generated(&self, text: &str) -> Value;

    /// Validate (and optionally patch safe defaults into) the parsed
    /// output. Returning `false` fails the generation stage.
    fn validate_output(&self, output: &mut Value) -> bool;

    /// Render the final note body from the generated text and the record.
    fn render(&self, generated: &str, record: &ContentRecord) -> String;

    /// Folder (relative to the notes root) this content type belongs in.
    fn folder_for(&self, record: Option<&ContentRecord>) -> String;
}

/// `true` when the URL's host is one of `domains` or a subdomain of one.
///
/// Shared by handlers' `can_handle_url` implementations; a leading
/// `www.` never counts against the match.
pub fn url_host_matches(url: &str, domains: &[&str]) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.strip_prefix("www.").unwrap_or(host);
    domains
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
}

/// Ordered registry of content handlers.
///
/// Insertion order is significant: URL-based detection returns the first
/// handler that claims a URL. Type-keyed lookups return the
/// last-registered handler for a tag, so a re-registered handler shadows
/// an earlier one without the earlier entry being removed.
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn ContentHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Append a handler. Duplicate type tags are allowed; the newest wins
    /// in [`by_tag`](Self::by_tag) lookups.
    pub fn register(&mut self, handler: Arc<dyn ContentHandler>) {
        self.handlers.push(handler);
    }

    /// All handlers in registration order.
    pub fn handlers(&self) -> &[Arc<dyn ContentHandler>] {
        &self.handlers
    }

    /// Look a handler up by type tag (last-registered wins).
    pub fn by_tag(&self, tag: &str) -> Option<Arc<dyn ContentHandler>> {
        self.handlers
            .iter()
            .rev()
            .find(|h| h.type_tag() == tag)
            .cloned()
    }

    /// The subset of handlers that take part in content-based detection,
    /// in registration order.
    pub fn sniff_candidates(&self) -> Vec<Arc<dyn ContentHandler>> {
        self.handlers
            .iter()
            .filter(|h| h.requires_content_sniff())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Registry pre-loaded with all built-in handlers.
    ///
    /// Registration order puts URL-recognizable types first and the
    /// generic article handler (the classification fallback) last.
    pub fn with_defaults(fetcher: &Arc<crate::fetch::PageFetcher>) -> Self {
        use crate::handler_article::ArticleHandler;
        use crate::handler_book::BookHandler;
        use crate::handler_movie::MovieHandler;
        use crate::handler_recipe::RecipeHandler;
        use crate::handler_restaurant::RestaurantHandler;
        use crate::handler_video::VideoHandler;

        let mut registry = Self::new();
        registry.register(Arc::new(VideoHandler::new(fetcher.clone())));
        registry.register(Arc::new(RecipeHandler::new(fetcher.clone())));
        registry.register(Arc::new(RestaurantHandler::new(fetcher.clone())));
        registry.register(Arc::new(MovieHandler::new(fetcher.clone())));
        registry.register(Arc::new(BookHandler::new(fetcher.clone())));
        registry.register(Arc::new(ArticleHandler::new(fetcher.clone())));
        registry
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Minimal scriptable handler used by classifier and pipeline tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct StubHandler {
        pub tag: String,
        pub sniff: bool,
        pub url_match: bool,
        pub url_checks: AtomicUsize,
        pub fetch_fails: bool,
        pub validate_ok: bool,
    }

    impl StubHandler {
        pub fn new(tag: &str, url_match: bool, sniff: bool) -> Self {
            Self {
                tag: tag.to_string(),
                sniff,
                url_match,
                url_checks: AtomicUsize::new(0),
                fetch_fails: false,
                validate_ok: true,
            }
        }
    }

    #[async_trait]
    impl ContentHandler for StubHandler {
        fn type_tag(&self) -> &str {
            &self.tag
        }

        fn description(&self) -> &str {
            "a stub content type"
        }

        fn requires_content_sniff(&self) -> bool {
            self.sniff
        }

        async fn can_handle_url(&self, _url: &str) -> bool {
            self.url_checks.fetch_add(1, Ordering::SeqCst);
            self.url_match
        }

        async fn fetch(
            &self,
            url: &str,
            cached_body: Option<&str>,
        ) -> Result<ContentRecord, HandlerError> {
            if self.fetch_fails {
                return Err(HandlerError::ContentUnavailable("stubbed".to_string()));
            }
            let mut record = ContentRecord::new("Stub Title", url);
            record.content = Some(
                cached_body
                    .map(str::to_string)
                    .unwrap_or_else(|| "stub body".to_string()),
            );
            Ok(record)
        }

        fn build_prompt(&self, record: &ContentRecord) -> Result<String, HandlerError> {
            let content = record
                .content
                .as_deref()
                .ok_or(HandlerError::MissingField("content"))?;
            Ok(format!("summarize: {}", content))
        }

        fn parse_generated(&self, text: &str) -> Value {
            serde_json::json!({ "body": text })
        }

        fn validate_output(&self, output: &mut Value) -> bool {
            if let Some(obj) = output.as_object_mut() {
                obj.entry("checked").or_insert(Value::Bool(true));
            }
            self.validate_ok
        }

        fn render(&self, generated: &str, record: &ContentRecord) -> String {
            format!("{}\n{}", record.frontmatter(&self.tag), generated)
        }

        fn folder_for(&self, _record: Option<&ContentRecord>) -> String {
            "Stubs".to_string()
        }
    }
}
