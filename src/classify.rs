//! Two-phase content-type classification.
//!
//! Resolving a URL to a handler is cost-ordered: a cache hit is free,
//! URL-pattern matching (phase 1) costs nothing but a string check per
//! handler, and only when neither settles it does the classifier fetch
//! the page and ask the generation backend a forced-choice question
//! (phase 2). The fetched body is kept in a shared cache so the resolved
//! handler's own fetch step never repeats the download.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};
use url::Url;

use crate::error::ClassifyError;
use crate::extract::{strip_tags, truncate_chars};
use crate::llm::{GenerateOptions, GenerationBackend};
use crate::fetch::PageFetcher;
use crate::traits::{ContentHandler, HandlerRegistry};

/// Character budget for the page excerpt sent to the backend.
const EXCERPT_MAX_CHARS: usize = 3000;

/// Type tag of the handler used when nothing else matches.
pub const FALLBACK_TAG: &str = "article";

/// Token the backend is instructed to answer when no candidate fits.
const NO_MATCH_TOKEN: &str = "none";

/// Conversational lead-ins stripped from backend answers.
const ANSWER_PREFIXES: &[&str] = &[
    "i think this is",
    "i think it is",
    "this appears to be",
    "this looks like",
    "the content is",
    "the page is",
    "this is",
    "it is",
    "it's",
    "answer:",
    "type:",
];

pub struct Classifier {
    registry: Arc<HandlerRegistry>,
    fetcher: Arc<PageFetcher>,
    backend: Option<Arc<dyn GenerationBackend>>,
    fallback_tag: String,
    /// URL → resolved type tag. Entries never expire; stale tags (after
    /// re-registration) fall through to fresh detection.
    detection_cache: Mutex<HashMap<String, String>>,
    /// URL → raw page body fetched during phase 2, shared with the
    /// resolved handler so each URL is downloaded at most once.
    content_cache: Mutex<HashMap<String, String>>,
}

impl Classifier {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        fetcher: Arc<PageFetcher>,
        backend: Option<Arc<dyn GenerationBackend>>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            backend,
            fallback_tag: FALLBACK_TAG.to_string(),
            detection_cache: Mutex::new(HashMap::new()),
            content_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Override the fallback type tag (defaults to [`FALLBACK_TAG`]).
    pub fn with_fallback_tag(mut self, tag: impl Into<String>) -> Self {
        self.fallback_tag = tag.into();
        self
    }

    /// Resolve a URL to exactly one handler.
    pub async fn resolve(
        &self,
        url: &str,
    ) -> Result<Arc<dyn ContentHandler>, ClassifyError> {
        Url::parse(url).map_err(|e| ClassifyError::InvalidUrlFormat(e.to_string()))?;

        if let Some(tag) = lock(&self.detection_cache).get(url).cloned() {
            if let Some(handler) = self.registry.by_tag(&tag) {
                debug!(url, tag, "classification cache hit");
                return Ok(handler);
            }
            // Tag no longer names a registered handler; re-detect.
        }

        // Phase 1: URL patterns, registration order, first claim wins.
        for handler in self.registry.handlers() {
            if handler.can_handle_url(url).await {
                self.remember(url, handler.type_tag());
                debug!(url, tag = handler.type_tag(), "matched by URL");
                return Ok(handler.clone());
            }
        }

        // Phase 2: content sniffing via the generation backend.
        let candidates = self.registry.sniff_candidates();
        if !candidates.is_empty() {
            if let Some(backend) = &self.backend {
                match self.classify_by_content(url, &candidates, backend.as_ref()).await {
                    Ok(Some(handler)) => {
                        self.remember(url, handler.type_tag());
                        return Ok(handler);
                    }
                    Ok(None) => {
                        debug!(url, "content classification unrecognized; using fallback");
                    }
                    Err(err) => {
                        // A fetch/backend failure still falls back when a
                        // fallback handler exists; it only becomes
                        // terminal without one.
                        if self.registry.by_tag(&self.fallback_tag).is_none() {
                            return Err(err);
                        }
                        warn!(url, error = %err, "content classification failed; using fallback");
                    }
                }
            }
        }

        if let Some(handler) = self.registry.by_tag(&self.fallback_tag) {
            self.remember(url, handler.type_tag());
            return Ok(handler);
        }

        Err(ClassifyError::NoHandlerFound(url.to_string()))
    }

    /// Raw page body cached during phase 2, if any.
    pub fn cached_content(&self, url: &str) -> Option<String> {
        lock(&self.content_cache).get(url).cloned()
    }

    /// Empty both caches, forcing re-detection on the next resolve.
    pub fn clear_cache(&self) {
        lock(&self.detection_cache).clear();
        lock(&self.content_cache).clear();
    }

    fn remember(&self, url: &str, tag: &str) {
        lock(&self.detection_cache).insert(url.to_string(), tag.to_string());
    }

    async fn classify_by_content(
        &self,
        url: &str,
        candidates: &[Arc<dyn ContentHandler>],
        backend: &dyn GenerationBackend,
    ) -> Result<Option<Arc<dyn ContentHandler>>, ClassifyError> {
        let body = match self.cached_content(url) {
            Some(body) => body,
            None => {
                let body = self
                    .fetcher
                    .fetch_text(url)
                    .await
                    .map_err(|e| ClassifyError::ContentFetchFailed(e.to_string()))?;
                lock(&self.content_cache).insert(url.to_string(), body.clone());
                body
            }
        };

        let excerpt = truncate_chars(&strip_tags(&body), EXCERPT_MAX_CHARS);
        let prompt = classification_prompt(url, &excerpt, candidates);
        let options = GenerateOptions {
            system_prompt: Some(
                "You are a precise content classifier. Answer with a single word from \
                 the allowed list and nothing else."
                    .to_string(),
            ),
            temperature: Some(0.0),
        };

        let answer = backend
            .generate(&prompt, &options)
            .await
            .map_err(|e| ClassifyError::ContentFetchFailed(e.to_string()))?;

        let normalized = normalize_answer(&answer);
        debug!(url, raw = %answer.trim(), normalized, "backend classification answer");

        Ok(match_candidate(&normalized, candidates))
    }
}

fn classification_prompt(
    url: &str,
    excerpt: &str,
    candidates: &[Arc<dyn ContentHandler>],
) -> String {
    let mut prompt = String::from(
        "Classify the content type of the following web page.\n\nAllowed answers:\n",
    );
    for handler in candidates {
        prompt.push_str(&format!(
            "- {}: {}\n",
            handler.type_tag(),
            handler.description()
        ));
    }
    prompt.push_str(&format!(
        "- {}: none of the above\n\nURL: {}\n\nPage excerpt:\n{}\n\n\
         Reply with exactly one allowed answer.",
        NO_MATCH_TOKEN, url, excerpt
    ));
    prompt
}

/// Normalize a backend answer down to a bare candidate token.
///
/// Takes the first line, lowercases, strips conversational lead-ins and
/// surrounding punctuation.
fn normalize_answer(raw: &str) -> String {
    let mut answer = raw
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    for prefix in ANSWER_PREFIXES {
        if let Some(rest) = answer.strip_prefix(prefix) {
            answer = rest.trim_start().to_string();
        }
    }

    for article in ["a ", "an ", "the "] {
        if let Some(rest) = answer.strip_prefix(article) {
            answer = rest.trim_start().to_string();
        }
    }

    answer
        .trim_matches(|c: char| c.is_whitespace() || ".,:;!?\"'`()[]{}".contains(c))
        .to_string()
}

/// Match a normalized answer against the candidate tags.
///
/// Exact match first; when the answer contains hyphens, retry with
/// hyphens removed from both sides. Anything else is unrecognized.
fn match_candidate(
    normalized: &str,
    candidates: &[Arc<dyn ContentHandler>],
) -> Option<Arc<dyn ContentHandler>> {
    if normalized.is_empty() || normalized == NO_MATCH_TOKEN {
        return None;
    }

    for handler in candidates {
        if handler.type_tag().to_lowercase() == normalized {
            return Some(handler.clone());
        }
    }

    if normalized.contains('-') {
        let dehyphenated = normalized.replace('-', "");
        for handler in candidates {
            if handler.type_tag().to_lowercase().replace('-', "") == dehyphenated {
                return Some(handler.clone());
            }
        }
    }

    None
}

/// Poison-tolerant lock: a panicked writer never wedges classification.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::error::BackendError;
    use crate::traits::test_support::StubHandler;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedBackend {
        answer: String,
        calls: AtomicUsize,
    }

    impl CannedBackend {
        fn new(answer: &str) -> Self {
            Self {
                answer: answer.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for CannedBackend {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerateOptions,
        ) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    fn fetcher() -> Arc<PageFetcher> {
        Arc::new(PageFetcher::new(&FetchConfig::default()).unwrap())
    }

    fn classifier_with(
        handlers: Vec<Arc<dyn ContentHandler>>,
        backend: Option<Arc<dyn GenerationBackend>>,
    ) -> Classifier {
        let mut registry = HandlerRegistry::new();
        for handler in handlers {
            registry.register(handler);
        }
        Classifier::new(Arc::new(registry), fetcher(), backend)
    }

    #[tokio::test]
    async fn invalid_url_fails_fast() {
        let classifier = classifier_with(vec![], None);
        let err = classifier.resolve("not a url").await.err().unwrap();
        assert!(matches!(err, ClassifyError::InvalidUrlFormat(_)));
    }

    #[tokio::test]
    async fn url_match_wins_without_backend_call() {
        // Scenario: a handler claims the URL; the backend must stay idle.
        let widget: Arc<StubHandler> = Arc::new(StubHandler::new("widget", true, true));
        let backend = Arc::new(CannedBackend::new("widget"));
        let classifier = classifier_with(vec![widget.clone()], Some(backend.clone()));

        let resolved = classifier
            .resolve("https://example.com/known-type/123")
            .await
            .unwrap();
        assert_eq!(resolved.type_tag(), "widget");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_resolve_is_a_pure_cache_hit() {
        let widget: Arc<StubHandler> = Arc::new(StubHandler::new("widget", true, false));
        let classifier = classifier_with(vec![widget.clone()], None);

        classifier.resolve("https://example.com/a").await.unwrap();
        classifier.resolve("https://example.com/a").await.unwrap();

        // Both resolves combined invoke the URL check exactly once.
        assert_eq!(widget.url_checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_cache_entry_falls_through_to_fresh_detection() {
        // A cached tag whose handler is no longer registered must not
        // error; detection reruns and the entry is overwritten.
        let widget: Arc<StubHandler> = Arc::new(StubHandler::new("widget", true, false));
        let classifier = classifier_with(vec![widget], None);
        lock(&classifier.detection_cache)
            .insert("https://example.com/a".to_string(), "gone-tag".to_string());

        let resolved = classifier.resolve("https://example.com/a").await.unwrap();
        assert_eq!(resolved.type_tag(), "widget");
        assert_eq!(
            lock(&classifier.detection_cache)
                .get("https://example.com/a")
                .map(String::as_str),
            Some("widget")
        );
    }

    #[tokio::test]
    async fn clear_cache_forces_redetection() {
        let widget: Arc<StubHandler> = Arc::new(StubHandler::new("widget", true, false));
        let classifier = classifier_with(vec![widget.clone()], None);

        classifier.resolve("https://example.com/a").await.unwrap();
        classifier.clear_cache();
        classifier.resolve("https://example.com/a").await.unwrap();

        assert_eq!(widget.url_checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn registration_order_decides_phase_one_ties() {
        let first: Arc<StubHandler> = Arc::new(StubHandler::new("first", true, false));
        let second: Arc<StubHandler> = Arc::new(StubHandler::new("second", true, false));
        let classifier = classifier_with(vec![first, second], None);

        let resolved = classifier.resolve("https://example.com/x").await.unwrap();
        assert_eq!(resolved.type_tag(), "first");
    }

    #[tokio::test]
    async fn no_match_and_no_fallback_is_terminal() {
        let gadget: Arc<StubHandler> = Arc::new(StubHandler::new("gadget", false, false));
        let classifier = classifier_with(vec![gadget], None);

        let err = classifier.resolve("https://example.com/x").await.err().unwrap();
        assert!(matches!(err, ClassifyError::NoHandlerFound(_)));
    }

    #[tokio::test]
    async fn fallback_handler_catches_everything() {
        let gadget: Arc<StubHandler> = Arc::new(StubHandler::new("gadget", false, false));
        let article: Arc<StubHandler> = Arc::new(StubHandler::new("article", false, false));
        let classifier = classifier_with(vec![gadget, article], None);

        let resolved = classifier.resolve("https://example.com/x").await.unwrap();
        assert_eq!(resolved.type_tag(), "article");
    }

    #[tokio::test]
    async fn unrecognized_backend_answer_uses_fallback() {
        // Backend answers a token outside the candidate list. Candidates
        // exist but the fetch would hit the network, so the content cache
        // is pre-seeded the way a prior phase-2 fetch would.
        let widget: Arc<StubHandler> = Arc::new(StubHandler::new("widget", false, true));
        let article: Arc<StubHandler> = Arc::new(StubHandler::new("article", false, false));
        let backend = Arc::new(CannedBackend::new("sprocket"));
        let classifier =
            classifier_with(vec![widget, article], Some(backend));
        lock(&classifier.content_cache)
            .insert("https://example.com/x".to_string(), "<p>page</p>".to_string());

        let resolved = classifier.resolve("https://example.com/x").await.unwrap();
        assert_eq!(resolved.type_tag(), "article");
    }

    #[tokio::test]
    async fn conversational_answer_resolves_to_candidate() {
        let widget: Arc<StubHandler> = Arc::new(StubHandler::new("widget", false, true));
        let gadget: Arc<StubHandler> = Arc::new(StubHandler::new("gadget", false, true));
        let backend = Arc::new(CannedBackend::new("This is a widget."));
        let classifier = classifier_with(vec![widget, gadget], Some(backend));
        lock(&classifier.content_cache)
            .insert("https://example.com/w".to_string(), "<p>w</p>".to_string());

        let resolved = classifier.resolve("https://example.com/w").await.unwrap();
        assert_eq!(resolved.type_tag(), "widget");
    }

    #[tokio::test]
    async fn sniff_result_is_cached_for_next_resolve() {
        let widget: Arc<StubHandler> = Arc::new(StubHandler::new("widget", false, true));
        let backend = Arc::new(CannedBackend::new("widget"));
        let classifier = classifier_with(vec![widget], Some(backend.clone()));
        lock(&classifier.content_cache)
            .insert("https://example.com/w".to_string(), "<p>w</p>".to_string());

        classifier.resolve("https://example.com/w").await.unwrap();
        classifier.resolve("https://example.com/w").await.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn normalize_strips_prefixes_and_punctuation() {
        assert_eq!(normalize_answer("This is a widget."), "widget");
        assert_eq!(normalize_answer("  WIDGET \n extra line"), "widget");
        assert_eq!(normalize_answer("answer: \"recipe\""), "recipe");
        assert_eq!(normalize_answer("I think this is movie!"), "movie");
    }

    #[test]
    fn match_candidate_handles_hyphen_variants() {
        let how_to: Arc<dyn ContentHandler> =
            Arc::new(StubHandler::new("howto", false, true));
        let candidates = vec![how_to];

        assert!(match_candidate("how-to", &candidates).is_some());
        assert!(match_candidate("howto", &candidates).is_some());
        assert!(match_candidate("sprocket", &candidates).is_none());
        assert!(match_candidate("none", &candidates).is_none());
        assert!(match_candidate("", &candidates).is_none());
    }
}
