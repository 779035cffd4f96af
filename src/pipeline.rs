//! The clip pipeline: one URL in, one stored note out.
//!
//! [`NotePipeline::run`] drives the five stages (validate → classify →
//! fetch → generate → persist) sequentially, emitting one progress event
//! per stage. A stage failure stops the run and is delivered through the
//! error callbacks with a display-ready message; `run` itself never
//! returns an error — the pipeline is an event source, not a fallible
//! call. Raw causes go to the log, never to the user.

use std::sync::Arc;

use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::classify::Classifier;
use crate::error::{BackendError, ClassifyError, HandlerError, SinkError, ValidationError};
use crate::llm::{GenerateOptions, GenerationBackend};
use crate::progress::{PipelineError, PipelineEvent, PipelineStage};
use crate::store::{sanitize_filename, NoteSink};

/// System instruction sent with every generation request.
const SYSTEM_PROMPT: &str = "You turn web content into concise, well-structured \
markdown notes. Output only the note body in markdown, no preamble.";

type ProgressFn = Box<dyn Fn(&PipelineEvent) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&PipelineError) + Send + Sync>;
type CompleteFn = Box<dyn Fn(&str) + Send + Sync>;

pub struct NotePipeline {
    classifier: Arc<Classifier>,
    backend: Option<Arc<dyn GenerationBackend>>,
    sink: Arc<dyn NoteSink>,
    /// Root folder; handler folders nest inside it.
    default_folder: String,
    on_progress: Vec<ProgressFn>,
    on_error: Vec<ErrorFn>,
    on_complete: Vec<CompleteFn>,
}

impl NotePipeline {
    pub fn new(
        classifier: Arc<Classifier>,
        backend: Option<Arc<dyn GenerationBackend>>,
        sink: Arc<dyn NoteSink>,
        default_folder: impl Into<String>,
    ) -> Self {
        Self {
            classifier,
            backend,
            sink,
            default_folder: default_folder.into(),
            on_progress: Vec::new(),
            on_error: Vec::new(),
            on_complete: Vec::new(),
        }
    }

    /// Attach a progress listener. Listeners are invoked in registration
    /// order, synchronously, once per stage entered.
    pub fn on_progress<F>(&mut self, callback: F)
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.on_progress.push(Box::new(callback));
    }

    /// Attach an error listener. At most one error is delivered per run.
    pub fn on_error<F>(&mut self, callback: F)
    where
        F: Fn(&PipelineError) + Send + Sync + 'static,
    {
        self.on_error.push(Box::new(callback));
    }

    /// Attach a completion listener, invoked exactly once per successful
    /// run with the stored note id.
    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_complete.push(Box::new(callback));
    }

    /// Run the full pipeline for one URL.
    ///
    /// Never fails from the caller's point of view: completion and errors
    /// are both reported through the registered callbacks. Concurrent
    /// runs are independent; they share only the classifier's caches.
    pub async fn run(&self, url: &str) {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("clip_run", run_id = %run_id, url = %url);

        async {
            match self.run_stages(url).await {
                Ok(note_id) => {
                    info!(note_id, "clip completed");
                    let event = PipelineEvent::Completed {
                        note_id: note_id.clone(),
                        message: format!("Note saved: {}", note_id),
                    };
                    self.emit(&event);
                    for callback in &self.on_complete {
                        callback(&note_id);
                    }
                }
                Err(failure) => {
                    error!(
                        stage = failure.stage,
                        cause = %failure.cause,
                        "clip failed"
                    );
                    for callback in &self.on_error {
                        callback(&failure);
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_stages(&self, url: &str) -> Result<String, PipelineError> {
        self.enter(PipelineStage::ValidatingUrl);
        url::Url::parse(url).map_err(|e| {
            fail(
                PipelineStage::ValidatingUrl,
                ClassifyError::InvalidUrlFormat(e.to_string()),
            )
        })?;

        self.enter(PipelineStage::ClassifyingContent);
        let handler = self
            .classifier
            .resolve(url)
            .await
            .map_err(|e| fail(PipelineStage::ClassifyingContent, e))?;
        info!(tag = handler.type_tag(), "resolved content handler");

        self.enter(PipelineStage::FetchingContent);
        let cached = self.classifier.cached_content(url);
        let record = handler
            .fetch(url, cached.as_deref())
            .await
            .map_err(|e| fail(PipelineStage::FetchingContent, e))?;

        self.enter(PipelineStage::GeneratingOutput);
        let backend = self.backend.as_ref().ok_or_else(|| {
            fail(PipelineStage::GeneratingOutput, BackendError::NotConfigured)
        })?;
        let prompt = handler
            .build_prompt(&record)
            .map_err(|e| fail(PipelineStage::GeneratingOutput, e))?;
        let options = GenerateOptions {
            system_prompt: Some(SYSTEM_PROMPT.to_string()),
            temperature: None,
        };
        let generated = backend
            .generate(&prompt, &options)
            .await
            .map_err(|e| fail(PipelineStage::GeneratingOutput, e))?;
        let mut output = handler.parse_generated(&generated);
        if !handler.validate_output(&mut output) {
            return Err(fail(PipelineStage::GeneratingOutput, ValidationError));
        }

        self.enter(PipelineStage::PersistingDocument);
        let folder = format!(
            "{}/{}",
            self.default_folder.trim_end_matches('/'),
            handler.folder_for(Some(&record))
        );
        let filename = format!("{}.md", sanitize_filename(&record.title));
        let body = handler.render(&generated, &record);
        let note_id = self
            .sink
            .write(&folder, &filename, &body)
            .await
            .map_err(|e| fail(PipelineStage::PersistingDocument, e))?;

        Ok(note_id)
    }

    fn enter(&self, stage: PipelineStage) {
        let event = PipelineEvent::Stage {
            stage,
            message: stage.message().to_string(),
            step: stage.step(),
            total_steps: PipelineStage::TOTAL_STEPS,
        };
        self.emit(&event);
    }

    fn emit(&self, event: &PipelineEvent) {
        for callback in &self.on_progress {
            callback(event);
        }
    }
}

/// Build a [`PipelineError`] for a stage failure.
///
/// Known error kinds carry their own user message; anything else gets a
/// generic stage-appropriate sentence. The raw cause rides along for
/// logging.
fn fail(stage: PipelineStage, cause: impl Into<anyhow::Error>) -> PipelineError {
    let cause = cause.into();
    PipelineError {
        stage: stage.error_tag(),
        user_message: user_message_for(stage, &cause),
        cause,
    }
}

fn user_message_for(stage: PipelineStage, cause: &anyhow::Error) -> String {
    if let Some(e) = cause.downcast_ref::<ClassifyError>() {
        return e.user_message().to_string();
    }
    if let Some(e) = cause.downcast_ref::<HandlerError>() {
        return e.user_message().to_string();
    }
    if let Some(e) = cause.downcast_ref::<BackendError>() {
        return e.user_message().to_string();
    }
    if let Some(e) = cause.downcast_ref::<SinkError>() {
        return e.user_message().to_string();
    }
    if cause.downcast_ref::<ValidationError>().is_some() {
        return "The generated note was incomplete. Please try again.".to_string();
    }

    match stage.error_tag() {
        "validating_url" => "Couldn't process this URL.".to_string(),
        "downloading_content" => "Couldn't download the page content.".to_string(),
        "processing_with_llm" => "Couldn't generate the note content.".to_string(),
        _ => "Couldn't save the note.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::fetch::PageFetcher;
    use crate::traits::test_support::StubHandler;
    use crate::traits::HandlerRegistry;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedBackend {
        result: Result<String, fn() -> BackendError>,
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
            match &self.result {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    struct MemorySink {
        fail_with: Option<fn() -> SinkError>,
        written: Mutex<Vec<(String, String, String)>>,
    }

    impl MemorySink {
        fn new() -> Self {
            Self {
                fail_with: None,
                written: Mutex::new(Vec::new()),
            }
        }

        fn failing(make: fn() -> SinkError) -> Self {
            Self {
                fail_with: Some(make),
                written: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NoteSink for MemorySink {
        async fn write(
            &self,
            folder: &str,
            filename: &str,
            content: &str,
        ) -> Result<String, SinkError> {
            if let Some(make) = self.fail_with {
                return Err(make());
            }
            let id = format!("{}/{}", folder, filename);
            self.written.lock().unwrap().push((
                folder.to_string(),
                filename.to_string(),
                content.to_string(),
            ));
            Ok(id)
        }
    }

    struct Recorded {
        progress: Vec<(String, u8)>,
        errors: Vec<(String, String)>,
        completions: Vec<String>,
        completed_events: Vec<String>,
    }

    fn pipeline_with(
        handler: Arc<StubHandler>,
        backend: Option<Arc<dyn GenerationBackend>>,
        sink: Arc<dyn NoteSink>,
    ) -> (NotePipeline, Arc<Mutex<Recorded>>) {
        let mut registry = HandlerRegistry::new();
        registry.register(handler);
        let fetcher = Arc::new(PageFetcher::new(&FetchConfig::default()).unwrap());
        let classifier = Arc::new(Classifier::new(Arc::new(registry), fetcher, None));

        let mut pipeline = NotePipeline::new(classifier, backend, sink, "/vault");

        let recorded = Arc::new(Mutex::new(Recorded {
            progress: Vec::new(),
            errors: Vec::new(),
            completions: Vec::new(),
            completed_events: Vec::new(),
        }));

        let r = recorded.clone();
        pipeline.on_progress(move |event| {
            let mut rec = r.lock().unwrap();
            match event {
                PipelineEvent::Stage { stage, step, .. } => {
                    rec.progress.push((stage.error_tag().to_string(), *step));
                }
                PipelineEvent::Completed { note_id, .. } => {
                    rec.completed_events.push(note_id.clone());
                }
            }
        });
        let r = recorded.clone();
        pipeline.on_error(move |err| {
            r.lock()
                .unwrap()
                .errors
                .push((err.stage.to_string(), err.user_message.clone()));
        });
        let r = recorded.clone();
        pipeline.on_complete(move |id| {
            r.lock().unwrap().completions.push(id.to_string());
        });

        (pipeline, recorded)
    }

    fn ok_backend() -> Arc<dyn GenerationBackend> {
        Arc::new(CannedBackend {
            result: Ok("generated note body".to_string()),
        })
    }

    #[tokio::test]
    async fn successful_run_emits_all_stages_then_completes_once() {
        let handler = Arc::new(StubHandler::new("widget", true, false));
        let sink = Arc::new(MemorySink::new());
        let (pipeline, recorded) = pipeline_with(handler, Some(ok_backend()), sink.clone());

        pipeline.run("https://example.com/widget/1").await;

        let rec = recorded.lock().unwrap();
        let steps: Vec<u8> = rec.progress.iter().map(|(_, s)| *s).collect();
        assert_eq!(steps, vec![1, 2, 3, 4, 5]);
        assert_eq!(rec.completions.len(), 1);
        assert_eq!(rec.completed_events.len(), 1);
        assert_eq!(rec.completions[0], rec.completed_events[0]);
        assert!(rec.errors.is_empty());

        let written = sink.written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, "/vault/Stubs");
        assert_eq!(written[0].1, "Stub Title.md");
        assert!(written[0].2.contains("generated note body"));
    }

    #[tokio::test]
    async fn invalid_url_stops_at_stage_one() {
        let handler = Arc::new(StubHandler::new("widget", true, false));
        let (pipeline, recorded) =
            pipeline_with(handler, Some(ok_backend()), Arc::new(MemorySink::new()));

        pipeline.run("not a url").await;

        let rec = recorded.lock().unwrap();
        assert_eq!(rec.progress.len(), 1);
        assert_eq!(rec.errors.len(), 1);
        assert_eq!(rec.errors[0].0, "validating_url");
        assert!(rec.completions.is_empty());
        assert!(rec.completed_events.is_empty());
    }

    #[tokio::test]
    async fn no_handler_failure_is_attributed_to_validation() {
        let handler = Arc::new(StubHandler::new("widget", false, false));
        let (pipeline, recorded) =
            pipeline_with(handler, Some(ok_backend()), Arc::new(MemorySink::new()));

        pipeline.run("https://example.com/unknown").await;

        let rec = recorded.lock().unwrap();
        // validating + classifying entered, nothing after.
        assert_eq!(rec.progress.len(), 2);
        assert_eq!(rec.errors.len(), 1);
        assert_eq!(rec.errors[0].0, "validating_url");
        assert!(rec.completions.is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_maps_to_downloading_content() {
        let mut handler = StubHandler::new("widget", true, false);
        handler.fetch_fails = true;
        let (pipeline, recorded) =
            pipeline_with(Arc::new(handler), Some(ok_backend()), Arc::new(MemorySink::new()));

        pipeline.run("https://example.com/widget").await;

        let rec = recorded.lock().unwrap();
        assert_eq!(rec.progress.len(), 3);
        assert_eq!(rec.errors.len(), 1);
        assert_eq!(rec.errors[0].0, "downloading_content");
        assert!(rec.completions.is_empty());
    }

    #[tokio::test]
    async fn missing_backend_fails_generation_stage() {
        let handler = Arc::new(StubHandler::new("widget", true, false));
        let (pipeline, recorded) = pipeline_with(handler, None, Arc::new(MemorySink::new()));

        pipeline.run("https://example.com/widget").await;

        let rec = recorded.lock().unwrap();
        assert_eq!(rec.progress.len(), 4);
        assert_eq!(rec.errors[0].0, "processing_with_llm");
        assert!(rec.errors[0].1.contains("No AI provider"));
    }

    #[tokio::test]
    async fn auth_failure_surfaces_api_key_message() {
        let handler = Arc::new(StubHandler::new("widget", true, false));
        let backend: Arc<dyn GenerationBackend> = Arc::new(CannedBackend {
            result: Err(|| BackendError::Auth("401".to_string())),
        });
        let (pipeline, recorded) =
            pipeline_with(handler, Some(backend), Arc::new(MemorySink::new()));

        pipeline.run("https://example.com/widget").await;

        let rec = recorded.lock().unwrap();
        assert_eq!(rec.errors[0].0, "processing_with_llm");
        assert!(rec.errors[0].1.contains("API key"));
        // The raw status never reaches the user message.
        assert!(!rec.errors[0].1.contains("401"));
    }

    #[tokio::test]
    async fn rejected_validation_fails_generation_stage() {
        let mut handler = StubHandler::new("widget", true, false);
        handler.validate_ok = false;
        let (pipeline, recorded) =
            pipeline_with(Arc::new(handler), Some(ok_backend()), Arc::new(MemorySink::new()));

        pipeline.run("https://example.com/widget").await;

        let rec = recorded.lock().unwrap();
        assert_eq!(rec.progress.len(), 4);
        assert_eq!(rec.errors[0].0, "processing_with_llm");
        assert!(rec.errors[0].1.contains("incomplete"));
    }

    #[tokio::test]
    async fn permission_denied_sink_maps_to_writing_note() {
        let handler = Arc::new(StubHandler::new("widget", true, false));
        let sink = Arc::new(MemorySink::failing(|| {
            SinkError::PermissionDenied("read-only vault".to_string())
        }));
        let (pipeline, recorded) = pipeline_with(handler, Some(ok_backend()), sink);

        pipeline.run("https://example.com/widget").await;

        let rec = recorded.lock().unwrap();
        assert_eq!(rec.progress.len(), 5);
        assert_eq!(rec.errors.len(), 1);
        assert_eq!(rec.errors[0].0, "writing_note");
        assert!(rec.errors[0].1.contains("Permission denied"));
        assert!(rec.completions.is_empty());
        assert!(rec.completed_events.is_empty());
    }

    #[tokio::test]
    async fn listeners_fire_in_registration_order() {
        let handler = Arc::new(StubHandler::new("widget", true, false));
        let mut registry = HandlerRegistry::new();
        registry.register(handler);
        let fetcher = Arc::new(PageFetcher::new(&FetchConfig::default()).unwrap());
        let classifier = Arc::new(Classifier::new(Arc::new(registry), fetcher, None));
        let mut pipeline = NotePipeline::new(
            classifier,
            Some(ok_backend()),
            Arc::new(MemorySink::new()),
            "/vault",
        );

        let order = Arc::new(Mutex::new(Vec::new()));
        let o = order.clone();
        pipeline.on_complete(move |_| o.lock().unwrap().push("first"));
        let o = order.clone();
        pipeline.on_complete(move |_| o.lock().unwrap().push("second"));

        pipeline.run("https://example.com/widget").await;

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }
}
