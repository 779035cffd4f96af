//! Pipeline progress events and CLI reporters.
//!
//! The pipeline emits one [`PipelineEvent`] per stage plus a final
//! completion event; reporters turn those into human or JSON lines on
//! **stderr** so stdout stays parseable (it carries only the note id).

use std::io::Write;

/// The five sequential stages of a clip run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PipelineStage {
    ValidatingUrl,
    ClassifyingContent,
    FetchingContent,
    GeneratingOutput,
    PersistingDocument,
}

impl PipelineStage {
    pub const TOTAL_STEPS: u8 = 5;

    /// 1-based position in the run, for percentage rendering.
    pub fn step(&self) -> u8 {
        match self {
            Self::ValidatingUrl => 1,
            Self::ClassifyingContent => 2,
            Self::FetchingContent => 3,
            Self::GeneratingOutput => 4,
            Self::PersistingDocument => 5,
        }
    }

    /// Stage name used in progress events.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ValidatingUrl => "validating",
            Self::ClassifyingContent => "classifying",
            Self::FetchingContent => "fetching",
            Self::GeneratingOutput => "generating",
            Self::PersistingDocument => "persisting",
        }
    }

    /// Stage name used in error events.
    ///
    /// URL validation and classification share a tag: from the user's
    /// point of view "bad URL" and "unsupported page" are one concept.
    pub fn error_tag(&self) -> &'static str {
        match self {
            Self::ValidatingUrl | Self::ClassifyingContent => "validating_url",
            Self::FetchingContent => "downloading_content",
            Self::GeneratingOutput => "processing_with_llm",
            Self::PersistingDocument => "writing_note",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::ValidatingUrl => "Validating URL...",
            Self::ClassifyingContent => "Detecting content type...",
            Self::FetchingContent => "Downloading content...",
            Self::GeneratingOutput => "Generating note...",
            Self::PersistingDocument => "Writing note...",
        }
    }
}

/// A single progress event emitted by the pipeline.
#[derive(Clone, Debug)]
pub enum PipelineEvent {
    /// A stage was entered. `step`/`total_steps` let callers render a
    /// percentage without knowing the stage list.
    Stage {
        stage: PipelineStage,
        message: String,
        step: u8,
        total_steps: u8,
    },
    /// The run finished; `note_id` identifies the stored note.
    Completed { note_id: String, message: String },
}

/// A stage failure delivered through the error callbacks.
#[derive(Debug)]
pub struct PipelineError {
    /// One of `validating_url`, `downloading_content`,
    /// `processing_with_llm`, `writing_note`.
    pub stage: &'static str,
    /// Pre-sanitized, display-ready sentence. Never contains the raw
    /// cause.
    pub user_message: String,
    /// Original failure, for logging only.
    pub cause: anyhow::Error,
}

/// Renders pipeline events. Implementations write to stderr.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &PipelineEvent);
}

/// Human-friendly lines: `[2/5] Detecting content type...`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: &PipelineEvent) {
        let line = match event {
            PipelineEvent::Stage {
                message,
                step,
                total_steps,
                ..
            } => format!("[{}/{}] {}\n", step, total_steps, message),
            PipelineEvent::Completed { note_id, .. } => {
                format!("done: {}\n", note_id)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
    }
}

/// Machine-readable progress: one JSON object per line.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: &PipelineEvent) {
        let obj = match event {
            PipelineEvent::Stage {
                stage,
                message,
                step,
                total_steps,
            } => serde_json::json!({
                "event": "progress",
                "stage": stage.name(),
                "message": message,
                "step": step,
                "total_steps": total_steps,
                "percent": (f64::from(*step) / f64::from(*total_steps) * 100.0).round(),
            }),
            PipelineEvent::Completed { note_id, message } => serde_json::json!({
                "event": "completed",
                "note_id": note_id,
                "message": message,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: &PipelineEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode; the caller attaches it to the
    /// pipeline's progress callbacks.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
