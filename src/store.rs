//! Note persistence.
//!
//! The pipeline hands a fully rendered note body to a [`NoteSink`]; the
//! built-in [`FsNoteSink`] writes it as a markdown file under the folder
//! the orchestrator computed. The returned note id is the written path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::SinkError;

/// Destination for rendered notes.
#[async_trait]
pub trait NoteSink: Send + Sync {
    /// Write `content` as `filename` inside `folder` (created if needed).
    /// Returns an identifier for the stored note.
    async fn write(
        &self,
        folder: &str,
        filename: &str,
        content: &str,
    ) -> Result<String, SinkError>;
}

/// Filesystem sink: one markdown file per note.
///
/// Existing files are never overwritten; a ` 2`, ` 3`, ... suffix is
/// appended until a free name is found.
pub struct FsNoteSink;

impl FsNoteSink {
    pub fn new() -> Self {
        Self
    }

    fn free_path(dir: &Path, filename: &str) -> PathBuf {
        let candidate = dir.join(filename);
        if !candidate.exists() {
            return candidate;
        }

        let stem = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| filename.to_string());
        let ext = Path::new(filename)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        for n in 2.. {
            let candidate = dir.join(format!("{} {}{}", stem, n, ext));
            if !candidate.exists() {
                return candidate;
            }
        }
        unreachable!("suffix search terminates at the first free name");
    }
}

impl Default for FsNoteSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NoteSink for FsNoteSink {
    async fn write(
        &self,
        folder: &str,
        filename: &str,
        content: &str,
    ) -> Result<String, SinkError> {
        let dir = PathBuf::from(folder);
        tokio::fs::create_dir_all(&dir).await?;

        let target = Self::free_path(&dir, filename);
        tokio::fs::write(&target, content).await?;

        Ok(target.to_string_lossy().to_string())
    }
}

/// Windows device names that cannot be used as file stems.
const RESERVED_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

const MAX_FILENAME_CHARS: usize = 120;

/// Turn a note title into a safe filename stem.
///
/// Strips filesystem-reserved characters and control characters,
/// collapses whitespace, trims trailing dots and spaces, escapes reserved
/// device names, and caps the length. An empty result becomes `Untitled`.
pub fn sanitize_filename(title: &str) -> String {
    let mut cleaned = String::with_capacity(title.len());
    for c in title.chars() {
        match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => cleaned.push(' '),
            c if c.is_control() => {}
            c => cleaned.push(c),
        }
    }

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c| c == '.' || c == ' ');

    let mut name: String = trimmed.chars().take(MAX_FILENAME_CHARS).collect();
    let name_trimmed = name.trim_end_matches(|c| c == '.' || c == ' ');
    name.truncate(name_trimmed.len());

    if name.is_empty() {
        return "Untitled".to_string();
    }

    if RESERVED_NAMES.contains(&name.to_lowercase().as_str()) {
        return format!("_{}", name);
    }

    name
}
