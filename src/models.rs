//! Core data models that flow through the clip pipeline.

use std::collections::BTreeMap;

/// Normalized extraction result produced by a handler's fetch step.
///
/// Every record carries at least a title and the source URL; everything
/// else is handler-specific. The record is built once per run and is
/// read-only afterwards (prompt building, validation, rendering all take
/// it by shared reference).
#[derive(Debug, Clone)]
pub struct ContentRecord {
    pub title: String,
    pub url: String,
    pub author: Option<String>,
    pub image_url: Option<String>,
    /// Main body text (already stripped of markup), when the handler
    /// extracted one.
    pub content: Option<String>,
    /// Handler-specific extras (e.g. `year`, `isbn`, `video_id`).
    pub extra: BTreeMap<String, String>,
}

impl ContentRecord {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            author: None,
            image_url: None,
            content: None,
            extra: BTreeMap::new(),
        }
    }

    /// Render a YAML frontmatter block for this record.
    ///
    /// Shared by all handlers' `render` implementations; optional fields
    /// are skipped when absent.
    pub fn frontmatter(&self, type_tag: &str) -> String {
        let mut out = String::from("---\n");
        out.push_str(&format!("title: \"{}\"\n", yaml_escape(&self.title)));
        out.push_str(&format!("source: {}\n", self.url));
        out.push_str(&format!("type: {}\n", type_tag));
        if let Some(author) = &self.author {
            out.push_str(&format!("author: \"{}\"\n", yaml_escape(author)));
        }
        if let Some(image) = &self.image_url {
            out.push_str(&format!("image: {}\n", image));
        }
        for (key, value) in &self.extra {
            out.push_str(&format!("{}: \"{}\"\n", key, yaml_escape(value)));
        }
        out.push_str(&format!(
            "clipped: {}\n",
            chrono::Utc::now().format("%Y-%m-%d")
        ));
        out.push_str("---\n");
        out
    }
}

fn yaml_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
