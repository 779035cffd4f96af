//! HTML field-extraction helpers shared by the content handlers.
//!
//! Handlers work on raw page markup with lightweight regex matching:
//! `<meta>` tags (Open Graph and plain `name=` variants), the `<title>`
//! element, and JSON-LD blocks. This is deliberately not a full HTML
//! parser; handlers only need a handful of well-known fields.

use regex::{Regex, RegexBuilder};

/// Extract the `content` attribute of a `<meta property="...">` tag.
///
/// Handles both attribute orders (`property` before or after `content`).
pub fn meta_property(html: &str, property: &str) -> Option<String> {
    meta_attr(html, "property", property).or_else(|| meta_attr(html, "name", property))
}

/// Extract the `content` attribute of a `<meta name="...">` tag.
pub fn meta_name(html: &str, name: &str) -> Option<String> {
    meta_attr(html, "name", name)
}

fn meta_attr(html: &str, attr: &str, value: &str) -> Option<String> {
    let tag_re = RegexBuilder::new(&format!(
        r#"<meta\b[^>]*{}\s*=\s*["']{}["'][^>]*>"#,
        attr,
        regex::escape(value)
    ))
    .case_insensitive(true)
    .build()
    .ok()?;
    let tag = tag_re.find(html)?.as_str();

    let content_re = RegexBuilder::new(r#"content\s*=\s*["']([^"']*)["']"#)
        .case_insensitive(true)
        .build()
        .ok()?;
    let content = content_re.captures(tag)?.get(1)?.as_str();
    let decoded = decode_entities(content);
    let trimmed = decoded.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Extract the text of the `<title>` element.
pub fn page_title(html: &str) -> Option<String> {
    let re = RegexBuilder::new(r"<title[^>]*>([^<]*)</title>")
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .ok()?;
    let raw = re.captures(html)?.get(1)?.as_str();
    let decoded = decode_entities(raw);
    let trimmed = decoded.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Find the first JSON-LD block whose body mentions the given `@type`.
///
/// Returns the raw JSON text of the block. Handlers regex-match fields
/// inside it rather than fully deserializing (schema.org payloads in the
/// wild are too irregular for strict typing).
pub fn json_ld_block(html: &str, type_name: &str) -> Option<String> {
    let re = RegexBuilder::new(
        r#"<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#,
    )
    .case_insensitive(true)
    .dot_matches_new_line(true)
    .build()
    .ok()?;

    let type_re = RegexBuilder::new(&format!(
        r#""@type"\s*:\s*"?{}"#,
        regex::escape(type_name)
    ))
    .case_insensitive(true)
    .build()
    .ok()?;

    for caps in re.captures_iter(html) {
        let body = caps.get(1)?.as_str();
        if type_re.is_match(body) {
            return Some(body.trim().to_string());
        }
    }
    None
}

/// Extract a string field (`"key": "value"`) from a JSON-LD block.
pub fn json_ld_string(block: &str, key: &str) -> Option<String> {
    let re = Regex::new(&format!(
        r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#,
        regex::escape(key)
    ))
    .ok()?;
    let raw = re.captures(block)?.get(1)?.as_str();
    let unescaped = raw.replace("\\\"", "\"").replace("\\/", "/");
    let trimmed = unescaped.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Strip markup from an HTML document, returning readable plain text.
///
/// Removes `<script>` and `<style>` bodies entirely, drops the remaining
/// tags, decodes common entities, and collapses whitespace.
pub fn strip_tags(html: &str) -> String {
    let no_scripts = remove_element(html, "script");
    let no_styles = remove_element(&no_scripts, "style");

    let tag_re = Regex::new(r"<[^>]+>").expect("static regex");
    let text = tag_re.replace_all(&no_styles, " ");

    let decoded = decode_entities(&text);
    let ws_re = Regex::new(r"\s+").expect("static regex");
    ws_re.replace_all(&decoded, " ").trim().to_string()
}

fn remove_element(html: &str, element: &str) -> String {
    let re = RegexBuilder::new(&format!(r"<{e}\b.*?</{e}>", e = element))
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .expect("static regex");
    re.replace_all(html, " ").to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
}

/// Truncate to at most `max` characters, appending an ellipsis marker
/// when anything was cut. Respects char boundaries.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <title> The &amp; Page </title>
        <meta property="og:title" content="OG Title" />
        <meta content="https://img.example/x.jpg" property="og:image">
        <meta name="author" content="Sam Author">
        <script type="application/ld+json">
        {"@context":"https://schema.org","@type":"Recipe","name":"Soup","author":{"@type":"Person","name":"Chef"}}
        </script>
        <style>body { color: red; }</style>
        <script>var hidden = "nope";</script>
        </head><body><h1>Hello</h1><p>World &amp; friends</p></body></html>"#;

    #[test]
    fn meta_property_both_attribute_orders() {
        assert_eq!(meta_property(PAGE, "og:title").as_deref(), Some("OG Title"));
        assert_eq!(
            meta_property(PAGE, "og:image").as_deref(),
            Some("https://img.example/x.jpg")
        );
    }

    #[test]
    fn meta_name_basic() {
        assert_eq!(meta_name(PAGE, "author").as_deref(), Some("Sam Author"));
        assert_eq!(meta_name(PAGE, "missing"), None);
    }

    #[test]
    fn page_title_decodes_entities() {
        assert_eq!(page_title(PAGE).as_deref(), Some("The & Page"));
    }

    #[test]
    fn json_ld_block_matches_type() {
        let block = json_ld_block(PAGE, "Recipe").expect("recipe block");
        assert!(block.contains("Soup"));
        assert_eq!(json_ld_string(&block, "name").as_deref(), Some("Soup"));
        assert!(json_ld_block(PAGE, "Movie").is_none());
    }

    #[test]
    fn strip_tags_drops_scripts_and_styles() {
        let text = strip_tags(PAGE);
        assert!(text.contains("Hello"));
        assert!(text.contains("World & friends"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn truncate_appends_ellipsis_only_when_cut() {
        assert_eq!(truncate_chars("short", 10), "short");
        let cut = truncate_chars("abcdefghij", 4);
        assert_eq!(cut, "abcd…");
    }
}
