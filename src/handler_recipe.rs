//! Recipe handler.
//!
//! Recipe sites ship structured data as JSON-LD, so extraction prefers
//! the `Recipe` block and falls back to OpenGraph tags. Validation is
//! stricter than other handlers: a recipe note without an ingredients
//! section is useless, so the generated output must contain one.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerError;
use crate::extract::{json_ld_block, meta_property, page_title, strip_tags, truncate_chars};
use crate::fetch::PageFetcher;
use crate::models::ContentRecord;
use crate::traits::{url_host_matches, ContentHandler};

const RECIPE_DOMAINS: &[&str] = &[
    "allrecipes.com",
    "seriouseats.com",
    "bonappetit.com",
    "epicurious.com",
    "food52.com",
];

const CONTENT_MAX_CHARS: usize = 10_000;

pub struct RecipeHandler {
    fetcher: Arc<PageFetcher>,
}

impl RecipeHandler {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// Parse the page's JSON-LD `Recipe` object, if any.
    ///
    /// Handles both a bare object and the `@graph` wrapper some sites
    /// use.
    fn recipe_json(html: &str) -> Option<Value> {
        let block = json_ld_block(html, "Recipe")?;
        let parsed: Value = serde_json::from_str(block.trim()).ok()?;
        Self::find_recipe(&parsed).cloned()
    }

    fn find_recipe(value: &Value) -> Option<&Value> {
        match value {
            Value::Object(obj) => {
                let is_recipe = match obj.get("@type") {
                    Some(Value::String(t)) => t == "Recipe",
                    Some(Value::Array(types)) => {
                        types.iter().any(|t| t.as_str() == Some("Recipe"))
                    }
                    _ => false,
                };
                if is_recipe {
                    return Some(value);
                }
                obj.get("@graph").and_then(Self::find_recipe)
            }
            Value::Array(items) => items.iter().find_map(Self::find_recipe),
            _ => None,
        }
    }

    fn string_list(value: &Value, key: &str) -> Vec<String> {
        value
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        Value::Object(obj) => obj
                            .get("text")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ContentHandler for RecipeHandler {
    fn type_tag(&self) -> &str {
        "recipe"
    }

    fn description(&self) -> &str {
        "a cooking recipe with ingredients and preparation steps"
    }

    fn requires_content_sniff(&self) -> bool {
        true
    }

    async fn can_handle_url(&self, url: &str) -> bool {
        url_host_matches(url, RECIPE_DOMAINS)
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

        let recipe = Self::recipe_json(&html);

        let title = recipe
            .as_ref()
            .and_then(|r| r.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| meta_property(&html, "og:title"))
            .or_else(|| page_title(&html))
            .ok_or(HandlerError::MissingField("title"))?;

        let mut record = ContentRecord::new(title, url);
        record.author = recipe.as_ref().and_then(|r| match r.get("author") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Object(obj)) => obj
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        });
        record.image_url = meta_property(&html, "og:image");

        if let Some(recipe) = &recipe {
            let ingredients = Self::string_list(recipe, "recipeIngredient");
            if !ingredients.is_empty() {
                record
                    .extra
                    .insert("ingredients".to_string(), ingredients.join("; "));
            }
            let steps = Self::string_list(recipe, "recipeInstructions");
            if !steps.is_empty() {
                record
                    .extra
                    .insert("instructions".to_string(), steps.join(" | "));
            }
            if let Some(total) = recipe.get("totalTime").and_then(Value::as_str) {
                record.extra.insert("total_time".to_string(), total.to_string());
            }
        }

        record.content = Some(truncate_chars(&strip_tags(&html), CONTENT_MAX_CHARS));
        Ok(record)
    }

    fn build_prompt(&self, record: &ContentRecord) -> Result<String, HandlerError> {
        // Structured data beats scraped text when the site provided it.
        let source = match record.extra.get("ingredients") {
            Some(ingredients) => format!(
                "Ingredients: {}\nInstructions: {}",
                ingredients,
                record
                    .extra
                    .get("instructions")
                    .map(String::as_str)
                    .unwrap_or("(not listed)")
            ),
            None => record
                .content
                .clone()
                .ok_or(HandlerError::MissingField("content"))?,
        };
        Ok(format!(
            "Rewrite this recipe as a markdown note with exactly two sections: \
`## Ingredients` as a bullet list and `## Steps` as a numbered list.\n\n\
Recipe: {}\n\n{}",
            record.title, source
        ))
    }

    fn parse_generated(&self, text: &str) -> Value {
        let lower = text.to_lowercase();
        serde_json::json!({
            "note": text.trim(),
            "has_ingredients": lower.contains("## ingredients"),
            "has_steps": lower.contains("## steps"),
        })
    }

    fn validate_output(&self, output: &mut Value) -> bool {
        let has = |key: &str| {
            output
                .get(key)
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };
        has("has_ingredients") && has("has_steps")
    }

    fn render(&self, generated: &str, record: &ContentRecord) -> String {
        format!(
            "{}\n# {}\n\n{}\n",
            record.frontmatter(self.type_tag()),
            record.title,
            generated.trim()
        )
    }

    fn folder_for(&self, _record: Option<&ContentRecord>) -> String {
        "Recipes".to_string()
    }
}
