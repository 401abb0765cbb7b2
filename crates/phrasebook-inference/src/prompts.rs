//! Prompts for phrase categorization and suggestion, and parsers for their replies.

use serde::Deserialize;

use phrasebook_core::{defaults, Category, Error, GeneratedPhrase, GenerationRequest, Result, Settings};

/// System instruction for categorization. The model must answer with one label.
pub const CATEGORIZE_SYSTEM_PROMPT: &str = "Categorize this phrase into one of these categories: Professional, Philosophical, Humorous, Motivational, Technical, Creative, Life Wisdom. Respond with only the category name.";

/// System instruction for generating a new phrase as a JSON object.
pub const SUGGESTION_SYSTEM_PROMPT: &str = "You are a wise philosopher and productivity expert. Generate a unique, meaningful phrase, quote, or thought that can be used for daily inspiration or productivity. It should be profound yet practical. Return ONLY the JSON object with keys 'text' and 'source'. Do not wrap in markdown code blocks.";

/// User message for generation.
pub const SUGGESTION_USER_PROMPT: &str = "Generate a phrase.";

/// Build the categorization call for `text`. Returns `None` without an API key.
pub fn categorization_request(settings: &Settings, text: &str) -> Option<GenerationRequest> {
    let api_key = settings.api_key()?;
    Some(GenerationRequest {
        api_key: api_key.to_string(),
        model: settings.effective_model().to_string(),
        system: CATEGORIZE_SYSTEM_PROMPT.to_string(),
        prompt: text.to_string(),
        max_tokens: Some(defaults::CATEGORIZE_MAX_TOKENS),
        json_object: false,
    })
}

/// Build the suggestion call. Returns `None` without an API key.
pub fn suggestion_request(settings: &Settings) -> Option<GenerationRequest> {
    let api_key = settings.api_key()?;
    Some(GenerationRequest {
        api_key: api_key.to_string(),
        model: settings.effective_model().to_string(),
        system: SUGGESTION_SYSTEM_PROMPT.to_string(),
        prompt: SUGGESTION_USER_PROMPT.to_string(),
        max_tokens: None,
        json_object: true,
    })
}

/// Accept the reply only if, once trimmed, it is exactly one of the labels.
pub fn parse_category(content: &str) -> Option<Category> {
    content.trim().parse().ok()
}

#[derive(Deserialize)]
struct SuggestionPayload {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

/// Parse the `{"text", "source"}` object returned for a suggestion.
pub fn parse_generated_phrase(content: &str) -> Result<GeneratedPhrase> {
    let payload: SuggestionPayload = serde_json::from_str(content.trim())
        .map_err(|e| Error::Inference(format!("Malformed suggestion payload: {}", e)))?;

    let text = payload
        .text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::Inference("Suggestion has no text".to_string()))?;

    let source = payload
        .source
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| defaults::GENERATED_SOURCE.to_string());

    Ok(GeneratedPhrase { text, source })
}
