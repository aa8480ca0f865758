//! Structured (JSON-shaped) completions
//!
//! Every structured call embeds the expected schema, strips markdown fences
//! from the reply and parses it into a fixed field set. Anything that does
//! not match is an `InvalidResponse`; partial results are never returned.

use delve_core::{CompletionRequest, DelveError, DelveResult, LanguageModel};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Complete `prompt` and parse the reply into `T`
pub async fn complete_structured<T>(
    model: &dyn LanguageModel,
    system: Option<&str>,
    prompt: &str,
) -> DelveResult<T>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = serde_json::to_value(schemars::schema_for!(T))?;
    let mut request = CompletionRequest::new(prompt).with_schema(schema);
    if let Some(system) = system {
        request = request.with_system(system);
    }

    let response = model.complete(request).await?;
    parse_structured(&response)
}

/// Parse a model reply into `T`
pub fn parse_structured<T: DeserializeOwned>(response: &str) -> DelveResult<T> {
    let json_part = extract_json_block(response);
    serde_json::from_str(json_part).map_err(|e| {
        debug!(error = %e, "Response did not match expected shape");
        DelveError::invalid_response(
            format!("Response did not match expected shape: {}", e),
            "structured",
        )
    })
}

/// Pull the JSON payload out of a reply that may wrap it in code fences
pub fn extract_json_block(response: &str) -> &str {
    if let Some((_, rest)) = response.split_once("```json") {
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    if let Some((_, rest)) = response.split_once("```") {
        return rest.split("```").next().unwrap_or(rest).trim();
    }
    response.trim()
}
