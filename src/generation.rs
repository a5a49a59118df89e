use crate::model::{ReferenceImage, ShotPitch, ShotSpec};
use crate::prompts;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Typed failure taxonomy at the generation-service boundary. Credential
/// problems are classified here, once, so callers never parse message text.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid or unauthorized API credentials: {0}")]
    Credential(String),
    #[error("Could not break the script into a shot list.")]
    EmptyShotList,
    #[error("No image data found in response.")]
    MissingImagePayload,
    #[error("Generation API error: {0}")]
    Api(String),
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse model output: {0}")]
    Parse(String),
}

impl GenerationError {
    pub fn is_credential(&self) -> bool {
        matches!(self, GenerationError::Credential(_))
    }
}

/// Maps an upstream error message to the typed taxonomy. The substrings are
/// the ones the Gemini API is known to emit for key and permission problems.
pub fn classify_api_error(message: String) -> GenerationError {
    if message.contains("Requested entity was not found.")
        || message.contains("API_KEY_INVALID")
        || message.contains("API key not valid")
        || message.to_lowercase().contains("permission denied")
    {
        GenerationError::Credential(message)
    } else {
        GenerationError::Api(message)
    }
}

/// The three remote capabilities the pipeline depends on. Stateless; one
/// request per call, no retries or caching.
#[async_trait]
pub trait GenerationClient: Send + Sync + Debug {
    async fn generate_shot_list(&self, script: &str) -> Result<Vec<ShotPitch>, GenerationError>;

    async fn generate_spec(
        &self,
        pitch: &str,
        shot_id: &str,
        full_script: &str,
    ) -> Result<ShotSpec, GenerationError>;

    /// Returns the rendered keyframe as base64.
    async fn generate_keyframe(
        &self,
        spec: &ShotSpec,
        reference_images: &[ReferenceImage],
    ) -> Result<String, GenerationError>;
}

#[derive(Debug)]
pub struct GeminiClient {
    api_key: String,
    text_model: String,
    image_model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: &str, text_model: &str, image_model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            text_model: text_model.to_string(),
            image_model: image_model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn request(
        &self,
        model: &str,
        body: &GeminiRequest,
    ) -> Result<GeminiResponse, GenerationError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            model, self.api_key
        );

        log::debug!("POST generateContent model={}", model);
        let resp = self.client.post(&url).json(body).send().await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await?;
            log::warn!("Gemini API error ({}): {}", model, error_text);
            return Err(classify_api_error(error_text));
        }

        let response_text = resp.text().await?;
        let result: GeminiResponse = serde_json::from_str(&response_text).map_err(|e| {
            GenerationError::Parse(format!(
                "Unexpected Gemini response: {}. Body: {}",
                e, response_text
            ))
        })?;

        if let Some(err) = result.error {
            return Err(classify_api_error(err.message));
        }

        Ok(result)
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate_shot_list(&self, script: &str) -> Result<Vec<ShotPitch>, GenerationError> {
        let body = GeminiRequest {
            contents: vec![GeminiContent::user_text(script)],
            system_instruction: Some(GeminiSystemInstruction::from_text(
                prompts::SHOT_LIST_SYSTEM_PROMPT,
            )),
            generation_config: Some(GenerationConfig::json()),
        };

        let resp = self.request(&self.text_model, &body).await?;
        let text = extract_text(&resp)?;
        let cleaned = strip_code_blocks(&text);
        let shot_list: Vec<ShotPitch> = serde_json::from_str(&cleaned).map_err(|e| {
            GenerationError::Parse(format!("Invalid shot list JSON: {}. Body: {}", e, cleaned))
        })?;

        if shot_list.is_empty() {
            return Err(GenerationError::EmptyShotList);
        }
        Ok(shot_list)
    }

    async fn generate_spec(
        &self,
        pitch: &str,
        shot_id: &str,
        full_script: &str,
    ) -> Result<ShotSpec, GenerationError> {
        let body = GeminiRequest {
            contents: vec![GeminiContent::user_text(&prompts::spec_user_prompt(
                pitch,
                shot_id,
                full_script,
            ))],
            system_instruction: Some(GeminiSystemInstruction::from_text(
                prompts::SHOT_SPEC_SYSTEM_PROMPT,
            )),
            generation_config: Some(GenerationConfig::json()),
        };

        let resp = self.request(&self.text_model, &body).await?;
        let text = extract_text(&resp)?;
        let cleaned = strip_code_blocks(&text);
        let mut spec: ShotSpec = serde_json::from_str(&cleaned).map_err(|e| {
            GenerationError::Parse(format!("Invalid shot spec JSON: {}. Body: {}", e, cleaned))
        })?;

        // The spec is keyed by the requested shot id regardless of what the
        // model echoed back.
        spec.shot_id = shot_id.to_string();
        Ok(spec)
    }

    async fn generate_keyframe(
        &self,
        spec: &ShotSpec,
        reference_images: &[ReferenceImage],
    ) -> Result<String, GenerationError> {
        let mut parts = vec![GeminiPart::text(&prompts::keyframe_prompt(spec))];
        for image in reference_images {
            parts.push(GeminiPart::inline_image(&image.data, &image.mime_type));
        }

        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts,
            }],
            system_instruction: None,
            generation_config: Some(GenerationConfig::image()),
        };

        let resp = self.request(&self.image_model, &body).await?;
        extract_image(&resp)
    }
}

// --- Wire types ---

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn user_text(text: &str) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![GeminiPart::text(text)],
        }
    }
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

impl GeminiSystemInstruction {
    fn from_text(text: &str) -> Self {
        Self {
            parts: vec![GeminiPart::text(text)],
        }
    }
}

#[derive(Serialize)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl GeminiPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }

    fn inline_image(data: &str, mime_type: &str) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            }),
        }
    }
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(rename = "responseModalities", skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
}

impl GenerationConfig {
    fn json() -> Self {
        Self {
            response_mime_type: Some("application/json".to_string()),
            response_modalities: None,
        }
    }

    fn image() -> Self {
        Self {
            response_mime_type: None,
            response_modalities: Some(vec!["IMAGE".to_string()]),
        }
    }
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Deserialize)]
struct GeminiPartResponse {
    text: Option<String>,
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineDataResponse>,
}

#[derive(Deserialize)]
struct InlineDataResponse {
    data: String,
}

#[derive(Deserialize, Debug)]
struct GeminiError {
    message: String,
}

fn extract_text(resp: &GeminiResponse) -> Result<String, GenerationError> {
    if let Some(candidates) = &resp.candidates {
        if let Some(first) = candidates.first() {
            if let Some(content) = &first.content {
                if let Some(text) = content.parts.iter().find_map(|p| p.text.as_ref()) {
                    return Ok(text.clone());
                }
            }
            let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
            return Err(GenerationError::Api(format!(
                "Response empty. Finish reason: {}",
                reason
            )));
        }
    }
    Err(GenerationError::Api(
        "Response format unexpected or empty.".to_string(),
    ))
}

fn extract_image(resp: &GeminiResponse) -> Result<String, GenerationError> {
    if let Some(candidates) = &resp.candidates {
        for candidate in candidates {
            if let Some(content) = &candidate.content {
                for part in &content.parts {
                    if let Some(inline) = &part.inline_data {
                        return Ok(inline.data.clone());
                    }
                }
            }
        }
    }
    Err(GenerationError::MissingImagePayload)
}

/// Strips markdown code fences the model sometimes wraps around JSON output.
pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    if s.starts_with("```json") {
        s.trim_start_matches("```json")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else if s.starts_with("```") {
        s.trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_blocks() {
        assert_eq!(strip_code_blocks("json"), "json");
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("  ```json  \n  {}  \n  ```  "), "{}");
    }

    #[test]
    fn test_classify_credential_substrings() {
        assert!(classify_api_error("Requested entity was not found.".to_string()).is_credential());
        assert!(classify_api_error("error: API_KEY_INVALID".to_string()).is_credential());
        assert!(classify_api_error("API key not valid. Please pass a valid API key.".to_string())
            .is_credential());
        assert!(classify_api_error("403 Permission Denied on resource".to_string()).is_credential());
    }

    #[test]
    fn test_classify_other_errors_stay_api() {
        let err = classify_api_error("500 Internal error encountered.".to_string());
        assert!(!err.is_credential());
        assert!(matches!(err, GenerationError::Api(_)));
    }

    #[test]
    fn test_extract_text_success() {
        let json = r#"{
            "candidates": [
                {
                    "content": {
                        "parts": [ { "text": "[{\"shot_id\":\"s1\",\"pitch\":\"Robot wakes\"}]" } ],
                        "role": "model"
                    },
                    "finishReason": "STOP",
                    "index": 0
                }
            ]
        }"#;

        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        let text = extract_text(&resp).unwrap();
        assert!(text.contains("Robot wakes"));
    }

    #[test]
    fn test_extract_text_safety_block() {
        let json = r#"{
            "candidates": [
                { "finishReason": "SAFETY", "index": 0 }
            ]
        }"#;

        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        let err = extract_text(&resp).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_extract_image_missing_payload() {
        let json = r#"{
            "candidates": [
                {
                    "content": {
                        "parts": [ { "text": "I cannot generate that image." } ],
                        "role": "model"
                    },
                    "finishReason": "STOP"
                }
            ]
        }"#;

        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        let err = extract_image(&resp).unwrap_err();
        assert!(matches!(err, GenerationError::MissingImagePayload));
    }

    #[test]
    fn test_extract_image_success() {
        let json = r#"{
            "candidates": [
                {
                    "content": {
                        "parts": [
                            { "text": "Here is your keyframe." },
                            { "inlineData": { "mimeType": "image/png", "data": "aW1hZ2U=" } }
                        ],
                        "role": "model"
                    },
                    "finishReason": "STOP"
                }
            ]
        }"#;

        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(extract_image(&resp).unwrap(), "aW1hZ2U=");
    }

    #[test]
    fn test_shot_list_parses_shot_id_key() {
        let json = r#"[
            {"shot_id": "s1", "pitch": "Robot wakes"},
            {"shot_id": "s2", "pitch": "Robot walks outside"}
        ]"#;

        let list: Vec<ShotPitch> = serde_json::from_str(json).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, "s1");
        assert_eq!(list[1].pitch, "Robot walks outside");
    }
}
