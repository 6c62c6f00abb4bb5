use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::{
    analysis_prompt, Config, GEMINI_MAX_OUTPUT_TOKENS, GEMINI_RESPONSE_MIME_TYPE,
    GEMINI_TEMPERATURE, GEMINI_TOP_K, GEMINI_TOP_P,
};
use crate::llm::media::UploadedImage;
use crate::llm::AttributeAnalyzer;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("Gemini request failed: {0}")]
    Transport(String),
    #[error("Gemini request failed with status {status}: {detail}")]
    Status { status: StatusCode, detail: String },
    #[error("Gemini response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl GeminiSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: config.gemini_base_url.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn redact(&self, text: &str) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }
}

/// Sends the attribute prompt plus one image to `generateContent`.
///
/// Exactly one request per call: failures are surfaced to the caller as-is.
#[derive(Debug, Clone)]
pub struct GeminiAnalyzer {
    settings: GeminiSettings,
    client: Client,
}

impl GeminiAnalyzer {
    pub fn new(settings: GeminiSettings) -> Self {
        Self::with_client(settings, get_http_client().clone())
    }

    pub fn with_client(settings: GeminiSettings, client: Client) -> Self {
        Self { settings, client }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    pub async fn analyze_human_attributes(
        &self,
        image: &UploadedImage,
    ) -> std::result::Result<String, GeminiError> {
        let payload = build_request_payload(analysis_prompt(), image);
        let response = self.call_gemini_api(&payload).await?;
        Ok(extract_first_candidate_text(response))
    }

    async fn call_gemini_api(
        &self,
        payload: &Value,
    ) -> std::result::Result<GeminiResponse, GeminiError> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                target: "llm.gemini",
                model = self.settings.model.as_str(),
                payload = %summarize_payload(payload)
            );
        }

        let response = self
            .client
            .post(self.settings.endpoint())
            .header("x-goog-api-key", &self.settings.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                let err_text = self.settings.redact(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={}, status={:?})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect(),
                    err.status()
                );
                GeminiError::Transport(err_text)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!("Gemini API error: status={}, body={}", status, body_summary);
            let detail = self.settings.redact(&message.unwrap_or(body_summary));
            return Err(GeminiError::Status { status, detail });
        }

        let value = response
            .json::<GeminiResponse>()
            .await
            .map_err(|err| GeminiError::Decode(self.settings.redact(&err.to_string())))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(target: "llm.gemini", response = %summarize_response(&value));
        }
        Ok(value)
    }
}

#[async_trait]
impl AttributeAnalyzer for GeminiAnalyzer {
    async fn analyze(&self, image: &UploadedImage) -> Result<String> {
        let metadata = json!({
            "mimeType": image.mime_type,
            "bytes": image.bytes.len(),
            "width": image.width,
            "height": image.height,
        });
        log_llm_timing(
            "gemini",
            self.model(),
            "analyze_human_attributes",
            Some(metadata),
            || async { Ok(self.analyze_human_attributes(image).await?) },
        )
        .await
    }
}

fn generation_config() -> Value {
    json!({
        "temperature": GEMINI_TEMPERATURE,
        "topP": GEMINI_TOP_P,
        "topK": GEMINI_TOP_K,
        "maxOutputTokens": GEMINI_MAX_OUTPUT_TOKENS,
        "responseMimeType": GEMINI_RESPONSE_MIME_TYPE,
    })
}

fn build_request_payload(prompt: &str, image: &UploadedImage) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "text": prompt },
                {
                    "inlineData": {
                        "mimeType": image.mime_type,
                        "data": image.to_base64()
                    }
                }
            ]
        }],
        "generationConfig": generation_config()
    })
}

fn extract_first_candidate_text(response: GeminiResponse) -> String {
    let Some(candidate) = response.candidates.unwrap_or_default().into_iter().next() else {
        warn!("Gemini response contained no candidates");
        return String::new();
    };
    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason != "STOP" {
            warn!("Gemini candidate finished with reason {}", reason);
        }
    }

    let text: String = candidate
        .content
        .and_then(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| part.text)
        .collect();
    text.trim().to_string()
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let parts: Vec<Value> = contents
            .iter()
            .filter_map(|content| content.get("parts").and_then(|value| value.as_array()))
            .flatten()
            .map(|part| {
                if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                    json!({ "text": truncate_for_log(text, 120) })
                } else if let Some(inline_data) = part.get("inlineData") {
                    let mime_type = inline_data
                        .get("mimeType")
                        .and_then(|value| value.as_str())
                        .unwrap_or("unknown");
                    let data_len = inline_data
                        .get("data")
                        .and_then(|value| value.as_str())
                        .map(|value| value.len())
                        .unwrap_or(0);
                    json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
                } else {
                    json!({ "unknownPart": true })
                }
            })
            .collect();
        summary.insert("parts".to_string(), Value::Array(parts));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    Value::Object(summary)
}

fn summarize_response(response: &GeminiResponse) -> Value {
    let candidates = response.candidates.as_deref().unwrap_or(&[]);
    let preview = candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .and_then(|content| content.parts.as_ref())
        .and_then(|parts| parts.iter().find_map(|part| part.text.as_deref()))
        .map(|text| truncate_for_log(text, 200));

    json!({
        "candidates": candidates.len(),
        "finishReason": candidates.first().and_then(|candidate| candidate.finish_reason.clone()),
        "textPreview": preview
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

#[cfg(test)]
mod tests {
    use image::ImageFormat;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::llm::media::decode_upload;
    use crate::llm::media::tests::encoded_image;

    fn test_analyzer(server: &MockServer) -> GeminiAnalyzer {
        GeminiAnalyzer::with_client(
            GeminiSettings {
                api_key: "test-key".to_string(),
                model: "test-model".to_string(),
                base_url: format!("{}/", server.uri()),
            },
            Client::new(),
        )
    }

    fn test_image() -> UploadedImage {
        decode_upload(encoded_image(ImageFormat::Png, 2, 2), Some("me.png".to_string())).unwrap()
    }

    #[tokio::test]
    async fn sends_prompt_image_and_fixed_generation_config() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "\n Gender: Female\n\nAge: 27 \n" }] },
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let image = test_image();
        let text = test_analyzer(&server)
            .analyze_human_attributes(&image)
            .await
            .unwrap();
        assert_eq!(text, "Gender: Female\n\nAge: 27");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: Value = requests[0].body_json().unwrap();
        let parts = body.pointer("/contents/0/parts").unwrap().as_array().unwrap();
        assert_eq!(parts[0]["text"], analysis_prompt());
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], image.to_base64());

        let config = &body["generationConfig"];
        assert_eq!(config["temperature"], 1.0);
        assert_eq!(config["topK"], 64);
        assert_eq!(config["maxOutputTokens"], 8192);
        assert_eq!(config["responseMimeType"], "text/plain");
        assert!((config["topP"].as_f64().unwrap() - 0.95).abs() < 1e-6);
    }

    #[tokio::test]
    async fn uses_only_the_first_candidate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [
                    { "content": { "parts": [{ "text": "Mood: " }, { "text": "Happy" }] } },
                    { "content": { "parts": [{ "text": "Mood: Sad" }] } }
                ]
            })))
            .mount(&server)
            .await;

        let text = test_analyzer(&server)
            .analyze_human_attributes(&test_image())
            .await
            .unwrap();
        assert_eq!(text, "Mood: Happy");
    }

    #[tokio::test]
    async fn missing_candidates_yield_empty_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let text = test_analyzer(&server)
            .analyze_human_attributes(&test_image())
            .await
            .unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn error_status_is_returned_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "error": { "message": "model overloaded for key test-key" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_analyzer(&server)
            .analyze_human_attributes(&test_image())
            .await
            .unwrap_err();
        match err {
            GeminiError::Status { status, detail } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(detail, "model overloaded for key [redacted]");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[test]
    fn error_body_prefers_api_message() {
        let (message, _) = summarize_error_body(r#"{"error":{"message":"API key not valid"}}"#);
        assert_eq!(message.as_deref(), Some("API key not valid"));
        let (message, summary) = summarize_error_body("   ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }

    #[test]
    fn payload_summary_hides_image_data() {
        let payload = build_request_payload("prompt", &test_image());
        let summary = summarize_payload(&payload);
        let inline = &summary["parts"][1]["inlineData"];
        assert_eq!(inline["mimeType"], "image/png");
        assert!(inline.get("data").is_none());
        assert!(inline["dataLen"].as_u64().unwrap() > 0);
    }
}
