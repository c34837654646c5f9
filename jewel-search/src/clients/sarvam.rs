// Sarvam-style Language Service Client
//
// Concept: Translation into the working language and speech-to-text for audio queries
// Endpoints:
// - POST {base}/translate                 JSON  → {"translated_text": ...}
// - POST {base}/speech-to-text-translate  multipart "file" → {"transcript": ...}
// Authentication: `api-subscription-key` header

use crate::capabilities::{Transcriber, Translator};
use crate::clients::{body_excerpt, endpoint};
use crate::error::{SearchError, SearchResult};
use crate::types::AudioClip;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const API_KEY_HEADER: &str = "api-subscription-key";

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    input: &'a str,
    source_language_code: &'a str,
    target_language_code: &'a str,
    mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    translated_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    transcript: Option<String>,
}

/// Translation + speech-to-text client
///
/// **Legible Software Principle:**
/// - Independent module: Only depends on HTTP client
/// - Transparent behavior: every failure is returned, never swallowed here
pub struct SarvamClient {
    client: Client,
    base_url: String,
    api_key: String,
    target_language: String,
}

impl SarvamClient {
    pub fn new(client: Client, base_url: &str, api_key: String, target_language: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key,
            target_language: target_language.to_string(),
        }
    }
}

#[async_trait]
impl Translator for SarvamClient {
    async fn translate(&self, text: &str, source_lang: Option<&str>) -> SearchResult<String> {
        let request = TranslateRequest {
            input: text,
            source_language_code: source_lang.unwrap_or("auto"),
            target_language_code: &self.target_language,
            mode: "formal",
        };

        tracing::debug!(chars = text.chars().count(), "Requesting translation");

        let response = self
            .client
            .post(endpoint(&self.base_url, "translate"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SearchError::Translation(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Translation(format!(
                "service returned {}: {}",
                status,
                body_excerpt(&body)
            )));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Translation(format!("malformed response: {}", e)))?;

        parsed
            .translated_text
            .ok_or_else(|| SearchError::Translation("response has no translated_text".to_string()))
    }
}

#[async_trait]
impl Transcriber for SarvamClient {
    async fn transcribe(&self, audio: &AudioClip) -> SearchResult<String> {
        let mime = audio.mime_type();
        let file_name = audio
            .file_name
            .clone()
            .unwrap_or_else(|| "query.wav".to_string());

        tracing::debug!(bytes = audio.bytes.len(), mime, file = %file_name, "Sending audio for transcription");

        let part = Part::bytes(audio.bytes.clone())
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| SearchError::Transcription(format!("invalid audio type {}: {}", mime, e)))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(endpoint(&self.base_url, "speech-to-text-translate"))
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SearchError::Transcription(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Transcription(format!(
                "service returned {}: {}",
                status,
                body_excerpt(&body)
            )));
        }

        let parsed: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Transcription(format!("malformed response: {}", e)))?;

        match parsed.transcript {
            Some(transcript) if !transcript.trim().is_empty() => Ok(transcript),
            _ => Err(SearchError::Transcription("service returned an empty transcript".to_string())),
        }
    }
}
