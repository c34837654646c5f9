//! HTTP bindings for the external capabilities
//!
//! - [`sarvam`]: translation and speech-to-text
//! - [`inference`]: embeddings, captioning, relevance scoring
//! - [`qdrant`]: nearest-neighbor index
//! - [`web_image`]: product images behind page URLs
//!
//! [`build_capabilities`] wires them from configuration once at startup.

pub mod inference;
pub mod qdrant;
pub mod sarvam;
pub mod web_image;

use crate::capabilities::{
    Capabilities, ImageDescriber, Transcriber, Translator, UnconfiguredLanguageService,
};
use crate::error::{SearchError, SearchResult};
use inference::InferenceClient;
use jewel_common::config::{resolve_sarvam_api_key, ServicesConfig, TomlConfig};
use qdrant::QdrantIndex;
use reqwest::Client;
use sarvam::SarvamClient;
use std::sync::Arc;
use std::time::Duration;

/// Shared HTTP client with the configured request and connect timeouts
pub fn http_client(services: &ServicesConfig) -> SearchResult<Client> {
    Client::builder()
        .timeout(Duration::from_millis(services.call_timeout_ms))
        .connect_timeout(Duration::from_millis(services.connect_timeout_ms))
        .user_agent(concat!("jewel-search/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            SearchError::Config(jewel_common::Error::Config(format!(
                "Failed to build HTTP client: {}",
                e
            )))
        })
}

/// Build every capability from configuration
///
/// Without a translation API key the language service is replaced by
/// [`UnconfiguredLanguageService`]: text queries run degraded and audio
/// queries fail with `TranscriptionError`.
pub fn build_capabilities(config: &TomlConfig) -> SearchResult<Capabilities> {
    let client = http_client(&config.services)?;

    let inference = Arc::new(InferenceClient::new(
        client.clone(),
        &config.services.inference_url,
    ));
    let index = Arc::new(QdrantIndex::new(
        client.clone(),
        &config.services.index_url,
        &config.services.collection,
    ));

    let (translator, transcriber): (Arc<dyn Translator>, Arc<dyn Transcriber>) =
        match resolve_sarvam_api_key(config) {
            Some(api_key) => {
                tracing::info!("Language service: ACTIVE ({})", config.services.language_url);
                let sarvam = Arc::new(SarvamClient::new(
                    client,
                    &config.services.language_url,
                    api_key,
                    &config.language.target_language_code,
                ));
                let translator: Arc<dyn Translator> = sarvam.clone();
                let transcriber: Arc<dyn Transcriber> = sarvam;
                (translator, transcriber)
            }
            None => {
                tracing::warn!(
                    "No translation API key configured; non-English text runs untranslated and audio queries are unavailable"
                );
                let unconfigured = Arc::new(UnconfiguredLanguageService::new(
                    "translation API key not configured",
                ));
                let translator: Arc<dyn Translator> = unconfigured.clone();
                let transcriber: Arc<dyn Transcriber> = unconfigured;
                (translator, transcriber)
            }
        };

    let describer: Option<Arc<dyn ImageDescriber>> = if config.services.captioning {
        let describer: Arc<dyn ImageDescriber> = inference.clone();
        Some(describer)
    } else {
        tracing::info!("Image captioning disabled");
        None
    };

    Ok(Capabilities {
        translator,
        transcriber,
        text_embedder: inference.clone(),
        image_embedder: inference.clone(),
        describer,
        index,
        scorer: inference,
    })
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Short excerpt of an error response body for messages
pub(crate) fn body_excerpt(body: &str) -> String {
    const MAX_CHARS: usize = 200;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        trimmed.to_string()
    } else {
        format!("{}…", trimmed.chars().take(MAX_CHARS).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        assert_eq!(endpoint("http://h:1/", "/embed/text"), "http://h:1/embed/text");
        assert_eq!(endpoint("http://h:1", "translate"), "http://h:1/translate");
    }

    #[test]
    fn test_body_excerpt_truncates() {
        let long = "x".repeat(500);
        assert_eq!(body_excerpt(&long).chars().count(), 201);
        assert_eq!(body_excerpt("  short  "), "short");
    }

    #[test]
    fn test_build_capabilities_without_key() {
        let mut config = TomlConfig::default();
        config.services.sarvam_api_key = None;
        config.services.captioning = false;

        let capabilities = build_capabilities(&config).unwrap();
        assert!(capabilities.describer.is_none());
    }
}
