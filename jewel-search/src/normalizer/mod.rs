//! Modality Normalizer
//!
//! Turns raw [`QueryInput`] into a canonical [`Query`]:
//!
//! - **Text**: routed through [`language::LanguageRouter`]; non-English text is
//!   translated. Translation failure keeps the original text and marks the
//!   query degraded.
//! - **Audio**: transcribed, then handled as text. Transcription failure is fatal.
//! - **Image**: wrapped in an [`ImageRef`] and, when a describer is configured,
//!   captioned (best-effort). A located jewelry region replaces the image with
//!   its crop ([`crop`]).
//! - **Hybrid**: text and image paths run concurrently.

pub mod crop;
pub mod language;

use crate::capabilities::{Capabilities, ImageDescriber, Transcriber, Translator};
use crate::error::{SearchError, SearchResult};
use crate::types::{BoundingBox, ImageRef, Modality, Query, QueryInput};
use crate::utils::{retry_on_timeout, with_timeout};
use jewel_common::config::LanguageConfig;
use language::{LanguageRouter, Route, AUTO_DETECT, ENGLISH};
use std::sync::Arc;
use std::time::Duration;

/// Attempts per captioning call: the first call plus one retry on timeout
const MAX_CAPTION_ATTEMPTS: u32 = 2;

/// Text after language handling
#[derive(Debug, Clone, PartialEq)]
struct ResolvedText {
    translated: String,
    language: &'static str,
    degraded: bool,
}

/// Modality normalizer (first pipeline stage)
#[derive(Clone)]
pub struct ModalityNormalizer {
    translator: Arc<dyn Translator>,
    transcriber: Arc<dyn Transcriber>,
    describer: Option<Arc<dyn ImageDescriber>>,
    router: LanguageRouter,
    call_timeout: Duration,
    retry_backoff: Duration,
}

impl ModalityNormalizer {
    pub fn new(
        capabilities: &Capabilities,
        language: &LanguageConfig,
        call_timeout: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            translator: capabilities.translator.clone(),
            transcriber: capabilities.transcriber.clone(),
            describer: capabilities.describer.clone(),
            router: LanguageRouter::new(language),
            call_timeout,
            retry_backoff,
        }
    }

    /// Normalize one request
    ///
    /// # Errors
    /// - `InvalidInput` for blank text or empty image/audio bytes (no external call made)
    /// - `Transcription` when audio cannot be transcribed or yields no text
    pub async fn normalize(&self, input: QueryInput) -> SearchResult<Query> {
        match input {
            QueryInput::Text(text) => {
                let raw = non_blank(text, "query text is empty")?;
                let resolved = self.resolve_text(&raw).await;
                Ok(text_query(raw, resolved, Modality::Text))
            }

            QueryInput::Audio(clip) => {
                if clip.bytes.is_empty() {
                    return Err(SearchError::InvalidInput("audio clip is empty".to_string()));
                }

                let transcript = with_timeout(
                    self.call_timeout,
                    self.transcriber.transcribe(&clip),
                    || SearchError::Transcription("speech-to-text timed out".to_string()),
                )
                .await?;

                let raw = non_blank(transcript, "")
                    .map_err(|_| SearchError::Transcription("empty transcript".to_string()))?;
                tracing::info!(transcript = %raw, "Audio transcribed");

                let resolved = self.resolve_text(&raw).await;
                Ok(text_query(raw, resolved, Modality::Audio))
            }

            QueryInput::Image(bytes) => Ok(self.image_query(image_ref(bytes)?).await),

            QueryInput::Hybrid { image, text } => {
                let image = image_ref(image)?;

                if text.trim().is_empty() {
                    tracing::debug!("Hybrid query without text, treating as image query");
                    return Ok(self.image_query(image).await);
                }

                let raw = text.trim().to_string();
                let (resolved, (image, caption)) =
                    tokio::join!(self.resolve_text(&raw), self.describe(image));

                Ok(Query {
                    raw_text: Some(raw),
                    translated_text: Some(resolved.translated),
                    image: Some(image),
                    image_caption: caption,
                    modality: Modality::Hybrid,
                    detected_language: Some(resolved.language.to_string()),
                    degraded: resolved.degraded,
                })
            }
        }
    }

    async fn image_query(&self, image: ImageRef) -> Query {
        let (image, caption) = self.describe(image).await;

        Query {
            raw_text: None,
            translated_text: None,
            image: Some(image),
            image_caption: caption,
            modality: Modality::Image,
            detected_language: None,
            degraded: false,
        }
    }

    /// Route, correct or translate text; never fails
    async fn resolve_text(&self, raw: &str) -> ResolvedText {
        match self.router.route(raw) {
            Route::English(corrected) => {
                if corrected != raw {
                    tracing::info!(original = raw, normalized = %corrected, "English query normalized");
                }
                ResolvedText {
                    translated: corrected,
                    language: ENGLISH,
                    degraded: false,
                }
            }
            Route::Translate => {
                let result = with_timeout(
                    self.call_timeout,
                    self.translator.translate(raw, None),
                    || SearchError::Translation("translation timed out".to_string()),
                )
                .await
                .and_then(|t| {
                    non_blank(t, "").map_err(|_| {
                        SearchError::Translation("translation service returned empty text".to_string())
                    })
                });

                match result {
                    Ok(translated) => {
                        tracing::info!(original = raw, translated = %translated, "Query translated");
                        ResolvedText {
                            translated,
                            language: AUTO_DETECT,
                            degraded: false,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Translation unavailable, continuing with original text (degraded mode)");
                        ResolvedText {
                            translated: raw.to_string(),
                            language: AUTO_DETECT,
                            degraded: true,
                        }
                    }
                }
            }
        }
    }

    /// Best-effort caption, and the image cropped to the located jewelry
    async fn describe(&self, image: ImageRef) -> (ImageRef, Option<String>) {
        let Some(describer) = self.describer.as_ref() else {
            return (image, None);
        };

        let result = retry_on_timeout(
            "image captioning",
            MAX_CAPTION_ATTEMPTS,
            self.retry_backoff,
            self.call_timeout,
            || describer.describe_image(&image),
            || SearchError::Captioning("captioning timed out".to_string()),
        )
        .await;

        let description = match result {
            Ok(description) => description,
            Err(e) => {
                tracing::warn!(error = %e, "Image captioning failed, continuing without caption");
                return (image, None);
            }
        };

        let caption = description.caption.trim();
        let caption = if caption.is_empty() {
            tracing::debug!("Captioning returned no text");
            None
        } else {
            let caption = self.router.correct_typos(caption);
            tracing::debug!(caption = %caption, "Image captioned");
            Some(caption)
        };

        let image = match description.region {
            Some(region) => localize(image, region).await,
            None => image,
        };
        (image, caption)
    }
}

/// Crop `image` to `region` off the async workers; the whole image on failure
async fn localize(image: ImageRef, region: BoundingBox) -> ImageRef {
    let source = image.clone();
    match tokio::task::spawn_blocking(move || crop::crop_to_region(&source, &region)).await {
        Ok(Ok(Some(cropped))) => {
            tracing::debug!(
                ?region,
                original_bytes = image.len(),
                cropped_bytes = cropped.len(),
                "Query image cropped to jewelry"
            );
            cropped
        }
        Ok(Ok(None)) => {
            tracing::warn!(?region, "Located region is empty, embedding whole image");
            image
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Could not crop query image, embedding whole image");
            image
        }
        Err(e) => {
            tracing::warn!(error = %e, "Crop task failed, embedding whole image");
            image
        }
    }
}

fn non_blank(text: String, message: &str) -> SearchResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(SearchError::InvalidInput(message.to_string()))
    } else {
        Ok(trimmed.to_string())
    }
}

fn image_ref(bytes: Vec<u8>) -> SearchResult<ImageRef> {
    if bytes.is_empty() {
        return Err(SearchError::InvalidInput("image is empty".to_string()));
    }
    Ok(ImageRef::new(bytes))
}

fn text_query(raw: String, resolved: ResolvedText, modality: Modality) -> Query {
    Query {
        raw_text: Some(raw),
        translated_text: Some(resolved.translated),
        image: None,
        image_caption: None,
        modality,
        detected_language: Some(resolved.language.to_string()),
        degraded: resolved.degraded,
    }
}
