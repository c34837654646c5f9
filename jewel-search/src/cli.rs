//! Command-line query parsing and result rendering
//!
//! Query syntax:
//! - `path/to/photo.jpg | in silver please` → hybrid (image + text)
//! - `https://shop.example/item` → image query with the page's product image
//!   (`https://… | text` for hybrid)
//! - an existing file → image or audio, by content sniffing then extension
//! - anything else → text

use crate::clients::web_image::WebImageFetcher;
use crate::error::{SearchError, SearchResult};
use crate::pipeline::SearchOutcome;
use crate::types::{AudioClip, QueryInput};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "ogg"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];

/// Media kind of a query file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
}

/// `(url, text)` when the input names a web page or image URL
pub fn url_query(raw: &str) -> Option<(&str, Option<&str>)> {
    let raw = raw.trim();
    let (url_part, text_part) = match raw.split_once('|') {
        Some((url, text)) => (unquote(url), Some(unquote(text)).filter(|t| !t.is_empty())),
        None => (unquote(raw), None),
    };

    let lower = url_part.to_ascii_lowercase();
    let is_url = (lower.starts_with("http://") || lower.starts_with("https://"))
        && !url_part.contains(char::is_whitespace);
    is_url.then_some((url_part, text_part))
}

/// Turn one line of user input into a query, downloading URL images
///
/// # Errors
/// As [`parse_query_input`], plus `ImageFetch` when a URL yields no image.
pub async fn resolve_query_input(raw: &str, fetcher: &WebImageFetcher) -> SearchResult<QueryInput> {
    let Some((url, text)) = url_query(raw) else {
        return parse_query_input(raw);
    };

    let image = fetcher.fetch(url).await?;
    Ok(match text {
        Some(text) => QueryInput::Hybrid {
            image,
            text: text.to_string(),
        },
        None => QueryInput::Image(image),
    })
}

/// Turn one line of user input into a query
///
/// # Errors
/// `Io` when a referenced file cannot be read, `InvalidInput` for blank
/// input or a file that is neither image nor audio.
pub fn parse_query_input(raw: &str) -> SearchResult<QueryInput> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SearchError::InvalidInput("empty query".to_string()));
    }

    if let Some((image_part, text_part)) = raw.split_once('|') {
        let path = Path::new(unquote(image_part));
        let image = read_file(path)?;
        if media_kind(path, &image) != Some(MediaKind::Image) {
            return Err(SearchError::InvalidInput(format!(
                "{} is not an image",
                path.display()
            )));
        }
        return Ok(QueryInput::Hybrid {
            image,
            text: unquote(text_part).to_string(),
        });
    }

    let candidate = Path::new(unquote(raw));
    if candidate.is_file() {
        let bytes = read_file(candidate)?;
        return match media_kind(candidate, &bytes) {
            Some(MediaKind::Audio) => Ok(QueryInput::Audio(AudioClip::new(
                bytes,
                candidate
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned()),
            ))),
            Some(MediaKind::Image) => Ok(QueryInput::Image(bytes)),
            None => Err(SearchError::InvalidInput(format!(
                "{} is neither an image nor an audio file",
                candidate.display()
            ))),
        };
    }

    // A single token with a media extension is a file the user meant to send
    if !raw.contains(char::is_whitespace) && extension_kind(candidate).is_some() {
        return Err(SearchError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{}: file not found", candidate.display()),
        )));
    }

    Ok(QueryInput::Text(unquote(raw).to_string()))
}

/// Sniff file content, falling back to the extension
pub fn media_kind(path: &Path, bytes: &[u8]) -> Option<MediaKind> {
    match infer::get(bytes).map(|k| k.matcher_type()) {
        Some(infer::MatcherType::Image) => Some(MediaKind::Image),
        Some(infer::MatcherType::Audio) => Some(MediaKind::Audio),
        _ => extension_kind(path),
    }
}

fn extension_kind(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Audio)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else {
        None
    }
}

fn read_file(path: &Path) -> SearchResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        SearchError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}

/// What a Ctrl+C should do right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// A search was running and has been cancelled
    CancelSearch,
    /// Nothing is running: leave the process
    Exit,
}

/// Ctrl+C routing for the CLI
///
/// Listening for SIGINT replaces its default behavior for the rest of the
/// process, so one listener consults this state: cancel the running search
/// if there is one, otherwise exit.
#[derive(Debug, Default)]
pub struct Interrupts {
    active: Mutex<Option<CancellationToken>>,
}

impl Interrupts {
    /// Token cancelled by the next interrupt, until [`Interrupts::finish`]
    pub fn begin(&self) -> CancellationToken {
        let cancel = CancellationToken::new();
        if let Ok(mut slot) = self.active.lock() {
            *slot = Some(cancel.clone());
        }
        cancel
    }

    /// The search has ended; interrupts no longer target it
    pub fn finish(&self) {
        if let Ok(mut slot) = self.active.lock() {
            *slot = None;
        }
    }

    /// Handle one interrupt
    ///
    /// A second interrupt during the same search finds nothing to cancel and
    /// exits.
    pub fn interrupt(&self) -> InterruptAction {
        let active = self.active.lock().ok().and_then(|mut slot| slot.take());
        match active {
            Some(cancel) => {
                cancel.cancel();
                InterruptAction::CancelSearch
            }
            None => InterruptAction::Exit,
        }
    }
}

/// Human-readable result table
pub fn render_table(outcome: &SearchOutcome) -> String {
    let mut out = String::new();
    let query = &outcome.query;

    if let Some(text) = query.search_text() {
        let _ = writeln!(out, "Query: {}", text);
    }
    if let Some(caption) = &query.image_caption {
        let _ = writeln!(out, "Image: {}", caption);
    }
    if outcome.degraded {
        let _ = writeln!(out, "Note: translation unavailable, searched with original text");
    }

    if outcome.results.is_empty() {
        let _ = writeln!(out, "No results.");
        return out;
    }

    for (rank, item) in outcome.results.iter().enumerate() {
        let _ = write!(out, "{:>3}. [{:>8.4}] {}", rank + 1, item.final_score, item.item_id());
        for flag in &item.conflicts {
            let _ = write!(
                out,
                "  (!{}: wanted {}, item is {})",
                flag.facet, flag.expected, flag.observed
            );
        }
        out.push('\n');
    }

    let _ = writeln!(
        out,
        "{} results from {} candidates in {} ms",
        outcome.results.len(),
        outcome.retrieved,
        outcome.timings.total_ms
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // Smallest valid PNG signature + IHDR start is enough for sniffing
    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    fn temp_file(suffix: &str, bytes: &[u8]) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn test_plain_text() {
        match parse_query_input("  \"gold jhumka\"  ").unwrap() {
            QueryInput::Text(t) => assert_eq!(t, "gold jhumka"),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_image_file_sniffed() {
        let file = temp_file(".bin", PNG_HEADER);
        let input = parse_query_input(file.path().to_str().unwrap()).unwrap();
        assert!(matches!(input, QueryInput::Image(_)));
    }

    #[test]
    fn test_audio_by_extension() {
        let file = temp_file(".m4a", &[1, 2, 3, 4]);
        match parse_query_input(file.path().to_str().unwrap()).unwrap() {
            QueryInput::Audio(clip) => {
                assert!(clip.file_name.unwrap().ends_with(".m4a"));
            }
            other => panic!("expected audio, got {:?}", other),
        }
    }

    #[test]
    fn test_hybrid_syntax() {
        let file = temp_file(".png", PNG_HEADER);
        let raw = format!("{} | \"in silver please\"", file.path().display());
        match parse_query_input(&raw).unwrap() {
            QueryInput::Hybrid { image, text } => {
                assert_eq!(image, PNG_HEADER);
                assert_eq!(text, "in silver please");
            }
            other => panic!("expected hybrid, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_media_file_is_io_error() {
        let err = parse_query_input("/nonexistent/necklace.jpg").unwrap_err();
        assert_eq!(err.kind(), "io");

        let err = parse_query_input("/nonexistent/necklace.jpg | in silver").unwrap_err();
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn test_unknown_file_type_rejected() {
        let file = temp_file(".txt", b"hello");
        let err = parse_query_input(file.path().to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn test_url_queries() {
        assert_eq!(
            url_query("https://shop.example/p/NK-1"),
            Some(("https://shop.example/p/NK-1", None))
        );
        assert_eq!(
            url_query("'HTTP://shop.example/p/NK-1' | in silver please"),
            Some(("HTTP://shop.example/p/NK-1", Some("in silver please")))
        );
        assert_eq!(url_query("https://shop.example/p |  "), Some(("https://shop.example/p", None)));
        assert_eq!(url_query("gold necklace like https://shop.example"), None);
        assert_eq!(url_query("/tmp/necklace.jpg"), None);
    }

    #[test]
    fn test_interrupt_cancels_running_search_then_exits_when_idle() {
        let interrupts = Interrupts::default();
        assert_eq!(interrupts.interrupt(), InterruptAction::Exit);

        let cancel = interrupts.begin();
        assert_eq!(interrupts.interrupt(), InterruptAction::CancelSearch);
        assert!(cancel.is_cancelled());
        interrupts.finish();

        // Idle again at the prompt
        let next = interrupts.begin();
        interrupts.finish();
        assert_eq!(interrupts.interrupt(), InterruptAction::Exit);
        assert!(!next.is_cancelled());
    }

    #[test]
    fn test_blank_rejected() {
        assert_eq!(parse_query_input("   ").unwrap_err().kind(), "invalid_input");
    }
}
