// Language Routing and Typo Normalization
//
// Concept: Decide whether query text needs translation, and repair common
// misspellings of jewelry terms on the English path
// Resolution: similarity = strsim::normalized_levenshtein on lowercased words
//
// Routing (English path, no translation call):
// - text shorter than 5 characters, or
// - any word within `detect_threshold` of a vocabulary term
// Everything else is left to the translation service to detect.

use jewel_common::config::LanguageConfig;

/// Language tag for the English path
pub const ENGLISH: &str = "en";
/// Language tag for text handed to the translation service
pub const AUTO_DETECT: &str = "auto";

/// Texts shorter than this (in characters) never go to translation
const MIN_TRANSLATABLE_CHARS: usize = 5;

/// Routing decision for one piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Working language; carries the typo-normalized text
    English(String),
    /// Needs translation
    Translate,
}

/// Jewelry-vocabulary aware language router
#[derive(Debug, Clone)]
pub struct LanguageRouter {
    vocabulary: Vec<String>,
    detect_threshold: f64,
    correct_threshold: f64,
}

impl LanguageRouter {
    pub fn new(config: &LanguageConfig) -> Self {
        Self {
            vocabulary: config.vocabulary.iter().map(|t| t.to_lowercase()).collect(),
            detect_threshold: config.detect_threshold,
            correct_threshold: config.correct_threshold,
        }
    }

    /// Route `text` to the English path or to translation
    pub fn route(&self, text: &str) -> Route {
        let trimmed = text.trim();

        if trimmed.chars().count() < MIN_TRANSLATABLE_CHARS || self.mentions_vocabulary(trimmed) {
            Route::English(self.correct_typos(trimmed))
        } else {
            Route::Translate
        }
    }

    /// Whether any word is a close match to a vocabulary term
    pub fn mentions_vocabulary(&self, text: &str) -> bool {
        text.split_whitespace()
            .filter_map(|w| self.closest(w))
            .any(|(_, similarity)| similarity >= self.detect_threshold)
    }

    /// Replace near-miss spellings of vocabulary terms
    ///
    /// Close (not exact) matches become the vocabulary term in title case;
    /// exact matches and unrelated words are kept as typed. Surrounding
    /// punctuation is preserved.
    pub fn correct_typos(&self, text: &str) -> String {
        text.split_whitespace()
            .map(|word| self.correct_word(word))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn correct_word(&self, word: &str) -> String {
        let start = word.find(|c: char| c.is_alphanumeric());
        let end = word.rfind(|c: char| c.is_alphanumeric());
        let (Some(start), Some(end)) = (start, end) else {
            return word.to_string();
        };
        let end = end + word[end..].chars().next().map_or(1, char::len_utf8);
        let core = &word[start..end];

        match self.closest(core) {
            Some((term, similarity))
                if similarity >= self.correct_threshold && term != core.to_lowercase() =>
            {
                tracing::debug!(word = core, corrected = %term, similarity, "Typo corrected");
                format!("{}{}{}", &word[..start], title_case(term), &word[end..])
            }
            _ => word.to_string(),
        }
    }

    /// Best vocabulary match for a word: (term, similarity)
    ///
    /// Ties keep the earlier vocabulary term.
    fn closest(&self, word: &str) -> Option<(&str, f64)> {
        let lower = word.to_lowercase();
        let lower = lower.trim_matches(|c: char| !c.is_alphanumeric());
        if lower.is_empty() {
            return None;
        }

        self.vocabulary
            .iter()
            .map(|term| (term.as_str(), strsim::normalized_levenshtein(lower, term)))
            .fold(None, |best: Option<(&str, f64)>, (term, sim)| match best {
                Some((_, best_sim)) if best_sim >= sim => best,
                _ => Some((term, sim)),
            })
    }
}

fn title_case(term: &str) -> String {
    term.split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
