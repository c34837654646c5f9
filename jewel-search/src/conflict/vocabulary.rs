// Facet Vocabulary
//
// Concept: Data-driven keyword table mapping free text to canonical facet values
// Synchronization: Built once from `[[conflict.facets]]`, shared read-only by the
// Conflict Resolver and the Embedding Fuser (caption suppression)
//
// Matching rules:
// - Case-insensitive, on word boundaries (punctuation and hyphens separate words)
// - Longest keyword wins: "rose gold" consumes both words, so "gold" does not also match
// - A facet whose text names two different values expresses no single requirement

use jewel_common::config::FacetSpec;
use std::collections::BTreeSet;

/// Facet value requested by (or inferred from) a piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetRequirement {
    pub facet: String,
    pub value: String,
}

/// One facet with keywords ordered longest-first
#[derive(Debug, Clone)]
struct Facet {
    name: String,
    metadata_key: String,
    /// (keyword words, canonical value), longest keyword first
    keywords: Vec<(Vec<String>, String)>,
}

/// Keyword table for every configured facet
///
/// **Legible Software Principle:**
/// - Transparent behavior: the table is configuration, not code
/// - Deterministic: same text always yields the same values
#[derive(Debug, Clone, Default)]
pub struct FacetVocabulary {
    facets: Vec<Facet>,
}

impl FacetVocabulary {
    /// Build the vocabulary from configuration
    pub fn from_specs(specs: &[FacetSpec]) -> Self {
        let facets = specs
            .iter()
            .map(|spec| {
                let mut keywords: Vec<(Vec<String>, String)> = spec
                    .values
                    .iter()
                    .flat_map(|v| {
                        v.keywords
                            .iter()
                            .map(|k| (words(k), v.value.to_lowercase()))
                            .filter(|(w, _)| !w.is_empty())
                    })
                    .collect();

                // Most words first, then longest text, then alphabetical for stability
                keywords.sort_by(|(a, av), (b, bv)| {
                    b.len()
                        .cmp(&a.len())
                        .then_with(|| b.concat().len().cmp(&a.concat().len()))
                        .then_with(|| a.cmp(b))
                        .then_with(|| av.cmp(bv))
                });

                Facet {
                    name: spec.name.clone(),
                    metadata_key: spec.metadata_key().to_string(),
                    keywords,
                }
            })
            .collect();

        Self { facets }
    }

    /// Facet names in configuration order
    pub fn facet_names(&self) -> impl Iterator<Item = &str> {
        self.facets.iter().map(|f| f.name.as_str())
    }

    /// Metadata attribute holding a facet's observed value
    pub fn metadata_key(&self, facet: &str) -> Option<&str> {
        self.facet(facet).map(|f| f.metadata_key.as_str())
    }

    /// Facet values explicitly stated in `text`
    ///
    /// Returns at most one requirement per facet, in configuration order.
    /// Facets mentioned with two or more distinct values are skipped.
    pub fn requirements(&self, text: &str) -> Vec<FacetRequirement> {
        let tokens = words(text);
        if tokens.is_empty() {
            return Vec::new();
        }

        self.facets
            .iter()
            .filter_map(|facet| {
                let values = facet.matches(&tokens);
                if values.len() == 1 {
                    values.into_iter().next().map(|value| FacetRequirement {
                        facet: facet.name.clone(),
                        value,
                    })
                } else {
                    if values.len() > 1 {
                        tracing::debug!(
                            facet = %facet.name,
                            values = ?values,
                            "Ambiguous facet in text, ignoring"
                        );
                    }
                    None
                }
            })
            .collect()
    }

    /// Single value of `facet` named in `text` (None if absent or ambiguous)
    pub fn single_value(&self, facet: &str, text: &str) -> Option<String> {
        let facet = self.facet(facet)?;
        let values = facet.matches(&words(text));
        if values.len() == 1 {
            values.into_iter().next()
        } else {
            None
        }
    }

    /// Every value of `facet` named in `text`
    ///
    /// "Gold and Silver" → {"gold", "silver"}. Empty for unknown facets.
    pub fn values_in(&self, facet: &str, text: &str) -> BTreeSet<String> {
        self.facet(facet)
            .map(|f| f.matches(&words(text)))
            .unwrap_or_default()
    }

    /// Canonicalize a raw metadata value for `facet`
    ///
    /// "Yellow Gold" → "gold". Values naming no (or several) known values
    /// come back lowercased and whitespace-normalized.
    pub fn canonicalize(&self, facet: &str, raw: &str) -> String {
        self.single_value(facet, raw)
            .unwrap_or_else(|| words(raw).join(" "))
    }

    fn facet(&self, name: &str) -> Option<&Facet> {
        self.facets.iter().find(|f| f.name == name)
    }
}

impl Facet {
    /// Distinct canonical values named in `tokens`, longest keyword first
    fn matches(&self, tokens: &[String]) -> BTreeSet<String> {
        let mut consumed = vec![false; tokens.len()];
        let mut values = BTreeSet::new();

        for (keyword, value) in &self.keywords {
            let n = keyword.len();
            if n > tokens.len() {
                continue;
            }

            for start in 0..=(tokens.len() - n) {
                let span = start..start + n;
                if consumed[span.clone()].iter().any(|c| *c) {
                    continue;
                }
                if tokens[span.clone()] == keyword[..] {
                    consumed[span].iter_mut().for_each(|c| *c = true);
                    values.insert(value.clone());
                }
            }
        }

        values
    }
}

/// Lowercase word tokens; any non-alphanumeric character separates words
fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}
