//! Configuration loading and resolution
//!
//! Configuration is a single TOML file. Every section and field has a
//! built-in default, so a missing file (or a missing section) is never fatal.
//!
//! # Config File Priority
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`JEWEL_CONFIG`)
//! 3. User config directory (`~/.config/jewel-search/config.toml` on Linux)
//! 4. Built-in defaults
//!
//! Secrets and service endpoints can additionally be overridden through
//! environment variables (see [`TomlConfig::apply_env_overrides`]).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "JEWEL_CONFIG";
/// Environment variable holding the translation/STT service key
pub const SARVAM_KEY_ENV_VAR: &str = "JEWEL_SARVAM_API_KEY";
/// Environment variable overriding the inference server URL
pub const INFERENCE_URL_ENV_VAR: &str = "JEWEL_INFERENCE_URL";
/// Environment variable overriding the similarity index URL
pub const INDEX_URL_ENV_VAR: &str = "JEWEL_INDEX_URL";

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub conflict: ConflictConfig,
    #[serde(default)]
    pub language: LanguageConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// External service endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Translation and speech-to-text service base URL
    #[serde(default = "default_language_url")]
    pub language_url: String,

    /// API key for the translation/STT service
    #[serde(default)]
    pub sarvam_api_key: Option<String>,

    /// Model inference server (embeddings, captioning, reranking)
    #[serde(default = "default_inference_url")]
    pub inference_url: String,

    /// Similarity index base URL (Qdrant REST API)
    #[serde(default = "default_index_url")]
    pub index_url: String,

    /// Collection holding catalog item vectors
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Whether query images are sent to the captioning endpoint
    #[serde(default = "default_true")]
    pub captioning: bool,

    /// Bounded timeout applied to every external call
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// TCP connect timeout for HTTP clients
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            language_url: default_language_url(),
            sarvam_api_key: None,
            inference_url: default_inference_url(),
            index_url: default_index_url(),
            collection: default_collection(),
            captioning: true,
            call_timeout_ms: default_call_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Retrieval and result sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Dimension of every vector stored in the index
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Candidates fetched from the index (first stage)
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Results returned to the caller
    #[serde(default = "default_result_count")]
    pub result_count: usize,

    /// Backoff before retrying a timed-out or transiently failed external call
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: default_embedding_dimension(),
            top_n: default_top_n(),
            result_count: default_result_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Hybrid query fusion weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// When false, hybrid queries retrieve with text and image vectors separately
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_unit_weight")]
    pub text_weight: f32,

    #[serde(default = "default_unit_weight")]
    pub image_weight: f32,

    /// Weight of the query image caption (ignored when no caption exists)
    #[serde(default = "default_caption_weight")]
    pub caption_weight: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            text_weight: 1.0,
            image_weight: 1.0,
            caption_weight: default_caption_weight(),
        }
    }
}

/// Second-stage scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum in-flight scoring calls per request
    #[serde(default = "default_rerank_concurrency")]
    pub concurrency: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: default_rerank_concurrency(),
        }
    }
}

/// Smallest allowed hard-filter threshold; one conflict only earns a penalty
pub const MIN_HARD_FILTER_CONFLICTS: usize = 2;

/// Attribute conflict policy and facet vocabulary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictConfig {
    /// Score multiplier applied once per conflicting facet, in (0, 1]
    #[serde(default = "default_penalty_multiplier")]
    pub penalty_multiplier: f32,

    /// Drop candidates with at least this many conflicting facets (unset = never drop)
    #[serde(default)]
    pub hard_filter_min_conflicts: Option<usize>,

    #[serde(default = "default_facets")]
    pub facets: Vec<FacetSpec>,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            penalty_multiplier: default_penalty_multiplier(),
            hard_filter_min_conflicts: None,
            facets: default_facets(),
        }
    }
}

/// One named catalog facet (e.g. material)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetSpec {
    /// Facet name used in conflict flags
    pub name: String,

    /// Candidate metadata attribute holding the observed value
    /// (defaults to the facet name)
    #[serde(default)]
    pub metadata_key: Option<String>,

    pub values: Vec<FacetValueSpec>,
}

impl FacetSpec {
    /// Metadata attribute to read for this facet
    pub fn metadata_key(&self) -> &str {
        self.metadata_key.as_deref().unwrap_or(&self.name)
    }
}

/// Canonical facet value with the keywords that express it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetValueSpec {
    pub value: String,
    pub keywords: Vec<String>,
}

/// Query language handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Target language code passed to the translation service
    #[serde(default = "default_target_language")]
    pub target_language_code: String,

    /// Known jewelry terms (forces the English path, drives typo correction)
    #[serde(default = "default_vocabulary")]
    pub vocabulary: Vec<String>,

    /// Similarity at which a word counts as a vocabulary term for routing
    #[serde(default = "default_detect_threshold")]
    pub detect_threshold: f64,

    /// Similarity at which a word is rewritten to the vocabulary term
    #[serde(default = "default_correct_threshold")]
    pub correct_threshold: f64,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            target_language_code: default_target_language(),
            vocabulary: default_vocabulary(),
            detect_threshold: default_detect_threshold(),
            correct_threshold: default_correct_threshold(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_language_url() -> String {
    "https://api.sarvam.ai".to_string()
}

fn default_inference_url() -> String {
    "http://127.0.0.1:8008".to_string()
}

fn default_index_url() -> String {
    "http://127.0.0.1:6333".to_string()
}

fn default_collection() -> String {
    "jewelry_collection".to_string()
}

fn default_true() -> bool {
    true
}

fn default_call_timeout_ms() -> u64 {
    15_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_embedding_dimension() -> usize {
    1152 // SigLIP so400m pooled output
}

fn default_top_n() -> usize {
    50
}

fn default_result_count() -> usize {
    20
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_unit_weight() -> f32 {
    1.0
}

fn default_caption_weight() -> f32 {
    0.5
}

fn default_rerank_concurrency() -> usize {
    8
}

fn default_penalty_multiplier() -> f32 {
    0.5
}

fn default_target_language() -> String {
    "en-IN".to_string()
}

fn default_detect_threshold() -> f64 {
    0.7
}

fn default_correct_threshold() -> f64 {
    0.8
}

fn default_vocabulary() -> Vec<String> {
    [
        "kundan", "polki", "meenakari", "jhumka", "temple", "antique", "gold", "silver",
        "diamond", "ruby", "emerald", "necklace", "earrings", "bangles", "bracelet",
        "pendant", "choker", "mangalsutra", "maangtikka", "nosepin", "ring", "studs",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn facet(name: &str, values: &[(&str, &[&str])]) -> FacetSpec {
    FacetSpec {
        name: name.to_string(),
        metadata_key: None,
        values: values
            .iter()
            .map(|(value, keywords)| FacetValueSpec {
                value: value.to_string(),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
            })
            .collect(),
    }
}

/// Built-in facet vocabulary
pub fn default_facets() -> Vec<FacetSpec> {
    vec![
        facet(
            "material",
            &[
                ("gold", &["gold", "golden", "yellow gold"]),
                ("silver", &["silver", "sterling", "sterling silver"]),
                ("rose gold", &["rose gold", "rose-gold", "pink gold"]),
                ("white gold", &["white gold"]),
                ("platinum", &["platinum"]),
            ],
        ),
        facet(
            "category",
            &[
                ("necklace", &["necklace", "necklaces", "haar"]),
                ("earrings", &["earring", "earrings", "jhumka", "jhumkas", "studs"]),
                ("ring", &["ring", "rings"]),
                ("bracelet", &["bracelet", "bracelets"]),
                ("bangle", &["bangle", "bangles", "kada"]),
                ("pendant", &["pendant", "pendants"]),
            ],
        ),
        facet(
            "stone",
            &[
                ("ruby", &["ruby", "rubies"]),
                ("emerald", &["emerald", "emeralds"]),
                ("diamond", &["diamond", "diamonds"]),
                ("pearl", &["pearl", "pearls"]),
                ("kundan", &["kundan"]),
                ("polki", &["polki"]),
            ],
        ),
    ]
}

impl TomlConfig {
    /// Parse a config file
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be read and `Error::Config`
    /// if it is not valid TOML for this schema.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
    }

    /// Resolve, load and validate configuration
    ///
    /// A config file that does not exist results in a warning and built-in
    /// defaults. A file that exists but fails to parse or validate is an error.
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_arg) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::load(&path)?
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Self::default()
            }
            None => {
                info!("No config file found, using built-in defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides for service endpoints and secrets
    ///
    /// **Priority:** ENV → TOML
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = resolve_sarvam_api_key(self) {
            self.services.sarvam_api_key = Some(key);
        }

        if let Ok(url) = std::env::var(INFERENCE_URL_ENV_VAR) {
            if !url.trim().is_empty() {
                info!("Inference URL overridden by {}", INFERENCE_URL_ENV_VAR);
                self.services.inference_url = url;
            }
        }

        if let Ok(url) = std::env::var(INDEX_URL_ENV_VAR) {
            if !url.trim().is_empty() {
                info!("Index URL overridden by {}", INDEX_URL_ENV_VAR);
                self.services.index_url = url;
            }
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.search.embedding_dimension == 0 {
            return Err(Error::Config("search.embedding_dimension must be > 0".to_string()));
        }
        if self.search.top_n == 0 {
            return Err(Error::Config("search.top_n must be > 0".to_string()));
        }
        if self.search.result_count == 0 {
            return Err(Error::Config("search.result_count must be > 0".to_string()));
        }
        if self.rerank.concurrency == 0 {
            return Err(Error::Config("rerank.concurrency must be > 0".to_string()));
        }
        if self.services.call_timeout_ms == 0 {
            return Err(Error::Config("services.call_timeout_ms must be > 0".to_string()));
        }

        let penalty = self.conflict.penalty_multiplier;
        if !(penalty > 0.0 && penalty <= 1.0) {
            return Err(Error::Config(format!(
                "conflict.penalty_multiplier must be in (0, 1], got {}",
                penalty
            )));
        }
        if let Some(min) = self.conflict.hard_filter_min_conflicts {
            if min < MIN_HARD_FILTER_CONFLICTS {
                return Err(Error::Config(format!(
                    "conflict.hard_filter_min_conflicts must be >= {} when set, got {} \
                     (single-conflict candidates are penalized, never dropped)",
                    MIN_HARD_FILTER_CONFLICTS, min
                )));
            }
        }

        let weights = [
            self.fusion.text_weight,
            self.fusion.image_weight,
            self.fusion.caption_weight,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Config("fusion weights must be finite and >= 0".to_string()));
        }
        if self.fusion.text_weight + self.fusion.image_weight <= 0.0 {
            return Err(Error::Config(
                "fusion.text_weight + fusion.image_weight must be > 0".to_string(),
            ));
        }

        for facet in &self.conflict.facets {
            if facet.name.trim().is_empty() {
                return Err(Error::Config("conflict facet with empty name".to_string()));
            }
            if facet.values.iter().any(|v| v.keywords.is_empty()) {
                return Err(Error::Config(format!(
                    "facet '{}' has a value without keywords",
                    facet.name
                )));
            }
        }

        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))
    }
}

/// Resolve the config file path
///
/// Returns `None` when no explicit path is given and no user config file exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory (only if present)
    default_config_path().filter(|p| p.exists())
}

/// Platform config file location (`<config_dir>/jewel-search/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("jewel-search").join("config.toml"))
}

/// Resolve the translation/STT API key
///
/// **Priority:** ENV → TOML
pub fn resolve_sarvam_api_key(config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(SARVAM_KEY_ENV_VAR)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = config
        .services
        .sarvam_api_key
        .as_ref()
        .filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!("Translation API key found in environment and TOML. Using environment (highest priority).");
    }

    env_key.or_else(|| toml_key.cloned())
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
