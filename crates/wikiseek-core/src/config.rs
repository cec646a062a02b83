//! Configuration types for the wikiseek retrieval engine.
//!
//! Every heuristic table the scoring policy consumes lives here as data,
//! so ranking behavior is tunable from a TOML file without code changes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the wikiseek system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WikiseekConfig {
    /// Vector index configuration.
    #[serde(default)]
    pub index: IndexConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Query refinement configuration.
    #[serde(default)]
    pub refiner: RefinerConfig,

    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Ranking heuristics.
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Deduplication configuration.
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Search history configuration.
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Vector index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory holding `index.vec` and `metadata.json`.
    pub dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir().join("index"),
        }
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Path to the ONNX model file.
    pub model_path: PathBuf,

    /// Path to the tokenizer.json file.
    pub tokenizer_path: PathBuf,

    /// Batch size for passage embedding.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let model_dir = default_data_dir().join("models").join("e5-large-v2");
        Self {
            model_path: model_dir.join("model.onnx"),
            tokenizer_path: model_dir.join("tokenizer.json"),
            batch_size: 32,
            num_threads: 4,
        }
    }
}

/// Query refinement configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinerConfig {
    /// Whether searches refine by default.
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of an Ollama-compatible generation endpoint.
    #[serde(default = "default_refiner_endpoint")]
    pub endpoint: String,

    /// Model name passed to the endpoint.
    #[serde(default = "default_refiner_model")]
    pub model: String,

    /// Hard deadline on a refinement call; on expiry the engine falls
    /// back to the original query.
    #[serde(default = "default_refiner_timeout")]
    pub timeout_secs: u64,

    /// Maximum tokens to generate.
    #[serde(default = "default_refiner_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_refiner_temperature")]
    pub temperature: f32,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_refiner_endpoint(),
            model: default_refiner_model(),
            timeout_secs: default_refiner_timeout(),
            max_tokens: default_refiner_max_tokens(),
            temperature: default_refiner_temperature(),
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of results.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Maximum number of results.
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,

    /// Over-fetch multiplier applied before deduplication. A tuned
    /// constant, not a law.
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,

    /// Whether deduplication runs by default.
    #[serde(default = "default_true")]
    pub dedup: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            overfetch_factor: default_overfetch_factor(),
            dedup: true,
        }
    }
}

/// One authoritative-page tier: a set of title keywords and the boost
/// applied when any of them matches. Tiers are ordered; the first match
/// wins and at most one applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityTier {
    pub keywords: Vec<String>,
    pub multiplier: f32,
}

/// Colloquial query token mapped to its technical synonym cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicCluster {
    pub trigger: String,
    pub synonyms: Vec<String>,
}

/// Content-length tier: minimum character count and the boost it earns.
/// Tiers are ordered descending; the first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LengthTier {
    pub min_chars: usize,
    pub multiplier: f32,
}

/// Ranking heuristics. All multipliers are strictly positive so a boosted
/// score keeps the sign of the base similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Authoritative-page tiers, most specific first.
    #[serde(default = "default_authority_tiers")]
    pub authority_tiers: Vec<AuthorityTier>,

    /// Colloquial-term synonym clusters.
    #[serde(default = "default_topic_clusters")]
    pub topic_clusters: Vec<TopicCluster>,

    /// Boost when a triggered cluster term appears in the title or
    /// content prefix. Applied at most once per result.
    #[serde(default = "default_topic_multiplier")]
    pub topic_multiplier: f32,

    /// How many leading content characters topic matching inspects.
    #[serde(default = "default_topic_prefix_chars")]
    pub topic_prefix_chars: usize,

    /// Generic indicator words counted in title + section path.
    #[serde(default = "default_comprehensive_terms")]
    pub comprehensive_terms: Vec<String>,

    /// Indicator count needed for the comprehensiveness boost.
    #[serde(default = "default_comprehensive_threshold")]
    pub comprehensive_threshold: usize,

    /// Comprehensiveness boost.
    #[serde(default = "default_comprehensive_multiplier")]
    pub comprehensive_multiplier: f32,

    /// Content-length tiers, longest first.
    #[serde(default = "default_length_tiers")]
    pub length_tiers: Vec<LengthTier>,

    /// Actionable verbs indicating hands-on content.
    #[serde(default = "default_action_verbs")]
    pub action_verbs: Vec<String>,

    /// Distinct verb occurrences needed for the verb boost.
    #[serde(default = "default_action_verb_threshold")]
    pub action_verb_threshold: usize,

    /// Actionable-verb boost.
    #[serde(default = "default_action_verb_multiplier")]
    pub action_verb_multiplier: f32,

    /// Markers for code blocks or shell commands.
    #[serde(default = "default_code_markers")]
    pub code_markers: Vec<String>,

    /// Code-presence boost.
    #[serde(default = "default_code_multiplier")]
    pub code_multiplier: f32,

    /// Query words marking an overview-seeking intent.
    #[serde(default = "default_overview_terms")]
    pub overview_terms: Vec<String>,

    /// Granularity multipliers for overview-seeking queries.
    #[serde(default = "default_overview_large")]
    pub overview_large: f32,
    #[serde(default = "default_overview_medium")]
    pub overview_medium: f32,
    #[serde(default = "default_overview_small")]
    pub overview_small: f32,

    /// Small-chunk multiplier for narrow queries.
    #[serde(default = "default_narrow_small")]
    pub narrow_small: f32,

    /// Maximum exact-title-match boost for refined-query tokens
    /// (fraction of +50% by default). Tuned constant.
    #[serde(default = "default_refined_match_ceiling")]
    pub refined_match_ceiling: f32,

    /// Maximum exact-title-match boost for original-query tokens.
    #[serde(default = "default_original_match_ceiling")]
    pub original_match_ceiling: f32,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            authority_tiers: default_authority_tiers(),
            topic_clusters: default_topic_clusters(),
            topic_multiplier: default_topic_multiplier(),
            topic_prefix_chars: default_topic_prefix_chars(),
            comprehensive_terms: default_comprehensive_terms(),
            comprehensive_threshold: default_comprehensive_threshold(),
            comprehensive_multiplier: default_comprehensive_multiplier(),
            length_tiers: default_length_tiers(),
            action_verbs: default_action_verbs(),
            action_verb_threshold: default_action_verb_threshold(),
            action_verb_multiplier: default_action_verb_multiplier(),
            code_markers: default_code_markers(),
            code_multiplier: default_code_multiplier(),
            overview_terms: default_overview_terms(),
            overview_large: default_overview_large(),
            overview_medium: default_overview_medium(),
            overview_small: default_overview_small(),
            narrow_small: default_narrow_small(),
            refined_match_ceiling: default_refined_match_ceiling(),
            original_match_ceiling: default_original_match_ceiling(),
        }
    }
}

/// Known textual variant folded during title normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleVariant {
    pub from: String,
    pub to: String,
}

/// Deduplication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Variant folds applied before punctuation stripping.
    #[serde(default = "default_title_variants")]
    pub title_variants: Vec<TitleVariant>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            title_variants: default_title_variants(),
        }
    }
}

/// Search history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Path to the SQLite history database.
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("history.db"),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    32
}

fn default_num_threads() -> usize {
    4
}

fn default_refiner_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_refiner_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_refiner_timeout() -> u64 {
    30
}

fn default_refiner_max_tokens() -> u32 {
    64
}

fn default_refiner_temperature() -> f32 {
    0.7
}

fn default_top_k() -> usize {
    5
}

fn default_max_top_k() -> usize {
    50
}

fn default_overfetch_factor() -> usize {
    3
}

fn default_authority_tiers() -> Vec<AuthorityTier> {
    vec![
        AuthorityTier {
            keywords: vec![
                "network configuration".to_string(),
                "installation guide".to_string(),
                "general recommendations".to_string(),
            ],
            multiplier: 1.5,
        },
        AuthorityTier {
            keywords: vec!["guide".to_string(), "getting started".to_string()],
            multiplier: 1.3,
        },
    ]
}

fn default_topic_clusters() -> Vec<TopicCluster> {
    fn cluster(trigger: &str, synonyms: &[&str]) -> TopicCluster {
        TopicCluster {
            trigger: trigger.to_string(),
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        }
    }

    vec![
        cluster("wifi", &["wireless", "network", "iwctl", "networkmanager"]),
        cluster("sound", &["audio", "alsa", "pulseaudio", "pipewire"]),
        cluster("graphics", &["video", "xorg", "nvidia", "mesa", "driver"]),
        cluster("bluetooth", &["bluez", "bluetoothctl"]),
        cluster("boot", &["grub", "systemd-boot", "bootloader", "uefi"]),
        cluster("internet", &["network", "ethernet", "dhcp"]),
    ]
}

fn default_topic_multiplier() -> f32 {
    1.2
}

fn default_topic_prefix_chars() -> usize {
    200
}

fn default_comprehensive_terms() -> Vec<String> {
    [
        "configuration",
        "setup",
        "troubleshooting",
        "guide",
        "installation",
        "usage",
        "examples",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_comprehensive_threshold() -> usize {
    2
}

fn default_comprehensive_multiplier() -> f32 {
    1.25
}

fn default_length_tiers() -> Vec<LengthTier> {
    vec![
        LengthTier {
            min_chars: 1000,
            multiplier: 1.15,
        },
        LengthTier {
            min_chars: 500,
            multiplier: 1.1,
        },
    ]
}

fn default_action_verbs() -> Vec<String> {
    [
        "install", "configure", "enable", "start", "create", "edit", "set", "run",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_action_verb_threshold() -> usize {
    2
}

fn default_action_verb_multiplier() -> f32 {
    1.05
}

fn default_code_markers() -> Vec<String> {
    ["```", "$ ", "systemctl", "pacman", "sudo"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_code_multiplier() -> f32 {
    1.05
}

fn default_overview_terms() -> Vec<String> {
    ["how", "setup", "configure", "guide", "install", "getting"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_overview_large() -> f32 {
    1.2
}

fn default_overview_medium() -> f32 {
    1.1
}

fn default_overview_small() -> f32 {
    0.95
}

fn default_narrow_small() -> f32 {
    1.05
}

fn default_refined_match_ceiling() -> f32 {
    0.5
}

fn default_original_match_ceiling() -> f32 {
    0.3
}

fn default_title_variants() -> Vec<TitleVariant> {
    vec![
        TitleVariant {
            from: "wi-fi".to_string(),
            to: "wifi".to_string(),
        },
        TitleVariant {
            from: "wi_fi".to_string(),
            to: "wifi".to_string(),
        },
    ]
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wikiseek")
}

impl WikiseekConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::WikiseekError::config(format!("Failed to parse config: {}", e))
        })?;
        Ok(config)
    }

    /// Load configuration from default paths, falling back to defaults.
    pub fn load_default() -> crate::error::Result<Self> {
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("wikiseek").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        let local_config = PathBuf::from("wikiseek.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }
}
