use crate::storage::write_atomic;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_TEXT_DIM: usize = 384;
const DEFAULT_IMAGE_DIM: usize = 512;
const DEFAULT_SAVE_INTERVAL: usize = 1;

const DEFAULT_MIN_LENGTH: usize = 5;
const DEFAULT_NEAR_DUPLICATE_THRESHOLD: f32 = 0.3;
/// Heuristic scale turning a squared distance into a 0..1 similarity
const DEFAULT_SIMILARITY_DIVISOR: f32 = 10.0;

const DEFAULT_K: usize = 10;
const DEFAULT_OVERFETCH_FACTOR: usize = 10;
const DEFAULT_UNFILTERED_FACTOR: usize = 2;
const DEFAULT_MAX_DEPTH: usize = 500;

const DEFAULT_TEXT_MODEL: &str = "all-MiniLM-L6-v2";
const DEFAULT_IMAGE_MODEL: &str = "clip-vit-b-32";
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

const CONFIG_FILE: &str = "config.yaml";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_text_dim")]
    pub text_dim: usize,

    #[serde(default = "default_image_dim")]
    pub image_dim: usize,

    /// Persist the index after this many accepted items
    #[serde(default = "default_save_interval")]
    pub save_interval: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            text_dim: DEFAULT_TEXT_DIM,
            image_dim: DEFAULT_IMAGE_DIM,
            save_interval: DEFAULT_SAVE_INTERVAL,
        }
    }
}

fn default_text_dim() -> usize {
    DEFAULT_TEXT_DIM
}

fn default_image_dim() -> usize {
    DEFAULT_IMAGE_DIM
}

fn default_save_interval() -> usize {
    DEFAULT_SAVE_INTERVAL
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Shorter texts (in characters) are junk
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    /// Squared distance below which a text counts as a near duplicate
    #[serde(default = "default_near_duplicate_threshold")]
    pub near_duplicate_threshold: f32,

    #[serde(default = "default_similarity_divisor")]
    pub similarity_divisor: f32,

    /// Lowercase substrings that mark clipboard boilerplate
    #[serde(default = "default_junk_patterns")]
    pub junk_patterns: Vec<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            near_duplicate_threshold: DEFAULT_NEAR_DUPLICATE_THRESHOLD,
            similarity_divisor: DEFAULT_SIMILARITY_DIVISOR,
            junk_patterns: default_junk_patterns(),
        }
    }
}

fn default_min_length() -> usize {
    DEFAULT_MIN_LENGTH
}

fn default_near_duplicate_threshold() -> f32 {
    DEFAULT_NEAR_DUPLICATE_THRESHOLD
}

fn default_similarity_divisor() -> f32 {
    DEFAULT_SIMILARITY_DIVISOR
}

fn default_junk_patterns() -> Vec<String> {
    ["copied to clipboard", "copy successful", "ctrl+c", "cmd+c"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Candidate depth multiplier when a filter is active
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,

    /// Candidate depth multiplier without filters
    #[serde(default = "default_unfiltered_factor")]
    pub unfiltered_factor: usize,

    /// Upper bound on filtered candidate depth per space
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: DEFAULT_K,
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
            unfiltered_factor: DEFAULT_UNFILTERED_FACTOR,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

fn default_k() -> usize {
    DEFAULT_K
}

fn default_overfetch_factor() -> usize {
    DEFAULT_OVERFETCH_FACTOR
}

fn default_unfiltered_factor() -> usize {
    DEFAULT_UNFILTERED_FACTOR
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Text space encoder (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_text_model")]
    pub text_model: String,

    /// Image space encoder, also used for text-to-image queries
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

fn default_text_model() -> String {
    DEFAULT_TEXT_MODEL.to_string()
}

fn default_image_model() -> String {
    DEFAULT_IMAGE_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.index.text_dim == 0 || self.index.image_dim == 0 {
            bail!("index dimensions must be greater than 0");
        }
        if self.index.text_dim > u16::MAX as usize || self.index.image_dim > u16::MAX as usize {
            bail!("index dimensions cannot exceed {}", u16::MAX);
        }
        if self.index.save_interval == 0 {
            bail!("index.save_interval must be greater than 0");
        }

        let dedup = &self.dedup;
        if !(dedup.near_duplicate_threshold >= 0.0) {
            bail!(
                "dedup.near_duplicate_threshold must be non-negative, got {}",
                dedup.near_duplicate_threshold
            );
        }
        if !(dedup.similarity_divisor > 0.0) {
            bail!(
                "dedup.similarity_divisor must be greater than 0, got {}",
                dedup.similarity_divisor
            );
        }
        if let Some(idx) = dedup.junk_patterns.iter().position(|p| p.trim().is_empty()) {
            bail!("dedup.junk_patterns #{} is empty", idx + 1);
        }

        let search = &self.search;
        if search.default_k == 0 {
            bail!("search.default_k must be greater than 0");
        }
        if search.overfetch_factor == 0 || search.unfiltered_factor == 0 {
            bail!("search over-fetch factors must be greater than 0");
        }
        if search.max_depth == 0 {
            bail!("search.max_depth must be greater than 0");
        }

        if self.models.download_timeout_secs == 0 {
            bail!("models.download_timeout_secs must be greater than 0");
        }

        Ok(())
    }

    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            let default_str = serde_yml::to_string(&Self::default())?;
            write_atomic(&path, default_str.as_bytes())
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        let config_str = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_str = serde_yml::to_string(&self)?;
        let path = self.base_path.join(CONFIG_FILE);
        write_atomic(&path, config_str.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))
    }
}
