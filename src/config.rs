use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrapeConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_start_url")]
    pub start_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Pause after each web-derived item, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_source_label")]
    pub source_label: String,
    #[serde(default)]
    pub selectors: SelectorConfig,
    #[serde(default = "default_sections")]
    pub sections: Vec<String>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            start_url: default_start_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            delay_ms: default_delay_ms(),
            source_label: default_source_label(),
            selectors: SelectorConfig::default(),
            sections: default_sections(),
        }
    }
}

fn default_base_url() -> String {
    "https://editorial.rottentomatoes.com".to_string()
}
fn default_start_url() -> String {
    "https://editorial.rottentomatoes.com/guide/best-new-movies/".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/91.0.4472.124 Safari/537.36"
        .to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_delay_ms() -> u64 {
    1000
}
fn default_source_label() -> String {
    "Rotten Tomatoes - Best New Movies".to_string()
}
fn default_sections() -> Vec<String> {
    vec![
        "Critics Consensus".to_string(),
        "Synopsis".to_string(),
        "Starring".to_string(),
        "Directed By".to_string(),
    ]
}

/// CSS selectors for the listing markup.
#[derive(Debug, Deserialize, Clone)]
pub struct SelectorConfig {
    #[serde(default = "default_item_selector")]
    pub item: String,
    #[serde(default = "default_position_selector")]
    pub position: String,
    #[serde(default = "default_title_selector")]
    pub title: String,
    #[serde(default = "default_score_selector")]
    pub score: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            item: default_item_selector(),
            position: default_position_selector(),
            title: default_title_selector(),
            score: default_score_selector(),
        }
    }
}

fn default_item_selector() -> String {
    "div.row.countdown-item".to_string()
}
fn default_position_selector() -> String {
    "span.countdown-index".to_string()
}
fn default_title_selector() -> String {
    "h2".to_string()
}
fn default_score_selector() -> String {
    "span.tMeterScore".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_archive_dest")]
    pub dest: PathBuf,
    #[serde(default = "default_archive_label")]
    pub source_label: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            download_timeout_secs: default_timeout_secs(),
            dest: default_archive_dest(),
            source_label: default_archive_label(),
        }
    }
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["txt".to_string(), "pdf".to_string(), "json".to_string()]
}
fn default_archive_dest() -> PathBuf {
    PathBuf::from("./data/extracted")
}
fn default_archive_label() -> String {
    "archive".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_language")]
    pub language: String,
    #[serde(default = "default_ocr_dpi")]
    pub dpi: f32,
    /// Upper bound on rasterized pages per document.
    #[serde(default = "default_ocr_max_pages")]
    pub max_pages: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: default_ocr_language(),
            dpi: default_ocr_dpi(),
            max_pages: default_ocr_max_pages(),
        }
    }
}

fn default_ocr_language() -> String {
    "spa".to_string()
}
fn default_ocr_dpi() -> f32 {
    200.0
}
fn default_ocr_max_pages() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,
    #[serde(default = "default_slug_max_len")]
    pub slug_max_len: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            manifest_name: default_manifest_name(),
            slug_max_len: default_slug_max_len(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}
fn default_manifest_name() -> String {
    "all_movies_combined.json".to_string()
}
fn default_slug_max_len() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranslationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_source_lang")]
    pub source_lang: String,
    #[serde(default = "default_target_lang")]
    pub target_lang: String,
    /// Input is truncated to this many characters before the service call.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_translate_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Record fields to translate; empty means title plus every section.
    #[serde(default)]
    pub fields: Vec<String>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source_lang: default_source_lang(),
            target_lang: default_target_lang(),
            max_chars: default_max_chars(),
            endpoint: default_translate_endpoint(),
            timeout_secs: default_timeout_secs(),
            fields: Vec::new(),
        }
    }
}

fn default_source_lang() -> String {
    "auto".to_string()
}
fn default_target_lang() -> String {
    "es".to_string()
}
fn default_max_chars() -> usize {
    4500
}
fn default_translate_endpoint() -> String {
    "https://translate.googleapis.com/translate_a/single".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Generous by default: the target service may need to load models on first use.
    #[serde(default = "default_index_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: None,
            index_name: default_index_name(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_index_timeout_secs(),
        }
    }
}

fn default_index_name() -> String {
    "harvest".to_string()
}
fn default_api_key_env() -> String {
    "HARVEST_ES_API_KEY".to_string()
}
fn default_index_timeout_secs() -> u64 {
    300
}

impl IndexConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

impl Config {
    /// Defaults for every section, used when no config file is present.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate scrape
    url::Url::parse(&config.scrape.base_url)
        .with_context(|| format!("scrape.base_url is not a valid URL: {}", config.scrape.base_url))?;
    if config.scrape.timeout_secs == 0 {
        anyhow::bail!("scrape.timeout_secs must be > 0");
    }
    if config.scrape.selectors.item.trim().is_empty() {
        anyhow::bail!("scrape.selectors.item must not be empty");
    }

    // Validate archive
    if config.archive.allowed_extensions.is_empty() {
        anyhow::bail!("archive.allowed_extensions must list at least one extension");
    }
    if config.archive.download_timeout_secs == 0 {
        anyhow::bail!("archive.download_timeout_secs must be > 0");
    }

    // Validate output
    if config.output.slug_max_len == 0 {
        anyhow::bail!("output.slug_max_len must be > 0");
    }
    if config.output.manifest_name.trim().is_empty() {
        anyhow::bail!("output.manifest_name must not be empty");
    }

    // Validate translation
    if config.translation.max_chars == 0 {
        anyhow::bail!("translation.max_chars must be > 0");
    }

    if config.index.timeout_secs == 0 {
        anyhow::bail!("index.timeout_secs must be > 0");
    }

    Ok(())
}
