//! TOML configuration file loading
//!
//! Supports `~/.config/murmur/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct MurmurConfigFile {
    /// Directory for the vector store, metrics log and scratch audio
    #[serde(default)]
    pub data_dir: Option<String>,

    #[serde(default)]
    pub retrieval: RetrievalFileConfig,

    #[serde(default)]
    pub metrics: MetricsFileConfig,

    #[serde(default)]
    pub asr: AsrFileConfig,

    #[serde(default)]
    pub completion: CompletionFileConfig,

    #[serde(default)]
    pub tts: TtsFileConfig,

    #[serde(default)]
    pub audio: AudioFileConfig,

    #[serde(default)]
    pub server: ServerFileConfig,

    #[serde(default)]
    pub pipeline: PipelineFileConfig,
}

/// Retrieval index configuration
#[derive(Debug, Default, Deserialize)]
pub struct RetrievalFileConfig {
    /// Path of the persisted vector store
    pub store_path: Option<String>,

    /// Words per chunk
    pub chunk_size: Option<usize>,

    /// Chunks retrieved per query
    pub top_k: Option<usize>,

    /// Maximum cached query results
    pub cache_capacity: Option<usize>,

    /// Where ingested files are moved afterwards
    pub processed_dir: Option<String>,
}

/// Timing metrics configuration
#[derive(Debug, Default, Deserialize)]
pub struct MetricsFileConfig {
    pub enabled: Option<bool>,
    pub path: Option<String>,
    /// Rolling average window (runs)
    pub window: Option<usize>,
}

/// Speech recognition configuration
#[derive(Debug, Default, Deserialize)]
pub struct AsrFileConfig {
    /// "whisper-cli" or "openai"
    pub provider: Option<String>,
    pub binary: Option<String>,
    pub model: Option<String>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

/// Completion service configuration
#[derive(Debug, Default, Deserialize)]
pub struct CompletionFileConfig {
    pub url: Option<String>,
    pub n_predict: Option<u32>,
    pub fallback: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f64>,
    pub api_key: Option<String>,
}

/// Audio capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub record_secs: Option<u64>,
    pub work_dir: Option<String>,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub static_dir: Option<String>,
}

/// Pipeline behavior configuration
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// "soft" or "loud"
    pub failure_policy: Option<String>,
}

/// Load the TOML config file from `path`, or the standard path when `None`
///
/// Returns `MurmurConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> MurmurConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return MurmurConfigFile::default();
    };

    if !path.exists() {
        return MurmurConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content).unwrap_or_else(|e| {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config file, using defaults"
            );
            MurmurConfigFile::default()
        }),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            MurmurConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the TOML is malformed
pub fn parse_config(content: &str) -> crate::Result<MurmurConfigFile> {
    let config = toml::from_str(content)?;
    Ok(config)
}

/// Return the config file path: `~/.config/murmur/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("murmur").join("config.toml"))
}
