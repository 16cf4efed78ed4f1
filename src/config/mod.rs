//! Configuration management for Murmur
//!
//! Values resolve as env > TOML file > default.

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

pub use file::{MurmurConfigFile, config_file_path, load_config_file};

/// Murmur configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the vector store, metrics log and scratch audio
    pub data_dir: PathBuf,

    pub retrieval: RetrievalConfig,

    pub metrics: MetricsConfig,

    pub asr: AsrConfig,

    pub completion: CompletionConfig,

    pub tts: TtsConfig,

    pub audio: AudioConfig,

    pub server: ServerConfig,

    pub pipeline: PipelineConfig,
}

/// Retrieval index configuration
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Persisted vector store file
    pub store_path: PathBuf,

    /// Words per chunk
    pub chunk_size: usize,

    /// Chunks retrieved per query
    pub top_k: usize,

    /// Maximum number of cached query results
    pub cache_capacity: usize,

    /// Optional directory ingested files are moved into
    pub processed_dir: Option<PathBuf>,
}

/// Timing metrics configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Append completed runs to the CSV log
    pub enabled: bool,

    /// CSV log path
    pub path: PathBuf,

    /// Rolling average window capacity
    pub window: usize,
}

/// Which speech recognizer to invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsrProvider {
    /// Local whisper.cpp command line binary
    WhisperCli,
    /// OpenAI-compatible transcription endpoint
    OpenAi,
}

impl FromStr for AsrProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "whisper-cli" | "whisper" | "local" => Ok(Self::WhisperCli),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown ASR provider: {other}"))),
        }
    }
}

/// Speech recognition configuration
#[derive(Debug, Clone)]
pub struct AsrConfig {
    pub provider: AsrProvider,

    /// whisper-cli binary (path or name on `PATH`)
    pub binary: String,

    /// ggml model file passed to whisper-cli
    pub model: PathBuf,

    /// Transcription endpoint for the HTTP provider
    pub api_url: String,

    /// API key for the HTTP provider
    pub api_key: Option<String>,
}

/// Completion service configuration
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Base URL of the llama.cpp-style server
    pub url: String,

    /// Generation-length hint
    pub n_predict: u32,

    /// Reply used when the response cannot be parsed
    pub fallback: String,

    /// Request timeout
    pub timeout: Duration,
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub url: String,
    pub model: String,
    pub voice: String,
    /// Speed multiplier (0.25 to 4.0)
    pub speed: f64,
    pub api_key: Option<String>,
}

/// Audio capture configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Fixed recording length per utterance
    pub record_secs: u64,

    /// Scratch directory for recorded and synthesized audio
    pub work_dir: PathBuf,
}

/// HTTP/WebSocket server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Web client directory served at `/`
    pub static_dir: Option<PathBuf>,
}

/// What a degraded stage does to the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Substitute the fallback value and keep going
    #[default]
    Soft,
    /// Abort the run at the first degraded stage
    Loud,
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "soft" => Ok(Self::Soft),
            "loud" => Ok(Self::Loud),
            other => Err(Error::Config(format!("unknown failure policy: {other}"))),
        }
    }
}

/// Pipeline behavior configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineConfig {
    pub failure_policy: FailurePolicy,
}

/// Default data directory: `~/.local/share/murmur` on Linux
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".murmur"),
        |d| d.data_dir().join("murmur"),
    )
}

fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| {
        v.parse().ok().or_else(|| {
            tracing::warn!(key, value = %v, "ignoring unparsable environment value");
            None
        })
    })
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl Config {
    /// Load configuration from the environment and the TOML file
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range or names an unknown variant
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = load_config_file(config_path);
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range or names an unknown variant
    #[allow(clippy::too_many_lines)]
    pub fn from_sources(
        fc: MurmurConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let data_dir = env("MURMUR_DATA_DIR")
            .or(fc.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        let retrieval = RetrievalConfig {
            store_path: env("MURMUR_STORE_PATH")
                .or(fc.retrieval.store_path)
                .map_or_else(|| data_dir.join("vector_store.json"), PathBuf::from),
            chunk_size: parse_env(&env, "MURMUR_CHUNK_SIZE")
                .or(fc.retrieval.chunk_size)
                .unwrap_or(crate::retrieval::DEFAULT_CHUNK_SIZE),
            top_k: parse_env(&env, "MURMUR_TOP_K")
                .or(fc.retrieval.top_k)
                .unwrap_or(crate::retrieval::DEFAULT_TOP_K),
            cache_capacity: parse_env(&env, "MURMUR_CACHE_CAPACITY")
                .or(fc.retrieval.cache_capacity)
                .unwrap_or(crate::retrieval::DEFAULT_CACHE_CAPACITY),
            processed_dir: env("MURMUR_PROCESSED_DIR")
                .or(fc.retrieval.processed_dir)
                .map(PathBuf::from),
        };

        if retrieval.chunk_size == 0 {
            return Err(Error::Config("retrieval.chunk_size must be at least 1".to_string()));
        }
        if retrieval.cache_capacity == 0 {
            return Err(Error::Config(
                "retrieval.cache_capacity must be at least 1".to_string(),
            ));
        }

        let metrics = MetricsConfig {
            enabled: env("MURMUR_METRICS")
                .map(|v| parse_bool(&v))
                .or(fc.metrics.enabled)
                .unwrap_or(true),
            path: env("MURMUR_METRICS_PATH")
                .or(fc.metrics.path)
                .map_or_else(|| data_dir.join("metrics.csv"), PathBuf::from),
            window: parse_env(&env, "MURMUR_METRICS_WINDOW")
                .or(fc.metrics.window)
                .unwrap_or(crate::metrics::DEFAULT_WINDOW),
        };

        if metrics.window == 0 {
            return Err(Error::Config("metrics.window must be at least 1".to_string()));
        }

        let asr = AsrConfig {
            provider: env("MURMUR_ASR_PROVIDER")
                .or(fc.asr.provider)
                .map(|p| p.parse())
                .transpose()?
                .unwrap_or(AsrProvider::WhisperCli),
            binary: env("MURMUR_WHISPER_BIN")
                .or(fc.asr.binary)
                .unwrap_or_else(|| "./whisper.cpp/build/bin/whisper-cli".to_string()),
            model: env("MURMUR_WHISPER_MODEL")
                .or(fc.asr.model)
                .map_or_else(|| PathBuf::from("models/ggml-base.en.bin"), PathBuf::from),
            api_url: env("MURMUR_ASR_URL").or(fc.asr.api_url).unwrap_or_else(|| {
                "https://api.openai.com/v1/audio/transcriptions".to_string()
            }),
            api_key: env("OPENAI_API_KEY").or(fc.asr.api_key),
        };

        let completion = CompletionConfig {
            url: env("MURMUR_COMPLETION_URL")
                .or(fc.completion.url)
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            n_predict: parse_env(&env, "MURMUR_N_PREDICT")
                .or(fc.completion.n_predict)
                .unwrap_or(100),
            fallback: fc
                .completion
                .fallback
                .unwrap_or_else(|| crate::services::COMPLETION_FALLBACK.to_string()),
            timeout: Duration::from_secs(
                parse_env(&env, "MURMUR_COMPLETION_TIMEOUT")
                    .or(fc.completion.timeout_secs)
                    .unwrap_or(120),
            ),
        };

        let tts = TtsConfig {
            url: env("MURMUR_TTS_URL")
                .or(fc.tts.url)
                .unwrap_or_else(|| "https://api.openai.com/v1/audio/speech".to_string()),
            model: env("MURMUR_TTS_MODEL")
                .or(fc.tts.model)
                .unwrap_or_else(|| "tts-1".to_string()),
            voice: env("MURMUR_TTS_VOICE")
                .or(fc.tts.voice)
                .unwrap_or_else(|| "alloy".to_string()),
            speed: fc.tts.speed.unwrap_or(1.0).clamp(0.25, 4.0),
            api_key: env("OPENAI_API_KEY").or(fc.tts.api_key),
        };

        let audio = AudioConfig {
            record_secs: parse_env(&env, "MURMUR_RECORD_SECS")
                .or(fc.audio.record_secs)
                .unwrap_or(5),
            work_dir: env("MURMUR_WORK_DIR")
                .or(fc.audio.work_dir)
                .map_or_else(|| data_dir.join("audio"), PathBuf::from),
        };

        let server = ServerConfig {
            host: env("MURMUR_HOST")
                .or(fc.server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_env(&env, "MURMUR_PORT")
                .or(fc.server.port)
                .unwrap_or(5000),
            static_dir: env("MURMUR_STATIC_DIR")
                .or(fc.server.static_dir)
                .map(PathBuf::from),
        };

        let pipeline = PipelineConfig {
            failure_policy: env("MURMUR_FAILURE_POLICY")
                .or(fc.pipeline.failure_policy)
                .map(|p| p.parse())
                .transpose()?
                .unwrap_or_default(),
        };

        Ok(Self {
            data_dir,
            retrieval,
            metrics,
            asr,
            completion,
            tts,
            audio,
            server,
            pipeline,
        })
    }

    /// Create the data and scratch directories
    ///
    /// # Errors
    ///
    /// Returns error if a directory cannot be created
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.audio.work_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config =
            Config::from_sources(MurmurConfigFile::default(), env_from(&[("MURMUR_DATA_DIR", "/tmp/m")]))
                .unwrap();

        assert_eq!(config.retrieval.chunk_size, 200);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.store_path, PathBuf::from("/tmp/m/vector_store.json"));
        assert_eq!(config.metrics.window, 5);
        assert!(config.metrics.enabled);
        assert_eq!(config.completion.n_predict, 100);
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.audio.record_secs, 5);
        assert_eq!(config.asr.provider, AsrProvider::WhisperCli);
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::Soft);
    }

    #[test]
    fn env_overrides_file() {
        let fc = file::parse_config(
            r"
            [retrieval]
            chunk_size = 50
            top_k = 7
            ",
        )
        .unwrap();

        let config = Config::from_sources(fc, env_from(&[("MURMUR_CHUNK_SIZE", "80")])).unwrap();

        assert_eq!(config.retrieval.chunk_size, 80);
        assert_eq!(config.retrieval.top_k, 7);
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let result =
            Config::from_sources(MurmurConfigFile::default(), env_from(&[("MURMUR_CHUNK_SIZE", "0")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn rejects_unknown_policy() {
        let result = Config::from_sources(
            MurmurConfigFile::default(),
            env_from(&[("MURMUR_FAILURE_POLICY", "panic")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn metrics_toggle_from_env() {
        let config =
            Config::from_sources(MurmurConfigFile::default(), env_from(&[("MURMUR_METRICS", "false")]))
                .unwrap();
        assert!(!config.metrics.enabled);
    }
}
