use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::semantic::{
    DEFAULT_MAX_RESULTS, DEFAULT_MIN_CHUNK_CHARS, DEFAULT_MODEL, DEFAULT_RELEVANCE_THRESHOLD,
};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Configuration for the semantic index
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SemanticIndexConfig {
    /// Enable or disable semantic indexing and search
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Embedding model name (e.g., "paraphrase-multilingual-minilm-l12-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Cosine-distance cutoff [0.0, 1.0]; hits at or beyond it are dropped
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,

    /// Minimum trimmed paragraph length (chars) for a chunk to be indexed
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,

    /// Number of nearest chunks fetched per query before note collapsing
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for SemanticIndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: DEFAULT_MODEL.to_string(),
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
            min_chunk_chars: DEFAULT_MIN_CHUNK_CHARS,
            max_results: DEFAULT_MAX_RESULTS,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_relevance_threshold() -> f32 {
    DEFAULT_RELEVANCE_THRESHOLD
}

fn default_min_chunk_chars() -> usize {
    DEFAULT_MIN_CHUNK_CHARS
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Address the daemon listens on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub semantic_index: SemanticIndexConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            semantic_index: SemanticIndexConfig::default(),
            base_path: String::new(),
        }
    }
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

/// Resolve the data directory: `NOTA_BASE_PATH` env var or `~/.local/share/nota`.
pub fn base_path() -> String {
    std::env::var("NOTA_BASE_PATH").unwrap_or_else(|_| {
        format!(
            "{}/.local/share/nota",
            homedir::my_home()
                .expect("couldnt find home dir")
                .expect("couldnt find home dir")
                .to_string_lossy()
        )
    })
}

impl Config {
    fn validate(&self) {
        let sem = &self.semantic_index;
        if !(0.0..=1.0).contains(&sem.relevance_threshold) {
            panic!(
                "semantic_index.relevance_threshold must be between 0.0 and 1.0, got {}",
                sem.relevance_threshold
            );
        }

        if sem.max_results == 0 {
            panic!("semantic_index.max_results must be greater than 0");
        }

        if sem.download_timeout_secs == 0 {
            panic!("semantic_index.download_timeout_secs must be greater than 0");
        }
    }

    pub fn load_with(base_path: &str) -> Self {
        std::fs::create_dir_all(base_path).expect("couldnt create data directory");
        let config_path = Path::new(base_path).join("config.yaml");

        // create new if does not exist
        if !config_path.exists() {
            std::fs::write(
                &config_path,
                serde_yml::to_string(&Self::default()).unwrap(),
            )
            .expect("couldnt write default config");
        }

        let config_str =
            std::fs::read_to_string(&config_path).expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let config_path = Path::new(&self.base_path).join("config.yaml");
        let config_str = serde_yml::to_string(&self).unwrap();
        std::fs::write(config_path, config_str).expect("couldnt write config");
    }

    pub fn base_path(&self) -> PathBuf {
        PathBuf::from(&self.base_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert!(config.semantic_index.enabled);
        assert_eq!(config.semantic_index.model, DEFAULT_MODEL);
        assert!((config.semantic_index.relevance_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.semantic_index.min_chunk_chars, 50);
        assert_eq!(config.semantic_index.max_results, 5);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: Config = serde_yml::from_str("semantic_index:\n  max_results: 10\n").unwrap();
        assert_eq!(config.semantic_index.max_results, 10);
        assert_eq!(config.semantic_index.model, DEFAULT_MODEL);
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
    }

    #[test]
    #[should_panic(expected = "relevance_threshold")]
    fn test_out_of_range_threshold_rejected() {
        let config: Config =
            serde_yml::from_str("semantic_index:\n  relevance_threshold: 1.5\n").unwrap();
        config.validate();
    }

    #[test]
    fn test_load_creates_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_str().unwrap();

        let config = Config::load_with(base);
        assert!(dir.path().join("config.yaml").exists());

        let reloaded = Config::load_with(base);
        assert_eq!(config.listen_addr, reloaded.listen_addr);
        assert_eq!(
            config.semantic_index.max_results,
            reloaded.semantic_index.max_results
        );
    }
}
