use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::llm::client::CompletionOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>, // For OpenAI-compatible APIs

    /// Optional: Override max_tokens for LLM requests
    /// If not specified, uses provider-specific defaults:
    /// - anthropic: 4096
    /// - openai: 1500
    /// - openai-compatible (ollama): 16384
    /// - gemini: 8192
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// HTTP request timeout for provider calls (default: 120s)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

impl LlmConfig {
    /// Get max_tokens value, using provider-specific default if not specified
    pub fn get_max_tokens(&self) -> u32 {
        if let Some(tokens) = self.max_tokens {
            return tokens;
        }

        match self.provider.as_str() {
            "anthropic" => 4096,
            "openai" => 1500,
            "openai-compatible" => 16384, // ollama and similar
            "gemini" => 8192,
            _ => CompletionOptions::DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature passed to every provider call (default: 0.7)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Stop sequences passed to every provider call
    #[serde(default)]
    pub stop_sequences: Vec<String>,

    /// Where per-category test files and the run report are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Optional template directory (`<dir>/<category>/<name>_v<N>.jinja`).
    /// Bundled templates are used when unset or when a category has no match.
    #[serde(default)]
    pub template_dir: Option<PathBuf>,

    /// Template name looked up in each category (default: "default")
    #[serde(default = "default_template_name")]
    pub template_name: String,

    /// Generate categories concurrently (default: false)
    #[serde(default)]
    pub parallel: bool,
}

fn default_temperature() -> f32 {
    CompletionOptions::DEFAULT_TEMPERATURE
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("generated_tests")
}

fn default_template_name() -> String {
    "default".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            stop_sequences: Vec::new(),
            output_dir: default_output_dir(),
            template_dir: None,
            template_name: default_template_name(),
            parallel: false,
        }
    }
}

impl Config {
    /// Load configuration from a specific path, or use default search paths
    pub fn load_with_path(path: Option<String>) -> Result<Self> {
        if let Some(config_path) = path {
            debug!("Loading config from explicit path: {}", config_path);
            return Self::load_from_path(&config_path);
        }

        // Try working directory first (per-project config)
        if let Ok(config) = Self::load_from_path("aitestgen.toml") {
            debug!("Loaded config from ./aitestgen.toml");
            return Ok(config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("aitestgen").join("config.toml");
            if let Ok(config) = Self::load_from_path(&config_path) {
                debug!("Loaded config from {:?}", config_path);
                return Ok(config);
            }
        }

        debug!("Using default config");
        Ok(Self::default())
    }

    fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Read the provider credential from the environment variable named in
    /// config. This is the only place the environment is consulted; the value
    /// is handed to the provider constructor explicitly.
    pub fn get_api_key(&self) -> Result<String> {
        match &self.llm.api_key_env {
            Some(env_var) => {
                // Special case: "none" means no API key needed (e.g., Ollama)
                if env_var.to_lowercase() == "none" {
                    return Ok(String::new());
                }

                // openai-compatible: local models don't need keys, gateways do
                if self.llm.provider == "openai-compatible" {
                    return Ok(env::var(env_var).unwrap_or_default());
                }

                env::var(env_var).map_err(|_| {
                    anyhow::anyhow!("API key not found in environment variable: {}", env_var)
                })
            }
            None => Ok(String::new()),
        }
    }

    /// Completion options derived from generation settings and the provider's token budget
    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.generation.temperature,
            max_tokens: self.llm.get_max_tokens(),
            stop_sequences: self.generation.stop_sequences.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: "openai".to_string(),
                model: "gpt-4-turbo".to_string(),
                api_key_env: Some("OPENAI_API_KEY".to_string()),
                base_url: None,
                max_tokens: None,
                timeout_secs: default_timeout_secs(),
            },
            generation: GenerationConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.api_key_env, Some("OPENAI_API_KEY".to_string()));
        assert_eq!(config.generation.template_name, "default");
        assert!(!config.generation.parallel);
        assert!((config.generation.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("provider = \"openai\""));
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.llm.model, config.llm.model);
    }

    #[test]
    fn test_generation_section_optional() {
        let parsed: Config = toml::from_str(
            r#"
[llm]
provider = "anthropic"
model = "claude-sonnet-4-20250514"
api_key_env = "ANTHROPIC_API_KEY"
"#,
        )
        .unwrap();
        assert_eq!(parsed.generation.output_dir, PathBuf::from("generated_tests"));
        assert_eq!(parsed.llm.timeout_secs, 120);
        assert_eq!(parsed.llm.get_max_tokens(), 4096);
    }

    #[test]
    fn test_load_with_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(
            &path,
            r#"
[llm]
provider = "gemini"
model = "gemini-2.0-flash"
api_key_env = "GEMINI_API_KEY"

[generation]
temperature = 0.2
parallel = true
stop_sequences = ["<END>"]
"#,
        )
        .unwrap();

        let config = Config::load_with_path(Some(path.to_string_lossy().to_string())).unwrap();
        assert_eq!(config.llm.provider, "gemini");
        assert!(config.generation.parallel);
        let options = config.completion_options();
        assert!((options.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(options.max_tokens, 8192);
        assert_eq!(options.stop_sequences, vec!["<END>".to_string()]);
    }

    #[test]
    fn test_load_with_missing_explicit_path_fails() {
        let result = Config::load_with_path(Some("/nonexistent/aitestgen.toml".to_string()));
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_api_key_from_env() {
        env::set_var("AITESTGEN_TEST_API_KEY", "test_key_123");
        let mut config = Config::default();
        config.llm.api_key_env = Some("AITESTGEN_TEST_API_KEY".to_string());

        assert_eq!(config.get_api_key().unwrap(), "test_key_123");

        env::remove_var("AITESTGEN_TEST_API_KEY");
    }

    #[test]
    #[serial]
    fn test_api_key_missing_fails() {
        let mut config = Config::default();
        config.llm.api_key_env = Some("AITESTGEN_NONEXISTENT_KEY_XYZ".to_string());

        let err = config.get_api_key().unwrap_err();
        assert!(err.to_string().contains("API key not found"));
    }

    #[test]
    fn test_api_key_none_for_ollama() {
        let mut config = Config::default();
        config.llm.api_key_env = Some("none".to_string());
        assert_eq!(config.get_api_key().unwrap(), "");
    }

    #[test]
    #[serial]
    fn test_api_key_openai_compatible_missing_ok() {
        let mut config = Config::default();
        config.llm.provider = "openai-compatible".to_string();
        config.llm.api_key_env = Some("AITESTGEN_NONEXISTENT_KEY_OAI_999".to_string());
        assert_eq!(config.get_api_key().unwrap(), "");
    }

    #[test]
    fn test_max_tokens_provider_defaults() {
        let mut llm = Config::default().llm;
        assert_eq!(llm.get_max_tokens(), 1500);

        llm.provider = "anthropic".to_string();
        assert_eq!(llm.get_max_tokens(), 4096);

        llm.provider = "openai-compatible".to_string();
        assert_eq!(llm.get_max_tokens(), 16384);

        llm.provider = "gemini".to_string();
        assert_eq!(llm.get_max_tokens(), 8192);

        // Explicit override wins
        llm.max_tokens = Some(2000);
        assert_eq!(llm.get_max_tokens(), 2000);
    }
}
