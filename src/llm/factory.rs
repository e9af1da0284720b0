use anyhow::{bail, Result};

use super::client::{LlmClient, MockLlmClient};
use super::client_impl::{AnthropicClient, GeminiClient, OpenAIClient};
use crate::config::LlmConfig;
use crate::util::SecretString;

/// Create a completion provider from its configuration and an explicitly
/// supplied credential. The credential is resolved by the caller
/// (see `Config::get_api_key`); nothing here reads the environment.
pub fn create_client(
    llm_config: &LlmConfig,
    api_key: SecretString,
    dry_run: bool,
) -> Result<Box<dyn LlmClient>> {
    if dry_run {
        return Ok(Box::new(MockLlmClient::new()));
    }

    let timeout = llm_config.timeout_secs;

    match llm_config.provider.as_str() {
        "anthropic" => Ok(Box::new(AnthropicClient::new(
            api_key,
            llm_config.model.clone(),
            timeout,
        )?)),

        "openai" => Ok(Box::new(OpenAIClient::new(
            api_key,
            llm_config.model.clone(),
            timeout,
        )?)),

        "openai-compatible" => {
            let base_url = llm_config
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434/v1".to_string());

            Ok(Box::new(OpenAIClient::with_base_url(
                api_key,
                llm_config.model.clone(),
                base_url,
                timeout,
            )?))
        }

        "gemini" => Ok(Box::new(GeminiClient::new(
            api_key,
            llm_config.model.clone(),
            timeout,
        )?)),

        unknown => bail!("Unknown LLM provider: {}", unknown),
    }
}
