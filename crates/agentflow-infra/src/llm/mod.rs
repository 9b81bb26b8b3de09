//! Text-generation provider implementations.
//!
//! [`create_provider`] builds the configured provider when its API key is
//! available. Without a key the builtin steps fall back to templates, so a
//! missing key is not an error.

pub mod anthropic;

use secrecy::SecretString;

use agentflow_core::llm::box_provider::BoxTextGenerationProvider;
use agentflow_core::llm::provider::GenerationError;
use agentflow_types::config::GenerationConfig;

use self::anthropic::AnthropicProvider;

/// Build a provider from `config`, reading the key from the environment
/// variable it names.
pub fn create_provider(
    config: &GenerationConfig,
) -> Result<Option<BoxTextGenerationProvider>, GenerationError> {
    let key = std::env::var(&config.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty());
    create_provider_with_key(config, key)
}

/// Like [`create_provider`] with the key supplied directly.
pub fn create_provider_with_key(
    config: &GenerationConfig,
    api_key: Option<String>,
) -> Result<Option<BoxTextGenerationProvider>, GenerationError> {
    let Some(key) = api_key else {
        tracing::debug!(
            api_key_env = %config.api_key_env,
            "no generation API key, steps will use templates"
        );
        return Ok(None);
    };

    let mut provider =
        AnthropicProvider::new(SecretString::from(key), config.model.clone(), config.max_tokens)?;
    if let Some(base_url) = &config.base_url {
        provider = provider.with_base_url(base_url.clone());
    }
    tracing::debug!(model = %config.model, "text generation enabled");
    Ok(Some(BoxTextGenerationProvider::new(provider)))
}
