use anyhow::{bail, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Key value shipped in `.env` templates; treated the same as a missing key.
const PLACEHOLDER_KEY: &str = "your_api_key_here";

/// What to do when the suggestion service call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Keep processing with a deterministic placeholder suggestion.
    #[default]
    Degrade,
    /// Propagate the provider error and abort the run.
    FailFast,
}

/// Configuration of the suggestion service, resolved once before any
/// document is opened.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub fallback: FallbackPolicy,
}

impl ProviderConfig {
    /// Resolve from `.env` / process environment only.
    pub fn from_env() -> Result<Self> {
        Self::from_overrides(None, None, None)
    }

    /// Resolve with explicit values taking precedence over the environment.
    /// Fails fast on a missing, empty, or placeholder API key.
    pub fn from_overrides(
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_key = api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();
        if api_key.trim().is_empty() || api_key == PLACEHOLDER_KEY {
            bail!("请在 .env 文件中设置有效的 OPENAI_API_KEY 环境变量");
        }

        let base_url = base_url
            .or_else(|| std::env::var("OPENAI_API_BASE").ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = model
            .or_else(|| std::env::var("OPENAI_MODEL").ok())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(ProviderConfig {
            api_key,
            base_url,
            model,
            fallback: FallbackPolicy::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_key_is_rejected() {
        let result = ProviderConfig::from_overrides(
            Some(PLACEHOLDER_KEY.to_string()),
            Some(DEFAULT_BASE_URL.to_string()),
            Some(DEFAULT_MODEL.to_string()),
        );
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn empty_key_is_rejected() {
        let result = ProviderConfig::from_overrides(
            Some("  ".to_string()),
            Some(DEFAULT_BASE_URL.to_string()),
            Some(DEFAULT_MODEL.to_string()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn overrides_win_and_fallback_defaults_to_degrade() {
        let config = ProviderConfig::from_overrides(
            Some("sk-test".to_string()),
            Some("https://proxy.example.com/v1".to_string()),
            Some("gpt-4o".to_string()),
        )
        .unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.base_url, "https://proxy.example.com/v1");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.fallback, FallbackPolicy::Degrade);
    }
}
