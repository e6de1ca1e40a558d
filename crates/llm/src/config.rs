use repolens_types::{Provider, RepolensError, Result, Store};

/// Connection and model settings for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub completion_model: String,
    pub embedding_model: String,
    pub completion_url: String,
    pub embedding_url: String,
    /// Prompt budget in characters.
    pub context_window: usize,
    pub api_key: String,
}

impl ProviderConfig {
    /// Built-in defaults, without an API key.
    pub fn defaults(provider: Provider) -> Self {
        match provider {
            Provider::OpenAi => Self {
                provider,
                completion_model: "gpt-4o-mini".into(),
                embedding_model: "text-embedding-3-small".into(),
                completion_url: "https://api.openai.com/v1".into(),
                embedding_url: "https://api.openai.com/v1".into(),
                context_window: 128_000,
                api_key: String::new(),
            },
            Provider::Ubicloud => Self {
                provider,
                completion_model: "llama-3-2-3b-it".into(),
                embedding_model: "e5-mistral-7b-it".into(),
                completion_url: "https://llama-3-2-3b-it.ai.ubicloud.com/v1".into(),
                embedding_url: "https://e5-mistral-7b-it.ai.ubicloud.com/v1".into(),
                context_window: 90_000,
                api_key: String::new(),
            },
        }
    }

    /// Environment variable holding the provider's API key.
    pub fn api_key_var(provider: Provider) -> &'static str {
        match provider {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Ubicloud => "UBICLOUD_API_KEY",
        }
    }

    /// Reads `provider.<name>.*` overrides from store config on top of the
    /// defaults. The API key comes from the environment only.
    pub fn from_store(store: &dyn Store, provider: Provider) -> Result<Self> {
        let mut config = Self::defaults(provider);
        let key = |field: &str| format!("provider.{provider}.{field}");

        if let Some(v) = store.get_config(&key("completion_model"))? {
            config.completion_model = v;
        }
        if let Some(v) = store.get_config(&key("embedding_model"))? {
            config.embedding_model = v;
        }
        if let Some(v) = store.get_config(&key("completion_url"))? {
            config.completion_url = v;
        }
        if let Some(v) = store.get_config(&key("embedding_url"))? {
            config.embedding_url = v;
        }
        if let Some(v) = store.get_config(&key("context_window"))? {
            config.context_window = parse_positive(&key("context_window"), &v)?;
        }

        if let Ok(api_key) = std::env::var(Self::api_key_var(provider)) {
            config.api_key = api_key;
        }

        Ok(config)
    }
}

/// Optional override of the summarizer's combine threshold.
pub fn summarize_batch_size(store: &dyn Store) -> Result<Option<usize>> {
    store
        .get_config("summarize.batch_size")?
        .map(|v| parse_positive("summarize.batch_size", &v))
        .transpose()
}

fn parse_positive(key: &str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(RepolensError::Config(format!(
            "{key} must be a positive integer, got '{value}'"
        ))),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
