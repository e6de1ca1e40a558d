use async_openai::config::OpenAIConfig;
use async_openai::Client;
use repolens_types::{Backend, RepolensError, Result};

use crate::config::ProviderConfig;

/// [`Backend`] over any OpenAI-compatible HTTP API.
///
/// Completion and embedding may live behind different base URLs (ubicloud
/// serves each model from its own host), so each gets its own client. The
/// async client is driven from a private current-thread runtime.
pub struct OpenAiCompatBackend {
    completion: Client<OpenAIConfig>,
    embedding: Client<OpenAIConfig>,
    completion_model: String,
    embedding_model: String,
    context_window: usize,
    runtime: tokio::runtime::Runtime,
}

impl OpenAiCompatBackend {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            tracing::warn!(
                provider = %config.provider,
                "{} is not set, requests will be unauthenticated",
                ProviderConfig::api_key_var(config.provider)
            );
        }
        let client = |base: &str| {
            Client::with_config(
                OpenAIConfig::new()
                    .with_api_base(base)
                    .with_api_key(&config.api_key),
            )
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            completion: client(&config.completion_url),
            embedding: client(&config.embedding_url),
            completion_model: config.completion_model.clone(),
            embedding_model: config.embedding_model.clone(),
            context_window: config.context_window,
            runtime,
        })
    }

    async fn embed_async(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        use async_openai::types::embeddings::CreateEmbeddingRequestArgs;
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(text)
            .build()?;
        let response = self.embedding.embeddings().create(request).await?;
        let embedding = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))?
            .embedding;
        Ok(embedding)
    }

    async fn complete_async(&self, prompt: &str, json_object: bool) -> anyhow::Result<Option<String>> {
        use async_openai::types::chat::{
            ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
        };
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()?;
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.completion_model).messages(vec![message.into()]);
        if json_object {
            args.response_format(ResponseFormat::JsonObject);
        }
        let request = args.build()?;
        let response = self.completion.chat().create(request).await?;
        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content))
    }

    fn complete_with(&self, prompt: &str, json_object: bool) -> Result<String> {
        let content = self
            .runtime
            .block_on(self.complete_async(prompt, json_object))
            .map_err(|e| self.backend_error(&self.completion_model, e))?;
        match content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(RepolensError::EmptyCompletion {
                model: self.completion_model.clone(),
            }),
        }
    }

    fn backend_error(&self, model: &str, err: anyhow::Error) -> RepolensError {
        RepolensError::Backend {
            model: model.to_string(),
            message: format!("{err:#}"),
        }
    }
}

impl Backend for OpenAiCompatBackend {
    fn model(&self) -> &str {
        &self.completion_model
    }

    fn context_window(&self) -> usize {
        self.context_window
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.runtime
            .block_on(self.embed_async(text))
            .map_err(|e| self.backend_error(&self.embedding_model, e))
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        self.complete_with(prompt, false)
    }

    fn complete_json_object(&self, prompt: &str) -> Result<String> {
        self.complete_with(prompt, true)
    }
}

/// Sends `prompt` and returns the trimmed completion.
pub fn ask(backend: &dyn Backend, prompt: &str) -> Result<String> {
    let text = backend.complete(prompt)?;
    let text = text.trim();
    if text.is_empty() {
        return Err(RepolensError::EmptyCompletion {
            model: backend.model().to_string(),
        });
    }
    Ok(text.to_string())
}

// ── Tests ──────────────────────────────────────────────────────────────────
