//! Provider glue: configuration, the OpenAI-compatible [`Backend`]
//! implementation, structured completions and the embedding backfill.
//!
//! [`Backend`]: repolens_types::Backend

mod backend;
mod backfill;
mod config;
mod structured;

pub use backend::{ask, OpenAiCompatBackend};
pub use backfill::{backfill_embeddings, BackfillSummary};
pub use config::{summarize_batch_size, ProviderConfig};
pub use structured::{complete_json, JSON_ATTEMPTS};

use repolens_types::{Backends, Provider, Result, Store};

/// Builds a backend for every provider in `providers` from store config.
pub fn build_backends(store: &dyn Store, providers: &[Provider]) -> Result<Backends> {
    let mut backends = Backends::new();
    for &provider in providers {
        let config = ProviderConfig::from_store(store, provider)?;
        backends.insert(provider, Box::new(OpenAiCompatBackend::new(&config)?));
    }
    Ok(backends)
}
