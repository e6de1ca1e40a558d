use repolens_types::{Backend, Result, Store};

// ── BackfillSummary ────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillSummary {
    pub embedded: usize,
    pub failed: usize,
}

// ── backfill_embeddings ────────────────────────────────────────────────────

/// Embeds every stored summary of `repo` that has no vector yet for the
/// backend's model: the repository, its folders, files and commits.
///
/// A failed embedding call is logged and counted, and the pass continues.
/// Returns Err only if a store operation fails.
pub fn backfill_embeddings(
    store: &dyn Store,
    backend: &dyn Backend,
    repo: &str,
) -> Result<BackfillSummary> {
    let model = backend.model();
    let pending = store.pending_embeddings(repo, model)?;
    tracing::info!(repo, model, pending = pending.len(), "backfilling embeddings");

    let mut summary = BackfillSummary::default();
    for item in &pending {
        match backend.embed(&item.summary) {
            Ok(embedding) => {
                store.store_embedding(repo, model, &item.entity, &embedding)?;
                tracing::debug!(repo, entity = %item.entity, "embedded");
                summary.embedded += 1;
            }
            Err(e) => {
                tracing::warn!(repo, entity = %item.entity, error = %e, "failed to embed");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

// ── Tests ──────────────────────────────────────────────────────────────────
