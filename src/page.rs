//! Single-page generation: compose → generate → sanitize → persist →
//! summarize.

use std::time::Duration;

use anyhow::Context as _;

use crate::context::{
    chapter_for_page, chapter_summary, compress, previous_page_summary, sanitize, strip_heading,
};
use crate::error::Blocked;
use crate::formats::{Marker, ModelEntry, Verdict};
use crate::generate::Connector;
use crate::project::{require_outline_approved, resolve_model};
use crate::prompt::{self, PAGE_MIN_WORDS};
use crate::store::ProjectStore;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutcome {
    Saved {
        draft: String,
        words: usize,
        elapsed: Duration,
    },
    Empty,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRun {
    pub model: String,
    pub outcome: ModelOutcome,
}

impl ModelRun {
    pub fn saved(&self) -> bool {
        matches!(self.outcome, ModelOutcome::Saved { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageRun {
    pub page: u32,
    pub chapter: u32,
    pub runs: Vec<ModelRun>,
}

/// Generates one page. In test mode every registered model writes its own
/// suffixed draft from the same prompt, one after another.
pub fn generate(
    store: &ProjectStore,
    connector: &dyn Connector,
    page: u32,
    model_override: Option<&str>,
    test_all_models: bool,
    pages_per_chapter: u32,
) -> anyhow::Result<PageRun> {
    let meta = store.load_metadata()?;
    require_outline_approved(&meta)?;

    let models = if test_all_models {
        meta.models.available.clone()
    } else {
        vec![resolve_model(&meta, model_override)?]
    };

    let chapter = chapter_for_page(page, pages_per_chapter);
    let previous = previous_page_summary(store, page)?.unwrap_or_default();
    let chapter_summary = chapter_summary(store, chapter).unwrap_or_default();
    let prompt = prompt::compose(&previous, &meta.premise, page, &chapter_summary);

    let runs = models
        .iter()
        .map(|entry| {
            run_model(
                store,
                connector,
                entry,
                &prompt,
                chapter,
                page,
                test_all_models,
            )
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(PageRun {
        page,
        chapter,
        runs,
    })
}

/// Generates and persists one model's draft. Backend failures and empty
/// output are reported, not raised; storage failures are raised.
pub(crate) fn run_model(
    store: &ProjectStore,
    connector: &dyn Connector,
    entry: &ModelEntry,
    prompt: &str,
    chapter: u32,
    page: u32,
    suffix_with_model: bool,
) -> anyhow::Result<ModelRun> {
    let generated = connector
        .connect(entry)
        .and_then(|generator| generator.generate(prompt, PAGE_MIN_WORDS));
    let generation = match generated {
        Ok(generation) => generation,
        Err(err) => {
            let error = format!("{err:#}");
            tracing::warn!(
                page = page,
                model = %entry.name,
                error = %error,
                "page generation failed; skipping"
            );
            return Ok(ModelRun {
                model: entry.name.clone(),
                outcome: ModelOutcome::Failed(error),
            });
        }
    };

    let sanitized = sanitize(&generation.text);
    let text = strip_heading(&sanitized).trim();
    if text.is_empty() {
        tracing::warn!(page = page, model = %entry.name, "empty result; skipping");
        return Ok(ModelRun {
            model: entry.name.clone(),
            outcome: ModelOutcome::Empty,
        });
    }

    let suffix = suffix_with_model.then_some(entry.name.as_str());
    let draft = store
        .write_page_draft(chapter, page, suffix, text)
        .with_context(|| format!("save page {page} draft"))?;
    store
        .write_page_summary(page, &compress(text))
        .with_context(|| format!("save page {page} summary"))?;

    tracing::info!(
        page = page,
        model = %entry.name,
        draft = %draft,
        words = generation.word_count,
        elapsed_ms = generation.elapsed_ms(),
        "page saved"
    );
    Ok(ModelRun {
        model: entry.name.clone(),
        outcome: ModelOutcome::Saved {
            draft,
            words: generation.word_count,
            elapsed: generation.elapsed,
        },
    })
}

/// Extends an existing draft. Only the tail of the draft is sent back to the
/// model; the continuation is appended and the page summary recomputed.
pub fn continue_draft(
    store: &ProjectStore,
    connector: &dyn Connector,
    page: u32,
    model_override: Option<&str>,
    pages_per_chapter: u32,
) -> anyhow::Result<ModelRun> {
    let meta = store.load_metadata()?;
    require_outline_approved(&meta)?;
    let entry = resolve_model(&meta, model_override)?;

    let chapter = chapter_for_page(page, pages_per_chapter);
    let draft = store
        .page_draft(chapter, page, None)?
        .ok_or(Blocked::PageNotDrafted(page))?;

    let request = prompt::continuation_request(&draft);
    let generated = connector
        .connect(&entry)
        .and_then(|generator| generator.generate(&request, PAGE_MIN_WORDS));
    let generation = match generated {
        Ok(generation) => generation,
        Err(err) => {
            let error = format!("{err:#}");
            tracing::warn!(
                page = page,
                model = %entry.name,
                error = %error,
                "continuation failed; skipping"
            );
            return Ok(ModelRun {
                model: entry.name,
                outcome: ModelOutcome::Failed(error),
            });
        }
    };

    let sanitized = sanitize(&generation.text);
    let addition = strip_heading(&sanitized).trim();
    if addition.is_empty() {
        tracing::warn!(page = page, model = %entry.name, "empty continuation; skipping");
        return Ok(ModelRun {
            model: entry.name,
            outcome: ModelOutcome::Empty,
        });
    }

    let extended = format!("{}\n\n{addition}", draft.trim_end());
    let key = store.write_page_draft(chapter, page, None, &extended)?;
    store.write_page_summary(page, &compress(&extended))?;

    tracing::info!(
        page = page,
        model = %entry.name,
        added_words = generation.word_count,
        "page extended"
    );
    Ok(ModelRun {
        model: entry.name,
        outcome: ModelOutcome::Saved {
            draft: key,
            words: generation.word_count,
            elapsed: generation.elapsed,
        },
    })
}

pub fn approve(store: &ProjectStore, page: u32, pages_per_chapter: u32) -> anyhow::Result<()> {
    let chapter = chapter_for_page(page, pages_per_chapter);
    store.load_metadata()?;
    if !store.has_page_draft(chapter, page)? {
        return Err(Blocked::PageNotDrafted(page).into());
    }
    store.mark_page(chapter, page, &Marker::new(Verdict::Approved))?;
    tracing::info!(page = page, chapter = chapter, "page approved");
    Ok(())
}

pub fn reject(
    store: &ProjectStore,
    page: u32,
    reason: &str,
    pages_per_chapter: u32,
) -> anyhow::Result<()> {
    let chapter = chapter_for_page(page, pages_per_chapter);
    store.load_metadata()?;
    store.mark_page(
        chapter,
        page,
        &Marker::new(Verdict::Rejected).with_reason(reason),
    )?;
    tracing::info!(page = page, chapter = chapter, reason = reason, "page rejected");
    Ok(())
}
