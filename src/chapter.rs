use anyhow::Context as _;

use crate::context::{chapter_summary, page_range, previous_page_summary};
use crate::error::Blocked;
use crate::formats::{Marker, Verdict};
use crate::generate::Connector;
use crate::page::{self, PageRun, run_model};
use crate::project::{require_outline_approved, resolve_model};
use crate::prompt::{self, CHAPTER_SUMMARY_MIN_WORDS};
use crate::store::ProjectStore;

/// Writes `total_pages` pages of a chapter with one model, in order. Each
/// page reads the summary its predecessor just wrote.
pub fn write(
    store: &ProjectStore,
    connector: &dyn Connector,
    chapter: u32,
    total_pages: u32,
    model_override: Option<&str>,
    pages_per_chapter: u32,
) -> anyhow::Result<Vec<PageRun>> {
    let meta = store.load_metadata()?;
    require_outline_approved(&meta)?;
    let entry = resolve_model(&meta, model_override)?;

    if total_pages > pages_per_chapter {
        tracing::warn!(
            chapter = chapter,
            total_pages = total_pages,
            pages_per_chapter = pages_per_chapter,
            "requested more pages than a chapter holds; capping"
        );
    }
    let pages = page_range(chapter, pages_per_chapter)?
        .take(total_pages.min(pages_per_chapter) as usize)
        .collect::<Vec<_>>();
    let chapter_summary = chapter_summary(store, chapter).unwrap_or_default();

    tracing::info!(chapter = chapter, model = %entry.name, pages = pages.len(), "writing chapter");
    let mut runs = Vec::with_capacity(pages.len());
    for page in pages {
        let previous = previous_page_summary(store, page)?.unwrap_or_default();
        let prompt = prompt::compose(&previous, &meta.premise, page, &chapter_summary);
        let run = run_model(store, connector, &entry, &prompt, chapter, page, false)?;
        runs.push(PageRun {
            page,
            chapter,
            runs: vec![run],
        });
    }

    let saved = runs.iter().filter(|r| r.runs.iter().any(|m| m.saved())).count();
    tracing::info!(chapter = chapter, saved = saved, total = runs.len(), "chapter written");
    Ok(runs)
}

/// Runs the page pipeline over every page of the chapter, keeping test-mode
/// fan-out available.
pub fn generate(
    store: &ProjectStore,
    connector: &dyn Connector,
    chapter: u32,
    model_override: Option<&str>,
    test_all_models: bool,
    pages_per_chapter: u32,
) -> anyhow::Result<Vec<PageRun>> {
    require_outline_approved(&store.load_metadata()?)?;
    page_range(chapter, pages_per_chapter)?
        .map(|page| {
            page::generate(
                store,
                connector,
                page,
                model_override,
                test_all_models,
                pages_per_chapter,
            )
        })
        .collect()
}

/// Auto-approves every drafted page, marks the chapter approved and
/// concatenates it.
pub fn approve(
    store: &ProjectStore,
    chapter: u32,
    pages_per_chapter: u32,
) -> anyhow::Result<ConcatReport> {
    store.load_metadata()?;
    for page in page_range(chapter, pages_per_chapter)? {
        if store.has_page_draft(chapter, page)? {
            store.mark_page(chapter, page, &Marker::new(Verdict::Approved).automatic())?;
            tracing::info!(page = page, "page auto-approved");
        }
    }

    store.mark_chapter(chapter, &Marker::new(Verdict::Approved))?;
    tracing::info!(chapter = chapter, "chapter approved");
    concat(store, chapter, pages_per_chapter)
}

pub fn reject(store: &ProjectStore, chapter: u32, reason: &str) -> anyhow::Result<()> {
    store.load_metadata()?;
    store.mark_chapter(chapter, &Marker::new(Verdict::Rejected).with_reason(reason))?;
    tracing::info!(chapter = chapter, reason = reason, "chapter rejected");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Missing,
    NotApproved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatReport {
    pub chapter: u32,
    pub path: String,
    pub included: Vec<u32>,
    pub skipped: Vec<(u32, SkipReason)>,
}

/// Joins the drafted and approved pages of a chapter, in order. Anything
/// else is skipped, not an error.
pub fn concat(
    store: &ProjectStore,
    chapter: u32,
    pages_per_chapter: u32,
) -> anyhow::Result<ConcatReport> {
    store.load_metadata()?;

    let mut parts = Vec::new();
    let mut included = Vec::new();
    let mut skipped = Vec::new();
    for page in page_range(chapter, pages_per_chapter)? {
        let Some(text) = store.page_draft(chapter, page, None)? else {
            tracing::info!(page = page, "page does not exist; skipping");
            skipped.push((page, SkipReason::Missing));
            continue;
        };
        if !store.has_page_marker(chapter, page, Verdict::Approved)? {
            tracing::warn!(page = page, "page not approved; skipping");
            skipped.push((page, SkipReason::NotApproved));
            continue;
        }
        parts.push(text.trim().to_owned());
        included.push(page);
    }

    let path = store
        .write_chapter_final(chapter, parts.join("\n\n").trim())
        .with_context(|| format!("save chapter {chapter} final text"))?;
    tracing::info!(chapter = chapter, path = %path, pages = included.len(), "chapter concatenated");

    Ok(ConcatReport {
        chapter,
        path,
        included,
        skipped,
    })
}

/// Asks the model for a 1-3 paragraph summary of the finished chapter.
/// Returns `None` when generation failed; the failure is logged.
pub fn summarize(
    store: &ProjectStore,
    connector: &dyn Connector,
    chapter: u32,
    model_override: Option<&str>,
) -> anyhow::Result<Option<String>> {
    let meta = store.load_metadata()?;
    let entry = resolve_model(&meta, model_override)?;
    let final_text = store
        .chapter_final(chapter)?
        .ok_or(Blocked::ChapterNotFinalized(chapter))?;

    let generated = connector.connect(&entry).and_then(|generator| {
        generator.generate(&prompt::chapter_summary(&final_text), CHAPTER_SUMMARY_MIN_WORDS)
    });
    let summary = match generated {
        Ok(generation) => generation.text.trim().to_owned(),
        Err(err) => {
            tracing::warn!(
                chapter = chapter,
                model = %entry.name,
                error = %format!("{err:#}"),
                "chapter summary failed"
            );
            return Ok(None);
        }
    };

    let path = store.write_chapter_summary(chapter, &summary)?;
    tracing::info!(chapter = chapter, path = %path, "chapter summary saved");
    Ok(Some(summary))
}
