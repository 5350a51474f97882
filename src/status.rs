use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::context::chapter_for_page;
use crate::formats::{ChapterStatus, ProjectStatus, Verdict};
use crate::store::ProjectStore;

static PAGE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/page_(\d+)_(approved|rejected)\.txt$").expect("valid marker regex")
});
static CHAPTER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/chapter_(\d+)_(approved|rejected)\.txt$").expect("valid marker regex")
});

/// Per-chapter approval counts, derived from the marker files alone.
pub fn project_status(
    store: &ProjectStore,
    pages_per_chapter: u32,
) -> anyhow::Result<ProjectStatus> {
    let meta = store.load_metadata()?;

    let mut chapters: BTreeMap<u32, ChapterStatus> = BTreeMap::new();
    for key in store.chapter_keys()? {
        if let Some((page, verdict)) = parse_marker(&PAGE_MARKER, &key) {
            let status = chapter_entry(&mut chapters, chapter_for_page(page, pages_per_chapter));
            match verdict {
                Verdict::Approved => status.approved_pages += 1,
                Verdict::Rejected => status.rejected_pages += 1,
            }
        } else if let Some((chapter, verdict)) = parse_marker(&CHAPTER_MARKER, &key) {
            chapter_entry(&mut chapters, chapter).verdict = Some(verdict);
        }
    }

    Ok(ProjectStatus {
        title: meta.title,
        outline_approved: meta.outline_approved,
        primary_model: meta.models.primary,
        pages_per_chapter,
        chapters: chapters.into_values().collect(),
    })
}

fn chapter_entry(chapters: &mut BTreeMap<u32, ChapterStatus>, chapter: u32) -> &mut ChapterStatus {
    chapters.entry(chapter).or_insert_with(|| ChapterStatus {
        chapter,
        approved_pages: 0,
        rejected_pages: 0,
        verdict: None,
    })
}

fn parse_marker(re: &Regex, key: &str) -> Option<(u32, Verdict)> {
    let caps = re.captures(key)?;
    let number = caps[1].parse().ok()?;
    let verdict = match &caps[2] {
        "approved" => Verdict::Approved,
        _ => Verdict::Rejected,
    };
    Some((number, verdict))
}
