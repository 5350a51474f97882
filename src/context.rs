//! Context carried from one generation call to the next: page summaries,
//! chapter summaries and the text cleanup applied before anything is stored.

use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Blocked;
use crate::formats::OutlineView;
use crate::store::ProjectStore;

pub const SUMMARY_MIN_WORDS: usize = 100;
pub const SUMMARY_MAX_WORDS: usize = 250;
pub const DEFAULT_PAGES_PER_CHAPTER: u32 = 10;

static PAGE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\APage\s+\d+\s+Draft[:\s-]*").expect("valid page heading regex")
});

static ANY_CHAPTER_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t#*]*chapter[ \t]*\d+").expect("valid chapter heading regex")
});

/// Removes a leading "Page N Draft" heading the model restated, along with
/// any whitespace before it.
pub fn strip_heading(text: &str) -> &str {
    let text = text.trim_start();
    match PAGE_HEADING.find(text) {
        Some(m) => text[m.end()..].trim_start(),
        None => text,
    }
}

pub fn sanitize(text: &str) -> String {
    text.replace('\u{2014}', "-")
}

/// Truncation summary: half the draft, never below 100 or above 250 words.
pub fn compress(draft: &str) -> String {
    let words = strip_heading(draft).split_whitespace().collect::<Vec<_>>();
    let take = (words.len() / 2).clamp(SUMMARY_MIN_WORDS, SUMMARY_MAX_WORDS);
    words.into_iter().take(take).collect::<Vec<_>>().join(" ")
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn chapter_for_page(page: u32, pages_per_chapter: u32) -> u32 {
    (page.saturating_sub(1)) / pages_per_chapter.max(1) + 1
}

/// Pages belonging to `chapter`. Chapters whose pages would not fit in a
/// `u32` are blocked.
pub fn page_range(chapter: u32, pages_per_chapter: u32) -> anyhow::Result<RangeInclusive<u32>> {
    let per = pages_per_chapter.max(1);
    let bounds = (chapter.max(1) - 1)
        .checked_mul(per)
        .and_then(|before| before.checked_add(1))
        .and_then(|first| Some((first, first.checked_add(per - 1)?)));
    match bounds {
        Some((first, last)) => Ok(first..=last),
        None => Err(Blocked::ChapterOutOfRange(chapter).into()),
    }
}

/// Summary of page `page - 1`. Page 1 has no predecessor.
pub fn previous_page_summary(store: &ProjectStore, page: u32) -> anyhow::Result<Option<String>> {
    if page <= 1 {
        return Ok(None);
    }
    store.page_summary(page - 1)
}

/// Looks the chapter up in the prose outline first, then in the structured
/// outline. Unreadable or malformed outline data counts as "not found".
pub fn chapter_summary(store: &ProjectStore, chapter: u32) -> Option<String> {
    if let Some(raw) = readable(store.outline_raw(), "outline_raw.txt")
        && let Some(section) = chapter_section(&raw, chapter)
    {
        return Some(section);
    }

    let json = readable(store.outline_json(), "outline.json")?;
    chapter_summary_from_json(&json, chapter)
}

fn readable(read: anyhow::Result<Option<String>>, file: &str) -> Option<String> {
    match read {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(
                error = %format!("{err:#}"),
                file = file,
                "outline unreadable; ignoring"
            );
            None
        }
    }
}

/// Text following a `Chapter <n>` line, up to the next chapter heading.
/// When the heading line is all there is, its remainder is the section.
pub fn chapter_section(outline: &str, chapter: u32) -> Option<String> {
    let heading = Regex::new(&format!(r"(?im)^[ \t#*]*chapter[ \t]*{chapter}\b[^\n]*")).ok()?;
    let m = heading.find(outline)?;

    let rest = &outline[m.end()..];
    let body = match ANY_CHAPTER_HEADING.find(rest) {
        Some(next) => &rest[..next.start()],
        None => rest,
    };
    let body = body.trim();
    if !body.is_empty() {
        return Some(body.to_owned());
    }

    let title = m.as_str().trim_start_matches([' ', '\t', '#', '*']);
    let tail = title
        .get("chapter".len()..)
        .unwrap_or_default()
        .trim_start()
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .trim_start_matches([':', '-', '.', '*', ' ', '\t'])
        .trim();
    if tail.is_empty() {
        None
    } else {
        Some(tail.to_owned())
    }
}

pub fn chapter_summary_from_json(json: &str, chapter: u32) -> Option<String> {
    let outline: OutlineView = match serde_json::from_str(json) {
        Ok(outline) => outline,
        Err(err) => {
            tracing::debug!(error = %err, "outline.json is not usable for chapter lookup");
            return None;
        }
    };
    let index = usize::try_from(chapter.checked_sub(1)?).ok()?;
    let summary = outline.chapters.get(index)?.summary.trim();
    if summary.is_empty() {
        None
    } else {
        Some(summary.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context as _;

    use super::*;
    use crate::store::FsStorage;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn compress_clamps_to_summary_bounds() {
        let cases = [
            (50, 50),
            (100, 100),
            (199, 100),
            (200, 100),
            (300, 150),
            (500, 250),
            (900, 250),
        ];
        for (input, expected) in cases {
            let summary = compress(&words(input));
            assert_eq!(word_count(&summary), expected, "input={input}");
        }
    }

    #[test]
    fn compress_keeps_leading_words_and_ignores_heading() {
        let draft = format!("Page 7 Draft: {}", words(400));
        let summary = compress(&draft);
        assert!(summary.starts_with("w0 w1 w2"));
        assert_eq!(word_count(&summary), 200);
    }

    #[test]
    fn strip_heading_is_case_insensitive_and_leading_only() {
        assert_eq!(strip_heading("Page 3 Draft: The city burned."), "The city burned.");
        assert_eq!(strip_heading("page 12 draft - Rain."), "Rain.");
        assert_eq!(strip_heading("\n  Page 1 Draft:\nThe city burned."), "The city burned.");
        assert_eq!(
            strip_heading("She wrote Page 3 Draft: on the wall."),
            "She wrote Page 3 Draft: on the wall."
        );
    }

    #[test]
    fn sanitize_only_touches_em_dashes() {
        assert_eq!(sanitize("a\u{2014}b"), "a-b");
        assert_eq!(sanitize("a\u{2013}b, c; d!"), "a\u{2013}b, c; d!");
    }

    #[test]
    fn pages_bucket_into_chapters() -> anyhow::Result<()> {
        for page in 1..=10 {
            assert_eq!(chapter_for_page(page, 10), 1);
        }
        for page in 11..=20 {
            assert_eq!(chapter_for_page(page, 10), 2);
        }
        assert_eq!(page_range(2, 10)?, 11..=20);
        assert_eq!(page_range(1, 3)?, 1..=3);
        Ok(())
    }

    #[test]
    fn chapters_past_the_last_page_number_are_blocked() -> anyhow::Result<()> {
        let err = page_range(u32::MAX, 10).err().context("expected an error")?;
        assert!(matches!(
            err.downcast_ref::<Blocked>(),
            Some(Blocked::ChapterOutOfRange(u32::MAX))
        ));
        assert!(page_range(429_496_730, 10).is_err());
        assert_eq!(page_range(429_496_729, 10)?, 4_294_967_281..=4_294_967_290);
        assert_eq!(page_range(u32::MAX, 1)?, u32::MAX..=u32::MAX);
        Ok(())
    }

    #[test]
    fn chapter_section_stops_at_next_heading() {
        let outline = "Characters: Ada\n\n\
Chapter 1: Ash\nThe city burns.\nAda flees.\n\n\
Chapter 12: Late\nNot this one.\n\n\
chapter 2 - Water\nThe flood comes.\n";

        assert_eq!(
            chapter_section(outline, 1).as_deref(),
            Some("The city burns.\nAda flees.")
        );
        assert_eq!(chapter_section(outline, 2).as_deref(), Some("The flood comes."));
        assert_eq!(chapter_section(outline, 12).as_deref(), Some("Not this one."));
        assert_eq!(chapter_section(outline, 3), None);
    }

    #[test]
    fn chapter_section_falls_back_to_heading_line() {
        let outline = "Chapter 1: Ada leaves the burning city.\nChapter 2: She reaches the coast.";
        assert_eq!(
            chapter_section(outline, 1).as_deref(),
            Some("Ada leaves the burning city.")
        );
    }

    #[test]
    fn chapter_summary_from_json_indexes_by_position() {
        let json = r#"{"chapters":[
            {"title":"A","summary":"first"},
            {"title":"B","summary":"second","extra":1}
        ]}"#;
        assert_eq!(chapter_summary_from_json(json, 2).as_deref(), Some("second"));
        assert_eq!(chapter_summary_from_json(json, 3), None);
        assert_eq!(chapter_summary_from_json(json, 0), None);
        assert_eq!(chapter_summary_from_json("{not json", 1), None);
    }

    #[test]
    fn chapter_summary_prefers_prose_outline() -> anyhow::Result<()> {
        let store = ProjectStore::in_memory("demo");
        store.write_outline_json(&serde_json::json!({
            "chapters": [{"summary": "from json 1"}, {"summary": "from json 2"}]
        }))?;
        assert_eq!(chapter_summary(&store, 2).as_deref(), Some("from json 2"));

        store.write_outline_raw("Chapter 2\nfrom prose\n")?;
        assert_eq!(chapter_summary(&store, 2).as_deref(), Some("from prose"));
        assert_eq!(chapter_summary(&store, 1).as_deref(), Some("from json 1"));
        assert_eq!(chapter_summary(&store, 9), None);
        Ok(())
    }

    #[test]
    fn unreadable_prose_outline_falls_back_to_json() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        std::fs::create_dir_all(temp.path().join("chapters"))?;
        std::fs::write(
            temp.path().join("chapters/outline_raw.txt"),
            b"Chapter 1\n\xff\xfe bad",
        )?;
        std::fs::write(
            temp.path().join("chapters/outline.json"),
            r#"{"chapters":[{"title":"A","summary":"json one"}]}"#,
        )?;
        let store = ProjectStore::new("novel", Box::new(FsStorage::new(temp.path())));

        assert_eq!(chapter_summary(&store, 1).as_deref(), Some("json one"));
        assert_eq!(chapter_summary(&store, 2), None);
        Ok(())
    }

    #[test]
    fn previous_summary_is_absent_for_first_page() -> anyhow::Result<()> {
        let store = ProjectStore::in_memory("demo");
        store.write_page_summary(1, "one")?;
        assert_eq!(previous_page_summary(&store, 1)?, None);
        assert_eq!(previous_page_summary(&store, 2)?.as_deref(), Some("one"));
        assert_eq!(previous_page_summary(&store, 3)?, None);
        Ok(())
    }
}
