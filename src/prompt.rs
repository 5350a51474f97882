use std::borrow::Cow;

/// Prompt suffix that switches a generation call into continuation mode.
pub const CONTINUE_SENTINEL: &str = "### CONTINUE";
pub const DEFAULT_CONTINUATION_WORDS: usize = 300;

pub const PAGE_MIN_WORDS: usize = 500;
pub const OUTLINE_MIN_WORDS: usize = 700;
pub const OUTLINE_JSON_MIN_WORDS: usize = 300;
pub const CHAPTER_SUMMARY_MIN_WORDS: usize = 200;

/// Prompt for one page. Page 1 starts cold; later pages see the previous
/// page's summary.
pub fn compose(
    previous_page_summary: &str,
    premise: &str,
    page_number: u32,
    chapter_summary: &str,
) -> String {
    let mut prompt = format!(
        "## DO NOT output any heading. Begin directly with story text.\n\n\
PREMISE:\n{premise}\n\n"
    );
    if page_number > 1 {
        prompt.push_str(&format!(
            "PREVIOUS PAGE SUMMARY:\n{previous_page_summary}\n\n"
        ));
    }
    if !chapter_summary.trim().is_empty() {
        prompt.push_str(&format!("CURRENT CHAPTER SUMMARY:\n{chapter_summary}\n\n"));
    }
    prompt.push_str(
        "Continue the story in the next ~500 words, preserving tone, characters, and continuity. \
Do not restate a page number or any \"Page N Draft\" heading.\n",
    );
    prompt
}

pub fn continuation_request(draft: &str) -> String {
    format!("{}\n\n{CONTINUE_SENTINEL}", draft.trim_end())
}

/// In continuation mode only the trailing `context_words` words of the prior
/// content go to the backend, so repeated continuations do not grow the prompt.
pub fn bound_continuation(prompt: &str, context_words: usize) -> Cow<'_, str> {
    let Some(prior) = prompt.trim_end().strip_suffix(CONTINUE_SENTINEL) else {
        return Cow::Borrowed(prompt);
    };

    let words = prior.split_whitespace().collect::<Vec<_>>();
    let tail = &words[words.len().saturating_sub(context_words)..];
    Cow::Owned(format!(
        "Continue the story below from exactly where it stops. \
Do not repeat it and do not output any heading.\n\n\
STORY SO FAR:\n{}\n",
        tail.join(" ")
    ))
}

pub fn outline_prose(theme: &str, premise: &str) -> String {
    format!(
        "You are a professional story architect. Given the theme and premise below, \
write a full novel outline in natural language. \
Organize your outline with the following sections:\n\
- Characters (names, roles, and personalities)\n\
- Setting (time, place, atmosphere)\n\
- Central Theme (ideological and emotional arc)\n\
- Key Scenes (5-10 major turning points)\n\
- Chapters: title, summary, and structure (intro, conflict, climax for each)\n\
\n\
Start every chapter on its own line as \"Chapter <number>: <title>\".\n\
Write clearly with section headers. Do NOT return any JSON, code blocks, or markdown.\n\
\n\
THEME:\n{theme}\n\nPREMISE:\n{premise}\n"
    )
}

pub fn outline_json(prose_outline: &str) -> String {
    format!(
        "Convert the following novel outline into valid JSON with this format:\n\
{{\n\
  \"characters\": [ {{ \"name\": ..., \"role\": ..., \"traits\": [...] }}, ... ],\n\
  \"setting\": \"...\",\n\
  \"theme\": \"...\",\n\
  \"key_scenes\": [ \"...\", \"...\" ],\n\
  \"chapters\": [\n\
    {{\n\
      \"title\": \"...\",\n\
      \"summary\": \"...\",\n\
      \"structure\": {{ \"intro\": \"...\", \"conflict\": \"...\", \"climax\": \"...\" }}\n\
    }}, ...\n\
  ]\n\
}}\n\
\n\
Be precise and use proper JSON syntax. Do not include commentary or markdown.\n\
\n\
OUTLINE:\n{prose_outline}"
    )
}

pub fn chapter_summary(chapter_text: &str) -> String {
    format!(
        "You are a novel assistant. \
Summarize the chapter below into 1-3 concise paragraphs, capturing:\n\
- key plot points\n\
- character progressions\n\
- emerging themes\n\
\n\
CHAPTER CONTENT:\n{chapter_text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_has_no_previous_summary_section() {
        let prompt = compose("ignored", "A city of glass.", 1, "");
        assert!(prompt.contains("PREMISE:\nA city of glass."));
        assert!(!prompt.contains("PREVIOUS PAGE SUMMARY"));
        assert!(!prompt.contains("CURRENT CHAPTER SUMMARY"));
    }

    #[test]
    fn later_pages_carry_previous_and_chapter_summaries() {
        let prompt = compose("Ada ran.", "A city of glass.", 2, "The fall of the city.");
        assert!(prompt.contains("PREVIOUS PAGE SUMMARY:\nAda ran."));
        assert!(prompt.contains("CURRENT CHAPTER SUMMARY:\nThe fall of the city."));
        assert!(prompt.ends_with("any \"Page N Draft\" heading.\n"));
    }

    #[test]
    fn plain_prompts_pass_through_unbounded() {
        let prompt = compose("", "p", 1, "");
        assert!(matches!(bound_continuation(&prompt, 3), Cow::Borrowed(_)));
    }

    #[test]
    fn continuation_keeps_only_trailing_words() {
        let draft = (1..=10).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let request = continuation_request(&draft);
        let bounded = bound_continuation(&request, 3);
        assert!(bounded.contains("STORY SO FAR:\nw8 w9 w10\n"));
        assert!(!bounded.contains("w7"));
        assert!(!bounded.contains(CONTINUE_SENTINEL));
    }
}
