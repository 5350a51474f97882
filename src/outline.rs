use anyhow::Context as _;

use crate::generate::Connector;
use crate::project::resolve_model;
use crate::prompt::{self, OUTLINE_JSON_MIN_WORDS, OUTLINE_MIN_WORDS};
use crate::store::{OUTLINE_JSON, OUTLINE_RAW, ProjectStore};

#[derive(Debug, Clone)]
pub struct OutlineRun {
    pub model: String,
    pub words: usize,
    /// Whether `outline.json` was written.
    pub structured: bool,
}

/// Generates the prose outline, then asks the same model to restate it as
/// JSON. A failed JSON step leaves the prose outline as the only outline.
pub fn generate(
    store: &ProjectStore,
    connector: &dyn Connector,
    model_override: Option<&str>,
) -> anyhow::Result<OutlineRun> {
    let meta = store.load_metadata()?;
    let entry = resolve_model(&meta, model_override)?;
    let generator = connector
        .connect(&entry)
        .with_context(|| format!("connect model: {}", entry.name))?;

    tracing::info!(project = store.name(), model = %entry.name, "outline: prose");
    let prose = generator
        .generate(
            &prompt::outline_prose(&meta.theme, &meta.premise),
            OUTLINE_MIN_WORDS,
        )
        .context("generate prose outline")?;
    let prose_text = prose.text.trim();
    if prose_text.is_empty() {
        anyhow::bail!("outline model returned empty text");
    }
    store.write_outline_raw(prose_text)?;
    tracing::info!(
        path = OUTLINE_RAW,
        words = prose.word_count,
        elapsed_ms = prose.elapsed_ms(),
        "outline: saved prose"
    );

    tracing::info!(model = %entry.name, "outline: structured");
    let structured = generator
        .generate(&prompt::outline_json(prose_text), OUTLINE_JSON_MIN_WORDS)
        .and_then(|g| parse_outline_json(&g.text));
    let structured = match structured {
        Ok(outline) => {
            store.write_outline_json(&outline)?;
            tracing::info!(path = OUTLINE_JSON, "outline: saved structured");
            true
        }
        Err(err) => {
            tracing::warn!(
                error = %format!("{err:#}"),
                "outline: structured conversion failed; keeping prose outline only"
            );
            false
        }
    };

    Ok(OutlineRun {
        model: entry.name,
        words: prose.word_count,
        structured,
    })
}

/// Best-effort parse of a model's JSON answer: drops code fences and
/// surrounding chatter, trailing commas, and closes a truncated object.
pub fn parse_outline_json(text: &str) -> anyhow::Result<serde_json::Value> {
    let start = text
        .find('{')
        .ok_or_else(|| anyhow::anyhow!("missing `{{`"))?;
    let from_start = &text[start..];

    let mut candidates = Vec::new();
    if let Some(end) = from_start.rfind('}') {
        candidates.push(from_start[..=end].to_owned());
    }
    candidates.push(close_unbalanced(strip_trailing_fence(from_start)));

    let mut last_err = None;
    for candidate in candidates {
        let repaired = remove_trailing_commas(&candidate);
        match serde_json::from_str::<serde_json::Value>(&repaired) {
            Ok(value) if value.is_object() => return Ok(value),
            Ok(_) => last_err = Some(anyhow::anyhow!("outline json is not an object")),
            Err(err) => last_err = Some(anyhow::Error::new(err).context("parse outline json")),
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no outline json candidate")))
}

fn strip_trailing_fence(text: &str) -> &str {
    let trimmed = text.trim_end();
    trimmed.strip_suffix("```").unwrap_or(trimmed)
}

fn remove_trailing_commas(input: &str) -> String {
    let chars = input.chars().collect::<Vec<_>>();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            out.push(ch);
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

fn close_unbalanced(input: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in input.chars() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut out = input.trim_end().to_owned();
    if in_string {
        out.push('"');
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}
