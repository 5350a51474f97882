use anyhow::Context as _;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

pub fn chat(
    client: &reqwest::blocking::Client,
    base_url: &str,
    model: &str,
    prompt: &str,
) -> anyhow::Result<String> {
    let endpoint = format!("{}/api/chat", base_url.trim_end_matches('/'));
    let request = ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content: prompt,
        }],
        stream: false,
    };

    let response = client
        .post(&endpoint)
        .json(&request)
        .send()
        .with_context(|| format!("POST {endpoint}"))?;

    let status = response.status();
    let raw = response.text().context("read Ollama response body")?;
    if !status.is_success() {
        anyhow::bail!("Ollama API error ({status}): {}", raw.trim());
    }

    let parsed: ChatResponse = serde_json::from_str(&raw).context("parse Ollama chat response")?;
    Ok(parsed.message.content)
}

/// Names of the models installed in the local runtime.
pub fn list_models(
    client: &reqwest::blocking::Client,
    base_url: &str,
) -> anyhow::Result<Vec<String>> {
    let endpoint = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let response = client
        .get(&endpoint)
        .send()
        .with_context(|| format!("GET {endpoint}"))?;

    let status = response.status();
    let raw = response.text().context("read Ollama tags body")?;
    if !status.is_success() {
        anyhow::bail!("Ollama API error ({status}): {}", raw.trim());
    }

    let parsed: TagsResponse = serde_json::from_str(&raw).context("parse Ollama tags response")?;
    Ok(parsed
        .models
        .into_iter()
        .filter_map(|entry| entry.model.or(entry.name))
        .filter(|name| !name.trim().is_empty())
        .collect())
}
