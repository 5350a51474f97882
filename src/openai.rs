//! Blocking client for the OpenAI Responses API.

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const INSTRUCTIONS: &str = "You are a novelist's writing engine. \
Follow the request exactly and output only the requested text.";

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
    text: TextConfig,
    store: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct TextConfig {
    format: TextFormat,
}

#[derive(Serialize)]
struct TextFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ResponsesBody {
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    OutputText {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

pub fn responses_endpoint(base_url: &str) -> String {
    format!("{}/responses", base_url.trim_end_matches('/'))
}

/// One non-streaming completion; returns the concatenated output text.
pub fn responses_text(
    client: &reqwest::blocking::Client,
    endpoint: &str,
    api_key: &str,
    model: &str,
    input: &str,
    temperature: f32,
) -> anyhow::Result<String> {
    let request = ResponsesRequest {
        model,
        instructions: INSTRUCTIONS,
        input,
        text: TextConfig {
            format: TextFormat { kind: "text" },
        },
        store: false,
        temperature: temperature_for(model, temperature),
    };

    let response = client
        .post(endpoint)
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .with_context(|| format!("POST {endpoint}"))?;

    let status = response.status();
    let raw = response.text().context("read OpenAI response body")?;
    if !status.is_success() {
        let message = error_message(&raw).unwrap_or_else(|| raw.trim().to_owned());
        anyhow::bail!("OpenAI API error ({status}): {message}");
    }

    output_text(&raw)
}

/// gpt-5 models reject sampling parameters.
fn temperature_for(model: &str, temperature: f32) -> Option<f32> {
    (!model.starts_with("gpt-5")).then_some(temperature)
}

fn error_message(raw: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(raw)
        .ok()
        .map(|body| body.error.message)
}

fn output_text(raw: &str) -> anyhow::Result<String> {
    let body: ResponsesBody = serde_json::from_str(raw).context("parse OpenAI response")?;
    Ok(body
        .output
        .into_iter()
        .filter_map(|item| match item {
            OutputItem::Message { content } => Some(content),
            OutputItem::Other => None,
        })
        .flatten()
        .filter_map(|part| match part {
            ContentPart::OutputText { text } => Some(text),
            ContentPart::Other => None,
        })
        .collect())
}
