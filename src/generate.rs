//! Uniform access to the text-generation backends.
//!
//! Every backend is reduced to `generate(prompt, min_words)` returning the
//! text, its whitespace word count and the wall-clock duration of the call.
//! No retries happen here: a failed call is a single error for the caller to
//! log and skip.

use std::time::{Duration, Instant};

use anyhow::Context as _;
use url::Url;

use crate::context::word_count;
use crate::formats::{Backend, ModelEntry};
use crate::prompt::{DEFAULT_CONTINUATION_WORDS, bound_continuation};
use crate::{command, ollama, openai};

#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub word_count: usize,
    pub elapsed: Duration,
}

impl Generation {
    /// Wall time in whole milliseconds, saturating at `u64::MAX`.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

pub trait Generator {
    fn model(&self) -> &str;
    fn generate(&self, prompt: &str, min_words: usize) -> anyhow::Result<Generation>;
}

/// Turns a registry entry into a ready generator.
pub trait Connector {
    fn connect(&self, entry: &ModelEntry) -> anyhow::Result<Box<dyn Generator>>;
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub openai_base_url: String,
    pub openai_temperature: f32,
    pub ollama_base_url: String,
    pub timeout: Duration,
    pub continuation_words: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            openai_base_url: openai::DEFAULT_BASE_URL.to_owned(),
            openai_temperature: 0.8,
            ollama_base_url: ollama::DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(600),
            continuation_words: DEFAULT_CONTINUATION_WORDS,
        }
    }
}

pub struct Backends {
    config: BackendConfig,
    client: reqwest::blocking::Client,
}

impl Backends {
    pub fn new(config: BackendConfig) -> anyhow::Result<Self> {
        validate_base_url(&config.openai_base_url).context("openai base url")?;
        validate_base_url(&config.ollama_base_url).context("ollama base url")?;
        if config.continuation_words == 0 {
            anyhow::bail!("--continuation-words must be > 0");
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build http client")?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Models installed in the local Ollama runtime.
    pub fn discover_local_models(&self) -> anyhow::Result<Vec<String>> {
        ollama::list_models(&self.client, &self.config.ollama_base_url)
    }
}

impl Connector for Backends {
    fn connect(&self, entry: &ModelEntry) -> anyhow::Result<Box<dyn Generator>> {
        let transport = match &entry.backend {
            Backend::Openai => {
                let api_key = std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
                Transport::Openai {
                    client: self.client.clone(),
                    endpoint: openai::responses_endpoint(&self.config.openai_base_url),
                    api_key,
                    temperature: self.config.openai_temperature,
                }
            }
            Backend::Ollama => Transport::Ollama {
                client: self.client.clone(),
                base_url: self.config.ollama_base_url.clone(),
            },
            Backend::Command { program, args } => Transport::Command {
                program: program.clone(),
                args: args.clone(),
            },
        };

        Ok(Box::new(ModelGenerator {
            model: entry.name.clone(),
            transport,
            continuation_words: self.config.continuation_words,
        }))
    }
}

fn validate_base_url(raw: &str) -> anyhow::Result<()> {
    let url = Url::parse(raw).with_context(|| format!("parse url: {raw}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("url must be http/https: {raw}");
    }
    Ok(())
}

enum Transport {
    Openai {
        client: reqwest::blocking::Client,
        endpoint: String,
        api_key: String,
        temperature: f32,
    },
    Ollama {
        client: reqwest::blocking::Client,
        base_url: String,
    },
    Command {
        program: String,
        args: Vec<String>,
    },
}

struct ModelGenerator {
    model: String,
    transport: Transport,
    continuation_words: usize,
}

impl ModelGenerator {
    fn complete(&self, prompt: &str, min_words: usize) -> anyhow::Result<String> {
        match &self.transport {
            Transport::Openai {
                client,
                endpoint,
                api_key,
                temperature,
            } => openai::responses_text(
                client,
                endpoint,
                api_key,
                &self.model,
                prompt,
                *temperature,
            ),
            Transport::Ollama { client, base_url } => {
                ollama::chat(client, base_url, &self.model, prompt)
            }
            Transport::Command { program, args } => {
                command::exec(program, args, &self.model, prompt, min_words)
            }
        }
    }
}

impl Generator for ModelGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str, min_words: usize) -> anyhow::Result<Generation> {
        let prompt = bound_continuation(prompt, self.continuation_words);

        let started_at = Instant::now();
        let text = self
            .complete(&prompt, min_words)
            .with_context(|| format!("generate with {}", self.model))?;
        let elapsed = started_at.elapsed();

        let words = word_count(&text);
        if words < min_words {
            tracing::warn!(
                model = %self.model,
                words = words,
                min_words = min_words,
                "generated text is shorter than requested"
            );
        }

        Ok(Generation {
            text,
            word_count: words,
            elapsed,
        })
    }
}
