use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub title: String,
    pub theme: String,
    pub premise: String,
    pub models: ModelRegistry,
    #[serde(default)]
    pub chapters: Vec<serde_json::Value>,
    #[serde(default)]
    pub outline_approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRegistry {
    pub primary: String,
    pub available: Vec<ModelEntry>,
}

impl ModelRegistry {
    pub fn get(&self, name: &str) -> Option<&ModelEntry> {
        self.available.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub backend: Backend,
}

/// How a registered model is reached. Resolved once, when the model is
/// registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backend {
    Openai,
    Ollama,
    Command {
        program: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
}

impl Backend {
    pub fn label(&self) -> &'static str {
        match self {
            Backend::Openai => "openai",
            Backend::Ollama => "ollama",
            Backend::Command { .. } => "command",
        }
    }
}

/// Lenient view over `outline.json`. The file itself keeps whatever the model
/// produced; only the fields read back are typed here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutlineView {
    #[serde(default)]
    pub chapters: Vec<OutlineChapter>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutlineChapter {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approved,
    Rejected,
}

impl Verdict {
    pub fn opposite(self) -> Self {
        match self {
            Verdict::Approved => Verdict::Rejected,
            Verdict::Rejected => Verdict::Approved,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Approved => "approved",
            Verdict::Rejected => "rejected",
        }
    }
}

/// Body of a sentinel file. Only the file's existence matters to the pipeline.
#[derive(Debug, Clone)]
pub struct Marker {
    pub verdict: Verdict,
    pub automatic: bool,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl Marker {
    pub fn new(verdict: Verdict) -> Self {
        Self {
            verdict,
            automatic: false,
            reason: None,
            at: Utc::now(),
        }
    }

    pub fn automatic(mut self) -> Self {
        self.automatic = true;
        self
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        let reason = reason.trim();
        if !reason.is_empty() {
            self.reason = Some(reason.to_owned());
        }
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.automatic {
            out.push_str("auto-");
        }
        out.push_str(self.verdict.as_str());
        out.push('\n');
        if let Some(reason) = &self.reason {
            out.push_str(&format!("reason: {reason}\n"));
        }
        out.push_str(&format!("at: {}\n", self.at.to_rfc3339()));
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    pub title: String,
    pub outline_approved: bool,
    pub primary_model: String,
    pub pages_per_chapter: u32,
    pub chapters: Vec<ChapterStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterStatus {
    pub chapter: u32,
    pub approved_pages: usize,
    pub rejected_pages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}
