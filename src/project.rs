use anyhow::Context as _;
use chrono::Utc;

use crate::error::Blocked;
use crate::formats::{Backend, ModelEntry, ModelRegistry, ProjectMetadata};
use crate::store::ProjectStore;

pub const DEFAULT_HOSTED_MODELS: [&str; 2] = ["gpt-4-1106-preview", "gpt-4.1-2025-04-14"];

const HOSTED_PREFIXES: [&str; 5] = ["gpt-", "chatgpt-", "o1", "o3", "o4"];

pub struct NewProject {
    pub theme: String,
    pub premise: String,
    /// Registered in order; the first is primary unless `primary` is set.
    pub models: Vec<ModelEntry>,
    pub primary: Option<String>,
}

pub fn default_models(local: &[String]) -> Vec<ModelEntry> {
    DEFAULT_HOSTED_MODELS
        .iter()
        .map(|name| ModelEntry {
            name: (*name).to_owned(),
            backend: Backend::Openai,
        })
        .chain(local.iter().map(|name| ModelEntry {
            name: name.clone(),
            backend: Backend::Ollama,
        }))
        .collect()
}

/// Backend for a model registered without an explicit one. Decided once, at
/// registration time.
pub fn infer_backend(model: &str) -> Backend {
    let lower = model.to_ascii_lowercase();
    if HOSTED_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        Backend::Openai
    } else {
        Backend::Ollama
    }
}

pub fn create(store: &ProjectStore, new: NewProject) -> anyhow::Result<ProjectMetadata> {
    if store.exists()? {
        return Err(Blocked::ProjectExists(store.name().to_owned()).into());
    }

    let mut available: Vec<ModelEntry> = Vec::new();
    for entry in new.models {
        match available.iter().position(|m| m.name == entry.name) {
            Some(idx) => available[idx] = entry,
            None => available.push(entry),
        }
    }
    let primary = match new.primary {
        Some(primary) => primary,
        None => available
            .first()
            .map(|m| m.name.clone())
            .ok_or_else(|| anyhow::anyhow!("a project needs at least one model"))?,
    };
    if !available.iter().any(|m| m.name == primary) {
        return Err(Blocked::UnknownModel(primary).into());
    }

    let meta = ProjectMetadata {
        title: store.name().to_owned(),
        theme: new.theme.trim().to_owned(),
        premise: new.premise.trim().to_owned(),
        models: ModelRegistry { primary, available },
        chapters: Vec::new(),
        outline_approved: false,
        created_at: Some(Utc::now()),
    };

    store.init_layout().context("create project layout")?;
    store.save_metadata(&meta)?;
    tracing::info!(
        project = store.name(),
        primary = %meta.models.primary,
        models = meta.models.available.len(),
        "project created"
    );
    Ok(meta)
}

pub fn approve_outline(store: &ProjectStore) -> anyhow::Result<()> {
    let mut meta = store.load_metadata()?;
    meta.outline_approved = true;
    store.save_metadata(&meta)?;
    tracing::info!(project = store.name(), "outline approved");
    Ok(())
}

pub fn require_outline_approved(meta: &ProjectMetadata) -> anyhow::Result<()> {
    if !meta.outline_approved {
        return Err(Blocked::OutlineNotApproved.into());
    }
    Ok(())
}

/// The override if given, else the primary model. Either way it must be
/// registered.
pub fn resolve_model(
    meta: &ProjectMetadata,
    model_override: Option<&str>,
) -> anyhow::Result<ModelEntry> {
    let name = model_override.unwrap_or(&meta.models.primary);
    meta.models
        .get(name)
        .cloned()
        .ok_or_else(|| Blocked::UnknownModel(name.to_owned()).into())
}

pub fn list_models(store: &ProjectStore) -> anyhow::Result<Vec<(ModelEntry, bool)>> {
    let meta = store.load_metadata()?;
    Ok(meta
        .models
        .available
        .iter()
        .map(|m| (m.clone(), m.name == meta.models.primary))
        .collect())
}

/// Registers `name` (when new, or when a backend is given) and makes it
/// primary.
pub fn set_primary(
    store: &ProjectStore,
    name: &str,
    backend: Option<Backend>,
) -> anyhow::Result<ModelEntry> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("model name is empty");
    }

    let mut meta = store.load_metadata()?;
    let entry = match meta.models.available.iter().position(|m| m.name == name) {
        Some(idx) => {
            let existing = &mut meta.models.available[idx];
            if let Some(backend) = backend {
                existing.backend = backend;
            }
            existing.clone()
        }
        None => {
            let entry = ModelEntry {
                name: name.to_owned(),
                backend: backend.unwrap_or_else(|| infer_backend(name)),
            };
            meta.models.available.push(entry.clone());
            entry
        }
    };
    meta.models.primary = entry.name.clone();
    store.save_metadata(&meta)?;

    tracing::info!(
        project = store.name(),
        model = %entry.name,
        backend = entry.backend.label(),
        "primary model updated"
    );
    Ok(entry)
}
