//! Project persistence.
//!
//! Files are the source of truth. [`Storage`] is the raw key/value seam (keys
//! are `/`-separated paths relative to the project root) and [`ProjectStore`]
//! puts the project layout and typed per-entity operations on top of it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context as _;

use crate::error::Blocked;
use crate::formats::{Marker, ProjectMetadata, Verdict};

pub trait Storage: Send + Sync {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn write(&self, key: &str, contents: &str) -> anyhow::Result<()>;
    /// Returns whether something was removed.
    fn remove(&self, key: &str) -> anyhow::Result<bool>;
    fn exists(&self, key: &str) -> anyhow::Result<bool>;
    /// All file keys below `dir`, recursively, sorted.
    fn list(&self, dir: &str) -> anyhow::Result<Vec<String>>;
    fn ensure_dir(&self, dir: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FsStorage {
    base_dir: PathBuf,
}

impl FsStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path(&self, key: &str) -> PathBuf {
        let mut path = self.base_dir.clone();
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }
}

impl Storage for FsStorage {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path(key);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read: {}", path.display())),
        }
    }

    fn write(&self, key: &str, contents: &str) -> anyhow::Result<()> {
        let path = self.path(key);
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create parent dir: {}", parent.display()))?;

        let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
        std::fs::write(&tmp_path, contents)
            .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("rename tmp to final: {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<bool> {
        let path = self.path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| format!("remove: {}", path.display())),
        }
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let path = self.path(key);
        path.try_exists()
            .with_context(|| format!("stat: {}", path.display()))
    }

    fn list(&self, dir: &str) -> anyhow::Result<Vec<String>> {
        let root = self.path(dir);
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            for entry in std::fs::read_dir(&current)
                .with_context(|| format!("read dir: {}", current.display()))?
            {
                let path = entry?.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let rel = path
                    .strip_prefix(&self.base_dir)
                    .with_context(|| format!("relativize: {}", path.display()))?;
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn ensure_dir(&self, dir: &str) -> anyhow::Result<()> {
        let path = self.path(dir);
        std::fs::create_dir_all(&path).with_context(|| format!("create dir: {}", path.display()))
    }
}

/// Keeps everything in a map. Used by tests and anything that wants a
/// throwaway project.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> anyhow::Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.files
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.files()?.get(key).cloned())
    }

    fn write(&self, key: &str, contents: &str) -> anyhow::Result<()> {
        self.files()?.insert(key.to_owned(), contents.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.files()?.remove(key).is_some())
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.files()?.contains_key(key))
    }

    fn list(&self, dir: &str) -> anyhow::Result<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .files()?
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect())
    }

    fn ensure_dir(&self, _dir: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

pub const PROJECT_JSON: &str = "project.json";
pub const CHAPTERS_DIR: &str = "chapters";
pub const SUMMARIES_DIR: &str = "summaries";
pub const PROJECT_SUBDIRS: [&str; 4] = ["chapters", "drafts", "summaries", "context"];
pub const OUTLINE_RAW: &str = "chapters/outline_raw.txt";
pub const OUTLINE_JSON: &str = "chapters/outline.json";

pub fn chapter_dir(chapter: u32) -> String {
    format!("{CHAPTERS_DIR}/chapter_{chapter}")
}

pub fn page_draft_key(chapter: u32, page: u32, model: Option<&str>) -> String {
    let suffix = model
        .map(|m| format!("_{}", m.replace('/', "_")))
        .unwrap_or_default();
    format!("{}/page_{page}_draft{suffix}.md", chapter_dir(chapter))
}

pub fn page_summary_key(page: u32) -> String {
    format!("{SUMMARIES_DIR}/page_{page}_summary.txt")
}

pub fn page_marker_key(chapter: u32, page: u32, verdict: Verdict) -> String {
    format!("{}/page_{page}_{}.txt", chapter_dir(chapter), verdict.as_str())
}

pub fn chapter_final_key(chapter: u32) -> String {
    format!("{}/chapter_{chapter}_final.md", chapter_dir(chapter))
}

pub fn chapter_summary_key(chapter: u32) -> String {
    format!("{}/chapter_{chapter}_summary.txt", chapter_dir(chapter))
}

pub fn chapter_marker_key(chapter: u32, verdict: Verdict) -> String {
    format!(
        "{}/chapter_{chapter}_{}.txt",
        chapter_dir(chapter),
        verdict.as_str()
    )
}

/// Typed access to one project's files.
pub struct ProjectStore {
    name: String,
    storage: Box<dyn Storage>,
}

impl ProjectStore {
    pub fn new(name: impl Into<String>, storage: Box<dyn Storage>) -> Self {
        Self {
            name: name.into(),
            storage,
        }
    }

    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::new(name, Box::new(MemoryStorage::new()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn exists(&self) -> anyhow::Result<bool> {
        self.storage.exists(PROJECT_JSON)
    }

    pub fn init_layout(&self) -> anyhow::Result<()> {
        for dir in PROJECT_SUBDIRS {
            self.storage.ensure_dir(dir)?;
        }
        Ok(())
    }

    pub fn load_metadata(&self) -> anyhow::Result<ProjectMetadata> {
        let raw = self
            .storage
            .read(PROJECT_JSON)?
            .ok_or_else(|| Blocked::ProjectNotFound(self.name.clone()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {PROJECT_JSON}"))
    }

    pub fn save_metadata(&self, meta: &ProjectMetadata) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(meta).context("serialize project metadata")?;
        self.storage.write(PROJECT_JSON, &json)
    }

    pub fn outline_raw(&self) -> anyhow::Result<Option<String>> {
        self.storage.read(OUTLINE_RAW)
    }

    pub fn write_outline_raw(&self, text: &str) -> anyhow::Result<()> {
        self.storage.write(OUTLINE_RAW, text)
    }

    pub fn outline_json(&self) -> anyhow::Result<Option<String>> {
        self.storage.read(OUTLINE_JSON)
    }

    pub fn write_outline_json(&self, outline: &serde_json::Value) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(outline).context("serialize outline")?;
        self.storage.write(OUTLINE_JSON, &json)
    }

    pub fn page_draft(
        &self,
        chapter: u32,
        page: u32,
        model: Option<&str>,
    ) -> anyhow::Result<Option<String>> {
        self.storage.read(&page_draft_key(chapter, page, model))
    }

    pub fn has_page_draft(&self, chapter: u32, page: u32) -> anyhow::Result<bool> {
        self.storage.exists(&page_draft_key(chapter, page, None))
    }

    pub fn write_page_draft(
        &self,
        chapter: u32,
        page: u32,
        model: Option<&str>,
        text: &str,
    ) -> anyhow::Result<String> {
        let key = page_draft_key(chapter, page, model);
        self.storage.write(&key, text)?;
        Ok(key)
    }

    pub fn page_summary(&self, page: u32) -> anyhow::Result<Option<String>> {
        self.storage.read(&page_summary_key(page))
    }

    pub fn write_page_summary(&self, page: u32, summary: &str) -> anyhow::Result<()> {
        self.storage.write(&page_summary_key(page), summary)
    }

    pub fn has_page_marker(
        &self,
        chapter: u32,
        page: u32,
        verdict: Verdict,
    ) -> anyhow::Result<bool> {
        self.storage.exists(&page_marker_key(chapter, page, verdict))
    }

    /// Writes the marker and drops the opposite one, so a page never carries
    /// both verdicts.
    pub fn mark_page(&self, chapter: u32, page: u32, marker: &Marker) -> anyhow::Result<()> {
        self.storage
            .write(&page_marker_key(chapter, page, marker.verdict), &marker.render())?;
        self.storage
            .remove(&page_marker_key(chapter, page, marker.verdict.opposite()))?;
        Ok(())
    }

    pub fn mark_chapter(&self, chapter: u32, marker: &Marker) -> anyhow::Result<()> {
        self.storage
            .write(&chapter_marker_key(chapter, marker.verdict), &marker.render())?;
        self.storage
            .remove(&chapter_marker_key(chapter, marker.verdict.opposite()))?;
        Ok(())
    }

    pub fn chapter_final(&self, chapter: u32) -> anyhow::Result<Option<String>> {
        self.storage.read(&chapter_final_key(chapter))
    }

    pub fn write_chapter_final(&self, chapter: u32, text: &str) -> anyhow::Result<String> {
        let key = chapter_final_key(chapter);
        self.storage.write(&key, text)?;
        Ok(key)
    }

    pub fn chapter_summary(&self, chapter: u32) -> anyhow::Result<Option<String>> {
        self.storage.read(&chapter_summary_key(chapter))
    }

    pub fn write_chapter_summary(&self, chapter: u32, text: &str) -> anyhow::Result<String> {
        let key = chapter_summary_key(chapter);
        self.storage.write(&key, text)?;
        Ok(key)
    }

    pub fn chapter_keys(&self) -> anyhow::Result<Vec<String>> {
        self.storage.list(CHAPTERS_DIR)
    }
}

/// The directory holding every project, one subdirectory each.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project(&self, name: &str) -> anyhow::Result<ProjectStore> {
        validate_project_name(name)?;
        let storage = FsStorage::new(self.root.join(name));
        Ok(ProjectStore::new(name, Box::new(storage)))
    }
}

fn validate_project_name(name: &str) -> anyhow::Result<()> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\']);
    if invalid {
        return Err(Blocked::InvalidProjectName(name.to_owned()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_keys_follow_project_layout() {
        assert_eq!(
            page_draft_key(2, 13, None),
            "chapters/chapter_2/page_13_draft.md"
        );
        assert_eq!(
            page_draft_key(1, 1, Some("library/llama3:8b")),
            "chapters/chapter_1/page_1_draft_library_llama3:8b.md"
        );
        assert_eq!(page_summary_key(4), "summaries/page_4_summary.txt");
        assert_eq!(
            chapter_marker_key(3, Verdict::Rejected),
            "chapters/chapter_3/chapter_3_rejected.txt"
        );
    }

    #[test]
    fn fs_storage_reads_missing_as_none_and_lists_recursively() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let storage = FsStorage::new(temp.path());

        assert_eq!(storage.read("chapters/outline_raw.txt")?, None);
        storage.write("chapters/chapter_1/page_1_draft.md", "text")?;
        storage.write("chapters/outline_raw.txt", "outline")?;
        storage.write("summaries/page_1_summary.txt", "summary")?;

        assert_eq!(
            storage.read("chapters/chapter_1/page_1_draft.md")?.as_deref(),
            Some("text")
        );
        assert_eq!(
            storage.list("chapters")?,
            vec![
                "chapters/chapter_1/page_1_draft.md".to_owned(),
                "chapters/outline_raw.txt".to_owned(),
            ]
        );
        assert!(storage.remove("chapters/outline_raw.txt")?);
        assert!(!storage.remove("chapters/outline_raw.txt")?);
        assert!(storage.list("missing")?.is_empty());
        Ok(())
    }

    #[test]
    fn fs_storage_write_leaves_no_tmp_files() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let storage = FsStorage::new(temp.path());
        storage.write("project.json", "{}")?;
        storage.write("project.json", "{\"a\":1}")?;

        let names = std::fs::read_dir(temp.path())?
            .map(|e| e.map(|e| e.file_name().to_string_lossy().to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(names, vec!["project.json".to_owned()]);
        Ok(())
    }

    #[test]
    fn marking_a_page_replaces_the_opposite_verdict() -> anyhow::Result<()> {
        let store = ProjectStore::in_memory("demo");
        store.mark_page(1, 3, &Marker::new(Verdict::Rejected).with_reason("flat"))?;
        assert!(store.has_page_marker(1, 3, Verdict::Rejected)?);

        store.mark_page(1, 3, &Marker::new(Verdict::Approved))?;
        assert!(store.has_page_marker(1, 3, Verdict::Approved)?);
        assert!(!store.has_page_marker(1, 3, Verdict::Rejected)?);
        Ok(())
    }

    #[test]
    fn loading_missing_project_is_blocked() {
        let store = ProjectStore::in_memory("ghost");
        let err = store.load_metadata().unwrap_err();
        assert_eq!(
            err.downcast_ref::<Blocked>(),
            Some(&Blocked::ProjectNotFound("ghost".to_owned()))
        );
    }

    #[test]
    fn workspace_rejects_path_like_project_names() {
        let workspace = Workspace::new("projects");
        for name in ["", "..", "a/b", "a\\b"] {
            assert!(workspace.project(name).is_err(), "name={name:?}");
        }
        assert!(workspace.project("my-novel").is_ok());
    }
}
