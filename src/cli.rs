use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::context::DEFAULT_PAGES_PER_CHAPTER;
use crate::formats::Backend;
use crate::prompt::DEFAULT_CONTINUATION_WORDS;
use crate::{ollama, openai};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Directory holding one subdirectory per project.
    #[arg(long, global = true, env = "PLOTFORGE_PROJECTS_DIR", default_value = "projects")]
    pub projects_dir: PathBuf,

    /// OpenAI-compatible API base URL.
    #[arg(long, global = true, env = "OPENAI_BASE_URL", default_value = openai::DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    /// Ollama server base URL.
    #[arg(long, global = true, env = "OLLAMA_HOST", default_value = ollama::DEFAULT_BASE_URL)]
    pub ollama_base_url: String,

    /// HTTP timeout for a single generation call.
    #[arg(long, global = true, env = "PLOTFORGE_TIMEOUT_SECS", default_value_t = 600)]
    pub timeout_secs: u64,

    /// Pages per chapter, used to map page numbers onto chapters.
    #[arg(
        long,
        global = true,
        env = "PLOTFORGE_PAGES_PER_CHAPTER",
        default_value_t = DEFAULT_PAGES_PER_CHAPTER,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub pages_per_chapter: u32,

    /// Trailing words of a draft sent back when continuing it.
    #[arg(long, global = true, default_value_t = DEFAULT_CONTINUATION_WORDS)]
    pub continuation_words: usize,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a project.
    New(NewArgs),
    /// Generate the prose outline and its structured form.
    GenerateOutline(ModelArgs),
    ApproveOutline(ProjectArg),
    /// Generate one page (every registered model with `--test-models`).
    GeneratePage(GeneratePageArgs),
    /// Extend an existing page draft.
    ContinuePage(PageModelArgs),
    /// Run page generation over every page of a chapter.
    GenerateChapter(GeneratePageArgs),
    /// Write the first `--pages` pages of a chapter with one model.
    WriteChapter(WriteChapterArgs),
    ApprovePage(NumberArgs),
    RejectPage(RejectArgs),
    /// Approve every drafted page of the chapter, then concatenate it.
    ApproveChapter(NumberArgs),
    RejectChapter(RejectArgs),
    /// Join the approved pages of a chapter into its final text.
    ConcatChapter(NumberArgs),
    SummarizeChapter(PageModelArgs),
    /// Print approval counts as YAML.
    Status(ProjectArg),
    /// List or change the model registry.
    Models(ModelsArgs),
}

#[derive(Debug, Args)]
pub struct ProjectArg {
    /// Project name.
    pub name: String,
}

#[derive(Debug, Args)]
pub struct ModelArgs {
    pub name: String,

    /// Registered model to use instead of the primary one.
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Debug, Args)]
pub struct NumberArgs {
    pub name: String,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub number: u32,
}

#[derive(Debug, Args)]
pub struct PageModelArgs {
    pub name: String,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub number: u32,

    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Debug, Args)]
pub struct GeneratePageArgs {
    pub name: String,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub number: u32,

    #[arg(long, conflicts_with = "test_models")]
    pub model: Option<String>,

    /// Generate with every registered model, one suffixed draft each.
    #[arg(long)]
    pub test_models: bool,
}

#[derive(Debug, Args)]
pub struct WriteChapterArgs {
    pub name: String,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub number: u32,

    /// Number of pages to write.
    #[arg(long, default_value_t = DEFAULT_PAGES_PER_CHAPTER)]
    pub pages: u32,

    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Debug, Args)]
pub struct RejectArgs {
    pub name: String,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub number: u32,

    #[arg(long, default_value = "")]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    Openai,
    Ollama,
    Command,
}

/// Backend selection shared by `new` and `models --set`.
#[derive(Debug, Args)]
pub struct BackendArgs {
    /// Backend for the given model(s); inferred from the name when omitted.
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Program for the `command` backend. Reads the prompt on stdin and
    /// writes the text to stdout.
    #[arg(long, required_if_eq("backend", "command"))]
    pub command: Option<String>,

    /// Arguments for `--command`.
    #[arg(last = true)]
    pub command_args: Vec<String>,
}

impl BackendArgs {
    /// `None` means "infer from the model name".
    pub fn backend(&self) -> anyhow::Result<Option<Backend>> {
        let backend = match (self.backend, &self.command) {
            (None, None) => return Ok(None),
            (Some(BackendKind::Openai), None) => Backend::Openai,
            (Some(BackendKind::Ollama), None) => Backend::Ollama,
            (Some(BackendKind::Command) | None, Some(program)) => Backend::Command {
                program: program.clone(),
                args: self.command_args.clone(),
            },
            (Some(BackendKind::Command), None) => {
                anyhow::bail!("--backend command requires --command")
            }
            (Some(kind), Some(_)) => {
                anyhow::bail!("--command cannot be combined with --backend {kind:?}")
            }
        };
        Ok(Some(backend))
    }
}

#[derive(Debug, Args)]
pub struct NewArgs {
    pub name: String,

    /// Theme text (default: read from `--theme-file`).
    #[arg(long)]
    pub theme: Option<String>,

    #[arg(long, default_value = "theme.txt", conflicts_with = "theme")]
    pub theme_file: PathBuf,

    /// Premise text (default: read from `--premise-file`).
    #[arg(long)]
    pub premise: Option<String>,

    #[arg(long, default_value = "premise.txt", conflicts_with = "premise")]
    pub premise_file: PathBuf,

    /// Model to register; repeatable. Defaults to the hosted models plus any
    /// discovered local ones.
    #[arg(long = "model")]
    pub models: Vec<String>,

    /// Primary model (default: the first registered).
    #[arg(long)]
    pub primary: Option<String>,

    /// Register the models installed in the local Ollama runtime.
    #[arg(long)]
    pub discover_ollama: bool,

    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(Debug, Args)]
pub struct ModelsArgs {
    pub name: String,

    /// Print the registry.
    #[arg(long, conflicts_with = "set")]
    pub list: bool,

    /// Register a model (if needed) and make it primary.
    #[arg(long)]
    pub set: Option<String>,

    #[command(flatten)]
    pub backend: BackendArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_work_after_the_subcommand() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "plotforge",
            "generate-page",
            "novel",
            "--number",
            "3",
            "--projects-dir",
            "/tmp/p",
            "--pages-per-chapter",
            "5",
        ])?;
        assert_eq!(cli.global.projects_dir, PathBuf::from("/tmp/p"));
        assert_eq!(cli.global.pages_per_chapter, 5);
        let Command::GeneratePage(args) = cli.command else {
            anyhow::bail!("expected generate-page");
        };
        assert_eq!(args.number, 3);
        assert!(!args.test_models);
        Ok(())
    }

    #[test]
    fn page_numbers_start_at_one() {
        let parsed = Cli::try_parse_from(["plotforge", "approve-page", "novel", "--number", "0"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn command_backend_takes_trailing_args() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "plotforge",
            "new",
            "novel",
            "--theme",
            "loss",
            "--premise",
            "glass",
            "--model",
            "stub",
            "--command",
            "sh",
            "--",
            "-c",
            "cat",
        ])?;
        let Command::New(args) = cli.command else {
            anyhow::bail!("expected new");
        };
        assert_eq!(
            args.backend.backend()?,
            Some(Backend::Command {
                program: "sh".to_owned(),
                args: vec!["-c".to_owned(), "cat".to_owned()],
            })
        );
        Ok(())
    }

    #[test]
    fn backend_kind_without_command_program_is_rejected() {
        let args = BackendArgs {
            backend: Some(BackendKind::Command),
            command: None,
            command_args: Vec::new(),
        };
        assert!(args.backend().is_err());
    }
}
