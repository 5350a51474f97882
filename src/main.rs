use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser as _;

use plotforge::cli::{Cli, Command, GlobalArgs, NewArgs};
use plotforge::formats::{Backend, ModelEntry};
use plotforge::generate::{BackendConfig, Backends};
use plotforge::page::{ModelOutcome, PageRun};
use plotforge::store::Workspace;
use plotforge::{chapter, outline, page, project, status};

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        if plotforge::error::is_blocked(&err) {
            eprintln!("blocked: {err:#}");
        } else {
            eprintln!("{err:#}");
        }
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    plotforge::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let workspace = Workspace::new(&cli.global.projects_dir);
    let backends = backends(&cli.global)?;
    let ppc = cli.global.pages_per_chapter;

    match cli.command {
        Command::New(args) => {
            let store = workspace.project(&args.name)?;
            let new = new_project(&args, &backends)?;
            project::create(&store, new).context("new")?;
            println!("[Project Created] {}", args.name);
        }
        Command::GenerateOutline(args) => {
            let store = workspace.project(&args.name)?;
            let run = outline::generate(&store, &backends, args.model.as_deref())
                .context("generate-outline")?;
            println!("[Saved] {}", plotforge::store::OUTLINE_RAW);
            if run.structured {
                println!("[Saved] {}", plotforge::store::OUTLINE_JSON);
            }
        }
        Command::ApproveOutline(args) => {
            let store = workspace.project(&args.name)?;
            project::approve_outline(&store).context("approve-outline")?;
            println!("[Outline Approved] {}", args.name);
        }
        Command::GeneratePage(args) => {
            let store = workspace.project(&args.name)?;
            let run = page::generate(
                &store,
                &backends,
                args.number,
                args.model.as_deref(),
                args.test_models,
                ppc,
            )
            .context("generate-page")?;
            print_page_run(&run);
        }
        Command::ContinuePage(args) => {
            let store = workspace.project(&args.name)?;
            let run =
                page::continue_draft(&store, &backends, args.number, args.model.as_deref(), ppc)
                    .context("continue-page")?;
            if let ModelOutcome::Saved { draft, .. } = &run.outcome {
                println!("[Saved] {draft}");
            }
        }
        Command::GenerateChapter(args) => {
            let store = workspace.project(&args.name)?;
            let runs = chapter::generate(
                &store,
                &backends,
                args.number,
                args.model.as_deref(),
                args.test_models,
                ppc,
            )
            .context("generate-chapter")?;
            runs.iter().for_each(print_page_run);
        }
        Command::WriteChapter(args) => {
            let store = workspace.project(&args.name)?;
            let runs = chapter::write(
                &store,
                &backends,
                args.number,
                args.pages,
                args.model.as_deref(),
                ppc,
            )
            .context("write-chapter")?;
            runs.iter().for_each(print_page_run);
        }
        Command::ApprovePage(args) => {
            let store = workspace.project(&args.name)?;
            page::approve(&store, args.number, ppc).context("approve-page")?;
            println!("[Page Approved] {}", args.number);
        }
        Command::RejectPage(args) => {
            let store = workspace.project(&args.name)?;
            page::reject(&store, args.number, &args.reason, ppc).context("reject-page")?;
            println!("[Page Rejected] {}", args.number);
        }
        Command::ApproveChapter(args) => {
            let store = workspace.project(&args.name)?;
            let report = chapter::approve(&store, args.number, ppc).context("approve-chapter")?;
            println!("[Chapter Approved] {}", args.number);
            println!("[Saved] {}", report.path);
        }
        Command::RejectChapter(args) => {
            let store = workspace.project(&args.name)?;
            chapter::reject(&store, args.number, &args.reason).context("reject-chapter")?;
            println!("[Chapter Rejected] {}", args.number);
        }
        Command::ConcatChapter(args) => {
            let store = workspace.project(&args.name)?;
            let report = chapter::concat(&store, args.number, ppc).context("concat-chapter")?;
            println!("[Saved] {}", report.path);
        }
        Command::SummarizeChapter(args) => {
            let store = workspace.project(&args.name)?;
            let summary =
                chapter::summarize(&store, &backends, args.number, args.model.as_deref())
                    .context("summarize-chapter")?;
            if summary.is_some() {
                println!(
                    "[Saved] {}",
                    plotforge::store::chapter_summary_key(args.number)
                );
            }
        }
        Command::Status(args) => {
            let store = workspace.project(&args.name)?;
            let status = status::project_status(&store, ppc).context("status")?;
            let yaml = serde_yaml::to_string(&status).context("serialize status")?;
            print!("{yaml}");
        }
        Command::Models(args) => {
            let store = workspace.project(&args.name)?;
            if let Some(name) = &args.set {
                let entry = project::set_primary(&store, name, args.backend.backend()?)
                    .context("models --set")?;
                println!("[Model Updated] Primary set to {}", entry.name);
            } else {
                println!("[Models]");
                for (entry, primary) in project::list_models(&store)? {
                    let tag = if primary { " (primary)" } else { "" };
                    println!("- {} [{}]{tag}", entry.name, entry.backend.label());
                }
            }
        }
    }

    Ok(())
}

fn backends(global: &GlobalArgs) -> anyhow::Result<Backends> {
    Backends::new(BackendConfig {
        openai_base_url: global.openai_base_url.clone(),
        ollama_base_url: global.ollama_base_url.clone(),
        timeout: Duration::from_secs(global.timeout_secs),
        continuation_words: global.continuation_words,
        ..BackendConfig::default()
    })
}

fn new_project(args: &NewArgs, backends: &Backends) -> anyhow::Result<project::NewProject> {
    let theme = match &args.theme {
        Some(theme) => theme.clone(),
        None => std::fs::read_to_string(&args.theme_file)
            .with_context(|| format!("read theme: {}", args.theme_file.display()))?,
    };
    let premise = match &args.premise {
        Some(premise) => premise.clone(),
        None => std::fs::read_to_string(&args.premise_file)
            .with_context(|| format!("read premise: {}", args.premise_file.display()))?,
    };

    let local = if args.discover_ollama {
        backends
            .discover_local_models()
            .context("discover ollama models")?
    } else {
        Vec::new()
    };

    let models = if args.models.is_empty() {
        project::default_models(&local)
    } else {
        let backend = args.backend.backend()?;
        let mut models = args
            .models
            .iter()
            .map(|name| ModelEntry {
                name: name.clone(),
                backend: backend
                    .clone()
                    .unwrap_or_else(|| project::infer_backend(name)),
            })
            .collect::<Vec<_>>();
        models.extend(local.into_iter().map(|name| ModelEntry {
            name,
            backend: Backend::Ollama,
        }));
        models
    };

    Ok(project::NewProject {
        theme,
        premise,
        models,
        primary: args.primary.clone(),
    })
}

fn print_page_run(run: &PageRun) {
    for model_run in &run.runs {
        match &model_run.outcome {
            ModelOutcome::Saved { draft, .. } => println!("[Saved] {draft}"),
            ModelOutcome::Empty => {
                println!("[Skipped] page {} ({}): empty", run.page, model_run.model)
            }
            ModelOutcome::Failed(_) => {
                println!("[Failed] page {} ({})", run.page, model_run.model)
            }
        }
    }
}
