use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdftools::bookmarks::{self, Bookmark, BookmarkEditor};
use pdftools::config::{LOG_ENV, Settings};
use pdftools::download::DirectorySink;
use pdftools::feedback::TerminalFeedback;
use pdftools::host::ToolHost;
use pdftools::input::{InputFile, collect_inputs};
use pdftools::pipeline::{Executor, Operation, Outcome};
use pdftools::session::Session;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "pdftools")]
#[command(about = "Flatten forms, convert images, bundle files, merge PDFs and edit bookmarks")]
struct Cli {
    #[arg(long, global = true, help = "JSON settings file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Directory to save results in")]
    output_dir: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Do not print progress messages")]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Flatten the form fields of a PDF")]
    Flatten {
        #[arg(help = "Input PDF file")]
        input: PathBuf,
    },
    #[command(about = "Convert images to a PDF, one page per image")]
    ImagesToPdf {
        #[arg(help = "Input images (JPEG, PNG, BMP)")]
        images: Vec<PathBuf>,
    },
    #[command(about = "Bundle files into a ZIP archive")]
    Zip {
        #[arg(help = "Files to archive")]
        files: Vec<PathBuf>,
    },
    #[command(about = "Merge PDFs into one document")]
    Merge {
        #[arg(help = "Input PDF files, in order")]
        inputs: Vec<PathBuf>,
    },
    #[command(about = "Show or edit the bookmarks of a PDF")]
    Bookmarks {
        #[command(subcommand)]
        action: BookmarkCommands,
    },
}

#[derive(Subcommand)]
enum BookmarkCommands {
    #[command(about = "Print the outline as JSON")]
    Show {
        #[arg(help = "Input PDF file")]
        input: PathBuf,
    },
    #[command(about = "Replace the outline with one read from a JSON file")]
    Apply {
        #[arg(help = "Input PDF file")]
        input: PathBuf,
        #[arg(help = "JSON outline file")]
        outline: PathBuf,
    },
    #[command(about = "Add one bookmark to the outline")]
    Add {
        #[arg(help = "Input PDF file")]
        input: PathBuf,
        #[arg(long, help = "Bookmark title")]
        title: String,
        #[arg(long, help = "Target page (1-indexed)")]
        page: u32,
        #[arg(long, help = "Index path of the parent entry, e.g. 0.1", default_value = "")]
        parent: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&settings.log_filter);

    match run(cli, settings) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Returns whether the command succeeded from the user's point of view.
fn run(cli: Cli, settings: Settings) -> Result<bool> {
    let output_dir = cli.output_dir.unwrap_or(settings.output_dir);
    let executor = Executor::with_defaults(Arc::new(TerminalFeedback { quiet: cli.quiet }));
    let host = ToolHost::new(settings.readiness);
    let mut session = Session::new();
    let mut sink = DirectorySink::new(&output_dir);

    let operation = match cli.command {
        Commands::Flatten { input } => {
            if !open(&executor, &mut session, &input)? {
                return Ok(false);
            }
            Operation::Flatten
        }
        Commands::ImagesToPdf { images } => {
            session.select_files(collect_inputs(&images)?);
            Operation::ImagesToPdf
        }
        Commands::Zip { files } => {
            session.select_files(collect_inputs(&files)?);
            Operation::FilesToZip
        }
        Commands::Merge { inputs } => {
            session.select_files(collect_inputs(&inputs)?);
            Operation::Merge
        }
        Commands::Bookmarks { action } => match action {
            BookmarkCommands::Show { input } => {
                if !open(&executor, &mut session, &input)? {
                    return Ok(false);
                }
                let editor = host.mount(BookmarkEditor::new(), &session)?;
                let json = serde_json::to_string_pretty(editor.tool().entries())?;
                println!("{}", json);
                return Ok(true);
            }
            BookmarkCommands::Apply { input, outline } => {
                if !open(&executor, &mut session, &input)? {
                    return Ok(false);
                }
                let raw = std::fs::read_to_string(&outline)
                    .with_context(|| format!("cannot read outline {}", outline.display()))?;
                let entries: Vec<Bookmark> = serde_json::from_str(&raw)
                    .with_context(|| format!("invalid outline {}", outline.display()))?;
                Operation::ApplyBookmarks(entries)
            }
            BookmarkCommands::Add {
                input,
                title,
                page,
                parent,
            } => {
                if !open(&executor, &mut session, &input)? {
                    return Ok(false);
                }
                let parent = bookmarks::parse_path(&parent)?;
                let mut editor = host.mount(BookmarkEditor::new(), &session)?;
                editor.tool_mut().add(&parent, Bookmark::new(title, page))?;
                let entries = editor.tool().entries().to_vec();
                editor.unmount();
                Operation::ApplyBookmarks(entries)
            }
        },
    };

    let outcome = executor.run(&operation, &mut session, &mut sink);
    match &outcome {
        Outcome::Delivered { size, .. } => {
            if let Some(path) = sink.saved().last() {
                println!("Saved {} ({} bytes)", path.display(), size);
            }
        }
        Outcome::Skipped(_) => {}
        Outcome::Rejected => eprintln!("Another operation is already running"),
        Outcome::Failed(kind) => tracing::debug!(?kind, "operation failed"),
    }
    Ok(outcome.is_success())
}

/// Load `path` as the active document. Returns `false` when the file could not
/// be parsed; the user has already been alerted.
fn open(executor: &Executor, session: &mut Session, path: &Path) -> Result<bool> {
    let file = InputFile::from_path(path)?;
    if executor.open_document(session, &file).is_err() {
        return Ok(false);
    }
    session.select_files(vec![file]);
    Ok(true)
}
