//! `schemalens` command-line interface
//!
//! Walks the given files and directories, runs the analysis pipeline and
//! prints the report as JSON on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use schemalens_service::detection::SourceContent;
use schemalens_service::{
    DataDictionaryService, PipelineConfig, SourceFile, create_dictionary_service,
    load_pipeline_config,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Schema analysis for structured-data files
#[derive(Debug, Parser)]
#[command(name = "schemalens", version, about)]
struct Cli {
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Detect formats, infer types and relationships
    Analyze {
        /// Files or directories to analyze
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Pipeline configuration (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Skip type inference
        #[arg(long)]
        no_enhance: bool,

        /// Minimum relationship confidence
        #[arg(long)]
        threshold: Option<f64>,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },
}

fn init_logging(cli: &Cli) {
    let default = if cli.quiet {
        "error"
    } else if cli.verbose {
        "schemalens=debug,schemalens_service=debug"
    } else {
        "schemalens=info,schemalens_service=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn display_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).ok().filter(|p| !p.as_os_str().is_empty());
    relative.unwrap_or(path).to_string_lossy().replace('\\', "/")
}

fn source_file(root: &Path, path: &Path, max_buffered_bytes: usize) -> Result<SourceFile> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("cannot stat {}", path.display()))?
        .len();
    let content = if size > max_buffered_bytes as u64 {
        let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        SourceContent::Stream(Box::new(file))
    } else {
        SourceContent::Buffer(std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?)
    };
    Ok(SourceFile {
        path: display_path(root, path),
        content,
    })
}

fn collect_files(paths: &[PathBuf], max_buffered_bytes: usize) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    for root in paths {
        if root.is_file() {
            let parent = root.parent().unwrap_or_else(|| Path::new(""));
            files.push(source_file(parent, root, max_buffered_bytes)?);
            continue;
        }
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = entry.with_context(|| format!("cannot walk {}", root.display()))?;
            if entry.file_type().is_file() {
                files.push(source_file(root, entry.path(), max_buffered_bytes)?);
            }
        }
    }
    Ok(files)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let Command::Analyze {
        paths,
        config,
        no_enhance,
        threshold,
        pretty,
    } = cli.command;

    let mut pipeline_config = match &config {
        Some(path) => load_pipeline_config(path)?,
        None => PipelineConfig::default(),
    };
    if no_enhance {
        pipeline_config.enhance_types = false;
    }
    if let Some(threshold) = threshold {
        pipeline_config.confidence_threshold = threshold;
    }
    pipeline_config.validate()?;

    let max_buffered = pipeline_config.max_buffered_bytes;
    let files = tokio::task::spawn_blocking(move || collect_files(&paths, max_buffered)).await??;
    tracing::info!(files = files.len(), "collected input files");

    let service = create_dictionary_service(pipeline_config)?;
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling");
            on_interrupt.cancel();
        }
    });

    let report = service.analyze_files(files, cancel).await?;
    let json = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");
    Ok(())
}
