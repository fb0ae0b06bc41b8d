//! Command-line front end: thin routing over the library.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lexis::epub::EpubExtractor;
use lexis::resources::DownloadStatus;
use lexis::{
    AnalysisConfig, AnalysisResult, BookSource, CalibreLibrary, ExportDocument, JobOutcome, JobQueue, NlpPipeline,
    PipelineContext, ResourcePaths,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "lexis")]
#[command(about = "Find the hard vocabulary in a book")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a plain-text or EPUB file
    Analyze(AnalyzeArgs),
    /// List the books in a Calibre library
    Library {
        /// Calibre library directory (the one holding metadata.db)
        path: PathBuf,
    },
    /// Analyze a book from a Calibre library
    AnalyzeBook(AnalyzeBookArgs),
    /// Inspect or download the NLP model and dictionary
    Resources {
        #[command(subcommand)]
        action: ResourceAction,
    },
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Text or .epub file
    file: PathBuf,

    #[arg(long, default_value_t = 0)]
    book_id: i64,

    #[command(flatten)]
    analysis: AnalysisArgs,

    /// Write the full result as JSON to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AnalyzeBookArgs {
    library: PathBuf,

    book_id: i64,

    #[command(flatten)]
    analysis: AnalysisArgs,

    /// Write a vocabulary export to this file
    #[arg(short, long)]
    export: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AnalysisArgs {
    /// Words rarer than this frequency are hard (overrides the config file)
    #[arg(short, long)]
    threshold: Option<f32>,

    /// JSON analysis config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the result as JSON instead of a table
    #[arg(long)]
    json: bool,
}

impl AnalysisArgs {
    fn load_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_json_file(path)?,
            None => AnalysisConfig::default(),
        };
        if let Some(threshold) = self.threshold {
            config.rarity_threshold = threshold;
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
pub enum ResourceAction {
    /// Show which resources are installed
    Status,
    /// Download missing resources
    Download,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Analyze(args) => run_analyze(args).await,
            Commands::Library { path } => run_library(&path),
            Commands::AnalyzeBook(args) => run_analyze_book(args).await,
            Commands::Resources { action } => run_resources(action),
        }
    }
}

async fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let config = args.analysis.load_config()?;
    let text = read_text(&args.file)?;
    let result = analyze(config, args.book_id, text).await?;

    if let Some(output) = &args.output {
        std::fs::write(output, serde_json::to_string_pretty(&result)?)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        tracing::info!("Wrote result to {}", output.display());
    }
    print_result(&result, args.analysis.json)
}

async fn run_analyze_book(args: AnalyzeBookArgs) -> Result<()> {
    let config = args.analysis.load_config()?;
    let library = CalibreLibrary::open(&args.library)?;
    let book = library
        .book(args.book_id)?
        .ok_or_else(|| anyhow!("No book with id {} in {}", args.book_id, args.library.display()))?;
    let text = library.book_text(book.id)?;
    tracing::info!(
        "\"{}\" by {}: {} chapters, {} words",
        book.title,
        book.author,
        text.chapter_count,
        text.word_count
    );

    let result = analyze(config, book.id, text.text).await?;

    if let Some(path) = &args.export {
        let mut doc = ExportDocument::now();
        doc.add_library_book(&book, &result);
        doc.write_to(path)?;
    }
    print_result(&result, args.analysis.json)
}

fn run_library(path: &Path) -> Result<()> {
    let library = CalibreLibrary::open(path)?;
    for book in library.books()? {
        let epub = if book.has_epub { "" } else { "  (no EPUB)" };
        println!("{:>6}  {} - {}{}", book.id, book.title, book.author, epub);
    }
    Ok(())
}

fn run_resources(action: ResourceAction) -> Result<()> {
    let paths = ResourcePaths::from_env();
    match action {
        ResourceAction::Status => {
            let status = paths.status();
            println!("Resource directory: {}", paths.root().display());
            println!(
                "GLiNER model:  {} ({})",
                availability(status.gliner_available),
                status.gliner_path.display()
            );
            println!(
                "SymSpell dict: {} ({})",
                availability(status.symspell_available),
                status.symspell_path.display()
            );
        }
        ResourceAction::Download => {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")?
                    .progress_chars("#>-"),
            );
            let on_progress = |status: DownloadStatus| {
                if let DownloadStatus::Downloading { file, progress, total } = status {
                    if total > 0 {
                        bar.set_length(total);
                    }
                    bar.set_position(progress);
                    bar.set_message(file);
                }
            };
            paths.ensure_symspell_dict(on_progress)?;
            paths.ensure_gliner_model(on_progress)?;
            bar.finish_with_message("resources ready");
        }
    }
    Ok(())
}

fn availability(available: bool) -> &'static str {
    if available {
        "installed"
    } else {
        "missing"
    }
}

fn read_text(path: &Path) -> Result<String> {
    let is_epub = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("epub"));
    if is_epub {
        Ok(EpubExtractor::new().extract(path)?.full_text)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

/// Run one job through the queue, rendering its progress events.
async fn analyze(config: AnalysisConfig, book_id: i64, text: String) -> Result<AnalysisResult> {
    let paths = ResourcePaths::from_env();
    if !paths.status().all_available() {
        tracing::warn!("Resources are missing; run `lexis resources download` first");
    }
    let threshold = config.rarity_threshold;
    let context = PipelineContext::from_resources(&paths, &config).context("Failed to load NLP resources")?;
    let queue = JobQueue::new(Arc::new(NlpPipeline::new(Arc::new(context), config)));
    let mut handle = queue.submit(book_id, text, threshold);

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("#>-"),
    );
    while let Some(event) = handle.next_event().await {
        bar.set_position(event.progress as u64);
        bar.set_message(format!("{}: {}", event.stage().label(), event.update.detail()));
    }

    match handle.outcome().await {
        JobOutcome::Completed(result) => {
            bar.finish_with_message(format!("{} hard words", result.hard_words.len()));
            Ok(result)
        }
        JobOutcome::Failed(err) => {
            bar.abandon_with_message("failed");
            Err(err).context("Analysis failed")
        }
        JobOutcome::Cancelled => {
            bar.abandon_with_message("cancelled");
            bail!("Analysis of book {} was cancelled", book_id)
        }
    }
}

fn print_result(result: &AnalysisResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!(
        "{} hard words from {} words ({} candidates, {} names filtered)",
        result.hard_words.len(),
        result.word_count,
        result.stats.total_candidates,
        result.stats.filtered_by_ner.len()
    );
    for (rank, word) in result.hard_words.iter().enumerate() {
        println!(
            "{:>4}. {:<20} {:>10.2e}  x{}",
            rank + 1,
            word.word,
            word.frequency_score,
            word.count
        );
        if let Some(context) = word.contexts.first() {
            println!("      {}", context);
        }
    }
    Ok(())
}
