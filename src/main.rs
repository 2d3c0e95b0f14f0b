//! actionlens CLI - find server actions and the calls that reach them

use actionlens::config::{default_config_path, load_config, write_config, ActionLensConfig};
use actionlens::correlate::{correlate_extracted, ChasingOracle, PassTracker, ResolutionOracle};
use actionlens::exclude::FileExclusion;
use actionlens::extract::{
    extract_call_sites_in, extract_definitions_in, is_supported_path, ActionDefinitionSpan,
    CallCandidate, FileExtraction, SourceDialect,
};
use actionlens::ui::{self, CallRow, DefinitionRow, ScanProgress};
use actionlens::workspace::{document_of, WorkspaceNavigator};
use actionlens::{CorrelationResult, LineIndex, OffsetRange, PassStats, RuntimeControls};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "actionlens")]
#[command(version = "0.1.0")]
#[command(about = "Find server actions and verify the call sites that reach them")]
#[command(long_about = r#"
actionlens reads TypeScript/JavaScript sources and reports:
  • async functions marked with a "use server" directive
  • call sites, form actions and hook arguments that resolve to them,
    across imports and re-exports

Example usage:
  actionlens scan --path ./src
  actionlens scan --path app/page.tsx --json
  actionlens definitions app/actions.ts
  actionlens init
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Correlate every supported file under a path
    Scan {
        /// File or directory to scan
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Config file (defaults to actionlens.toml in the scanned directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Resolve without concurrency, time or count bounds
        #[arg(long)]
        legacy: bool,

        /// Resolutions in flight at once
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Per-file admission budget in milliseconds
        #[arg(long)]
        budget_ms: Option<u64>,

        /// Per-resolution timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Resolutions admitted per file
        #[arg(long)]
        max_resolutions: Option<usize>,
    },

    /// List the action definitions of one file
    Definitions {
        file: PathBuf,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the unverified call candidates of one file
    Calls {
        file: PathBuf,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default actionlens.toml
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Serialize)]
struct FileReport {
    path: String,
    definitions: Vec<DefinitionReport>,
    calls: Vec<CallReport>,
    stats: PassStats,
}

#[derive(Serialize)]
struct DefinitionReport {
    name: String,
    body: OffsetRange,
    line: u32,
    column: u32,
}

#[derive(Serialize)]
struct CallReport {
    kind: &'static str,
    callee: Option<String>,
    range: OffsetRange,
    line: u32,
    column: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Scan {
            path,
            config,
            json,
            legacy,
            max_concurrent,
            budget_ms,
            timeout_ms,
            max_resolutions,
        } => {
            let root = if path.is_dir() {
                path.clone()
            } else {
                path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."))
            };
            let config_path = config.unwrap_or_else(|| root.join(default_config_path()));
            let mut settings = load_config(Some(&config_path))?.unwrap_or_default();

            let bounds = &mut settings.bounds;
            if let Some(n) = max_concurrent {
                bounds.max_concurrent = n;
            }
            if let Some(ms) = budget_ms {
                bounds.per_pass_budget_ms = ms;
            }
            if let Some(ms) = timeout_ms {
                bounds.resolve_timeout_ms = ms;
            }
            if let Some(n) = max_resolutions {
                bounds.max_resolutions = n;
            }

            scan(&path, &root, &settings, legacy, json).await?;
        }

        Commands::Definitions { file, json } => {
            let source = std::fs::read_to_string(&file)?;
            let definitions = extract_definitions_in(&source, SourceDialect::from_path(&file));
            let lines = LineIndex::new(&source);

            if json {
                let report: Vec<_> = definitions.iter().map(|d| definition_report(d, &lines)).collect();
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if definitions.is_empty() {
                ui::info("No actions in", &file.display().to_string());
            } else {
                println!("{}", ui::definition_table(definition_rows(&definitions, &lines)));
            }
        }

        Commands::Calls { file, json } => {
            let source = std::fs::read_to_string(&file)?;
            let candidates = extract_call_sites_in(&source, SourceDialect::from_path(&file));
            let lines = LineIndex::new(&source);

            if json {
                let report: Vec<_> = candidates.iter().map(|c| call_report(c, &lines)).collect();
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if candidates.is_empty() {
                ui::info("No call candidates in", &file.display().to_string());
            } else {
                let rows = candidates.iter().map(|c| call_row(c, &lines)).collect();
                println!("{}", ui::call_table(rows));
            }
        }

        Commands::Init { force } => {
            let path = default_config_path();
            write_config(&path, &ActionLensConfig::default(), force)?;
            ui::success(&format!("Wrote {}", path.display()));
        }
    }

    Ok(())
}

async fn scan(path: &Path, root: &Path, settings: &ActionLensConfig, legacy: bool, json: bool) -> anyhow::Result<()> {
    let started = Instant::now();
    let exclusion = Arc::new(FileExclusion::new(root, &settings.exclude));
    let files = collect_files(path, exclusion)?;
    tracing::info!("Scanning {} files under {}", files.len(), path.display());

    let navigator = WorkspaceNavigator::new(root).with_aliases(settings.aliases.clone());
    let oracle: Arc<dyn ResolutionOracle> =
        Arc::new(ChasingOracle::new(navigator).with_max_hops(settings.max_hops));

    let tracker = Arc::new(PassTracker::new());
    let shutdown = CancellationToken::new();
    {
        let (tracker, shutdown) = (tracker.clone(), shutdown.clone());
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling running passes");
                shutdown.cancel();
                tracker.cancel_all();
            }
        });
    }

    if !json {
        ui::header(&format!("Scanning {}", path.display()));
        if legacy {
            ui::info("Mode", "legacy (unbounded)");
        }
    }
    let progress = (!json).then(|| ScanProgress::new(files.len()));

    let mut reports = Vec::new();
    let mut totals = PassStats::default();
    let mut interrupted = false;

    for file in &files {
        if shutdown.is_cancelled() {
            interrupted = true;
            break;
        }
        let display = file.strip_prefix(root).unwrap_or(file).display().to_string();
        if let Some(progress) = &progress {
            progress.start_file(&display);
        }

        let source = match tokio::fs::read_to_string(file).await {
            Ok(source) => source,
            Err(e) => {
                tracing::debug!("Skipping unreadable file {}: {}", file.display(), e);
                continue;
            }
        };
        let extraction = FileExtraction::from_source(&source, SourceDialect::from_path(file));
        if extraction.is_empty() {
            if let Some(progress) = &progress {
                progress.finish_file();
            }
            continue;
        }

        let document = document_of(file);
        let ticket = tracker.begin(&document);
        let controls = (!legacy).then(|| {
            RuntimeControls::new()
                .with_bounds(settings.bounds)
                .with_cancellation(ticket.token())
        });
        let result = correlate_extracted(&source, &extraction, &document, oracle.clone(), controls).await;
        tracker.finish(&ticket);
        interrupted |= result.stats.cancelled;

        accumulate(&mut totals, &result.stats);
        let report = file_report(display, &source, &extraction, &result);
        if let Some(progress) = &progress {
            progress.finish_file();
            if !report.definitions.is_empty() || !report.calls.is_empty() {
                print_report(progress, &report, &source, &extraction, &result);
            }
        }
        reports.push(report);

        if interrupted {
            break;
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    let definitions: usize = reports.iter().map(|r| r.definitions.len()).sum();
    let calls: usize = reports.iter().map(|r| r.calls.len()).sum();
    if let Some(progress) = &progress {
        progress.finish_with_summary(started.elapsed(), reports.len(), definitions, calls);
    }

    ui::section("Resolution");
    println!(
        "{}",
        ui::stats_table(&[
            ("Candidates", totals.candidates.to_string()),
            ("Entry points", totals.unconditional.to_string()),
            ("Same-file", totals.short_circuited.to_string()),
            ("Filtered", totals.filtered.to_string()),
            ("Resolved", totals.admitted.to_string()),
            ("Confirmed", totals.confirmed.to_string()),
            ("Timed out", totals.timed_out.to_string()),
            ("Failed", totals.failed.to_string()),
            ("Over budget", totals.skipped.to_string()),
        ])
    );
    if interrupted {
        ui::warn("Scan interrupted; results are partial");
    }

    Ok(())
}

/// Supported source files under `path`, sorted, honoring ignore files and
/// exclusion patterns
fn collect_files(path: &Path, exclusion: Arc<FileExclusion>) -> anyhow::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        anyhow::bail!("Path does not exist: {}", path.display());
    }

    let walker = ignore::WalkBuilder::new(path)
        .hidden(false)
        .git_ignore(true)
        .require_git(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !exclusion.is_excluded(entry.path(), is_dir)
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        let file = entry.path();
        let is_file = entry.file_type().is_some_and(|t| t.is_file());
        if is_file && is_supported_path(file) {
            files.push(file.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn accumulate(totals: &mut PassStats, stats: &PassStats) {
    totals.candidates += stats.candidates;
    totals.unconditional += stats.unconditional;
    totals.short_circuited += stats.short_circuited;
    totals.filtered += stats.filtered;
    totals.admitted += stats.admitted;
    totals.skipped += stats.skipped;
    totals.confirmed += stats.confirmed;
    totals.rejected += stats.rejected;
    totals.timed_out += stats.timed_out;
    totals.aborted += stats.aborted;
    totals.failed += stats.failed;
    totals.budget_exhausted |= stats.budget_exhausted;
    totals.cancelled |= stats.cancelled;
}

fn file_report(path: String, source: &str, extraction: &FileExtraction, result: &CorrelationResult) -> FileReport {
    let lines = LineIndex::new(source);
    FileReport {
        path,
        definitions: extraction
            .definitions
            .iter()
            .map(|d| definition_report(d, &lines))
            .collect(),
        calls: verified_calls(extraction, result)
            .map(|c| call_report(c, &lines))
            .collect(),
        stats: result.stats.clone(),
    }
}

/// The candidate behind each verified call range
fn verified_calls<'a>(
    extraction: &'a FileExtraction,
    result: &'a CorrelationResult,
) -> impl Iterator<Item = &'a CallCandidate> + 'a {
    result
        .call_ranges
        .iter()
        .filter_map(|range| extraction.candidates.iter().find(|c| c.range == *range))
}

fn print_report(
    progress: &ScanProgress,
    report: &FileReport,
    source: &str,
    extraction: &FileExtraction,
    result: &CorrelationResult,
) {
    let lines = LineIndex::new(source);
    progress.println(format!(
        "\n{} {}  {} actions, {} calls",
        ui::Icons::FILE,
        report.path,
        report.definitions.len(),
        report.calls.len()
    ));
    let definitions = ui::definition_table(definition_rows(&extraction.definitions, &lines));
    if !definitions.is_empty() {
        progress.println(definitions);
    }
    let rows = verified_calls(extraction, result).map(|c| call_row(c, &lines)).collect();
    let calls = ui::call_table(rows);
    if !calls.is_empty() {
        progress.println(calls);
    }
}

fn definition_report(definition: &ActionDefinitionSpan, lines: &LineIndex<'_>) -> DefinitionReport {
    let anchor = definition.name_range.unwrap_or(definition.body);
    let (line, column) = lines.position(anchor.start);
    DefinitionReport {
        name: definition.name.to_string(),
        body: definition.body,
        line,
        column,
    }
}

fn call_report(candidate: &CallCandidate, lines: &LineIndex<'_>) -> CallReport {
    let (line, column) = lines.position(candidate.range.start);
    CallReport {
        kind: candidate.kind_label(),
        callee: candidate.callee_name().map(str::to_string),
        range: candidate.range,
        line,
        column,
    }
}

fn definition_rows(definitions: &[ActionDefinitionSpan], lines: &LineIndex<'_>) -> Vec<DefinitionRow> {
    definitions
        .iter()
        .map(|d| DefinitionRow {
            name: d.name.to_string(),
            body: lines.describe(d.body),
        })
        .collect()
}

fn call_row(candidate: &CallCandidate, lines: &LineIndex<'_>) -> CallRow {
    let callee = match (candidate.qualifier_name(), candidate.callee_name()) {
        (Some(qualifier), Some(name)) => format!("{}.{}", qualifier, name),
        (None, Some(name)) => name.to_string(),
        _ => ui::muted("-"),
    };
    CallRow {
        kind: candidate.kind_label().to_string(),
        callee,
        position: lines.describe(candidate.range),
    }
}
