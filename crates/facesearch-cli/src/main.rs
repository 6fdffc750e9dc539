mod prompt;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use facesearch_aws::RekognitionCollection;
use facesearch_core::config::MATCHES_DIR;
use facesearch_core::{
    check_previous_matches, read_collection_handle, run, ConfigError, ExportError, Layout,
    ReturnMode, RunOptions, RunSummary, Settings, WorkflowConfig, WorkflowError,
};
use prompt::{Preset, Prompter, DATABASE_PROMPT, QUERY_PROMPT};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

const EXIT_MISSING_HANDLE: u8 = 2;
const EXIT_PREVIOUS_MATCHES: u8 = 3;
const FATAL_PAUSE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(
    name = "facesearch",
    about = "Find database photos containing the faces seen in query photos"
)]
struct Cli {
    /// Work folder holding Database, Query and Output subfolders
    #[arg(long, conflicts_with_all = ["query", "database"])]
    fixed_root: Option<PathBuf>,

    /// Folder of query images; matches are saved to its Matches subfolder
    #[arg(long)]
    query: Option<PathBuf>,

    /// Folder of database images to search through
    #[arg(long)]
    database: Option<PathBuf>,

    /// Settings preset
    #[arg(long, value_enum)]
    preset: Option<PresetArg>,

    /// Return every match or only the closest one (custom preset)
    #[arg(long, value_enum)]
    return_mode: Option<ReturnModeArg>,

    /// Minimum similarity, 0 to 100 (custom preset)
    #[arg(long)]
    threshold: Option<f32>,

    /// Faces indexed per database image (custom preset)
    #[arg(long)]
    max_faces: Option<u32>,

    /// Skip pauses and the final Enter prompt
    #[arg(long)]
    no_pause: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum PresetArg {
    Standard,
    Custom,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReturnModeArg {
    All,
    Best,
}

impl From<ReturnModeArg> for ReturnMode {
    fn from(arg: ReturnModeArg) -> Self {
        match arg {
            ReturnModeArg::All => ReturnMode::All,
            ReturnModeArg::Best => ReturnMode::BestOnly,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match execute(&cli) {
        Ok(code) => code,
        Err(err) => {
            println!("\n{err:#}");
            tracing::error!(error = %err, "facesearch failed");
            pause(cli.no_pause);
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli) -> Result<ExitCode> {
    let settings = Settings::from_env();
    let handle = match read_collection_handle(&settings.collection_file) {
        Ok(handle) => handle,
        Err(err) => {
            match &err {
                ConfigError::MissingHandle(_) => println!(
                    "You have no collection ID.\nPlease ask your administrator to issue you with one.\n"
                ),
                ConfigError::EmptyHandle(_) => println!(
                    "Your collection ID document is empty. Please ask your administrator.\n"
                ),
                ConfigError::Io { .. } => println!("{err}\n"),
            }
            tracing::error!(error = %err, "collection handle unavailable");
            pause(cli.no_pause);
            return Ok(ExitCode::from(EXIT_MISSING_HANDLE));
        }
    };

    let mut console = Prompter::new(io::stdin().lock(), io::stdout());

    let Some(layout) = resolve_layout(cli, &mut console)? else {
        return Ok(refuse_previous_matches(cli.no_pause));
    };
    let paths = layout.resolve(&settings.scratch_root);
    if previous_matches_present(&paths.output)? {
        return Ok(refuse_previous_matches(cli.no_pause));
    }

    let options = resolve_options(cli, &mut console)?;
    tracing::info!(?options, collection = %handle, "starting run");

    let collection = RekognitionCollection::connect(&settings.region)
        .context("failed to set up the face search client")?;
    let config = WorkflowConfig::new(handle, options, paths, &settings);

    let summary = match run(&collection, &config) {
        Ok(summary) => summary,
        Err(WorkflowError::Export(ExportError::PreviousMatches(_))) => {
            return Ok(refuse_previous_matches(cli.no_pause));
        }
        Err(err) => return Err(err.into()),
    };
    report(&summary, &config.paths.output);

    if !cli.no_pause {
        console.acknowledge(&format!(
            "\nAll matches have been saved into {}.\nPress Enter to quit.",
            config.paths.output.display()
        ))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Layout from flags, prompting for missing folders.
///
/// Returns `None` when the query folder still holds a previous run's matches,
/// so the user is told before being asked for the database folder.
fn resolve_layout<R: BufRead, W: Write>(
    cli: &Cli,
    console: &mut Prompter<R, W>,
) -> Result<Option<Layout>> {
    if let Some(root) = &cli.fixed_root {
        return Ok(Some(Layout::Fixed { root: root.clone() }));
    }

    let query = match &cli.query {
        Some(query) => query.clone(),
        None => console.directory(QUERY_PROMPT)?,
    };
    if previous_matches_present(&query.join(MATCHES_DIR))? {
        return Ok(None);
    }
    let database = match &cli.database {
        Some(database) => database.clone(),
        None => console.directory(DATABASE_PROMPT)?,
    };
    Ok(Some(Layout::UserPaths { query, database }))
}

/// Run options from flags, prompting for anything a custom run still needs.
fn resolve_options<R: BufRead, W: Write>(
    cli: &Cli,
    console: &mut Prompter<R, W>,
) -> Result<RunOptions> {
    let custom_flags =
        cli.return_mode.is_some() || cli.threshold.is_some() || cli.max_faces.is_some();
    let preset = match cli.preset {
        Some(PresetArg::Standard) if custom_flags => {
            bail!("--preset standard cannot be combined with --return-mode, --threshold or --max-faces")
        }
        Some(PresetArg::Standard) => Preset::Standard,
        Some(PresetArg::Custom) => Preset::Custom,
        None if custom_flags => Preset::Custom,
        None => console.preset()?,
    };
    if preset == Preset::Standard {
        return Ok(RunOptions::STANDARD);
    }

    let return_mode = match cli.return_mode {
        Some(mode) => mode.into(),
        None => console.return_mode()?,
    };
    let threshold = match cli.threshold {
        Some(threshold) => threshold,
        None => console.threshold()?,
    };
    let max_faces = match cli.max_faces {
        Some(max_faces) => max_faces,
        None => console.max_faces()?,
    };
    RunOptions::new(return_mode, threshold, max_faces).context("invalid run options")
}

/// Whether `output` still holds an earlier run's results.
///
/// Any other failure to inspect the folder is an error, not a refusal.
fn previous_matches_present(output: &Path) -> Result<bool> {
    match check_previous_matches(output) {
        Ok(()) => Ok(false),
        Err(ExportError::PreviousMatches(_)) => Ok(true),
        Err(err) => Err(err).context("cannot inspect the output folder"),
    }
}

fn refuse_previous_matches(no_pause: bool) -> ExitCode {
    println!(
        "\nThe matches from your previous session are still in the output folder,\n\
         Please move or delete them, then try again.\n"
    );
    pause(no_pause);
    ExitCode::from(EXIT_PREVIOUS_MATCHES)
}

fn report(summary: &RunSummary, output: &Path) {
    println!(
        "\n{} database images indexed ({} faces), {} queries searched, {} matches exported.",
        summary.indexed_images,
        summary.indexed_faces,
        summary.queries_searched,
        summary.matches_exported
    );
    if summary.skipped > 0 {
        println!("{} images could not be loaded.", summary.skipped);
    }
    if !summary.scratch_removed {
        println!("Some temporary files could not be deleted.");
    }
    tracing::info!(
        output = %output.display(),
        downsized = summary.downsized,
        matches_found = summary.matches_found,
        purge = ?summary.purge,
        "run complete"
    );
}

fn pause(no_pause: bool) {
    if !no_pause {
        std::thread::sleep(FATAL_PAUSE);
    }
}
