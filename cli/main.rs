#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Instant;

use screenrisk::data::{load_submissions, save_assessments};
use screenrisk::model::{FeatureTerm, ModelArtifact};
use screenrisk::{RawSubmission, Scorer};

/// Where the trained artifact lives unless `--model` says otherwise.
const DEFAULT_MODEL_PATH: &str = "models/calibrated_lr.toml";

#[derive(Args)]
pub struct ModelArgs {
    /// Path to the trained model artifact (.toml)
    #[arg(long, default_value = DEFAULT_MODEL_PATH)]
    pub model: PathBuf,

    /// Override the risk threshold stored in the model (0..=1)
    #[arg(long, value_name = "P")]
    pub threshold: Option<f64>,
}

#[derive(Args)]
pub struct ScoreArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// JSON file holding one submission object; reads stdin when omitted
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,
}

#[derive(Args)]
pub struct BatchArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// TSV file with one submission per row and a header naming the columns
    #[arg(value_name = "INPUT_TSV")]
    pub input: PathBuf,

    /// Where to write the assessments
    #[arg(long, default_value = "assessments.tsv")]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Path to the trained model artifact (.toml)
    #[arg(long, default_value = DEFAULT_MODEL_PATH)]
    pub model: PathBuf,
}

#[derive(Parser)]
#[command(
    name = "screenrisk",
    about = "Score screening questionnaires with a pre-trained logistic-regression model",
    long_about = "Loads a trained model artifact once, validates each submission against the \
                 schema the model was trained on, and returns a probability, a risk label and \
                 a disclaimer. Not a diagnostic tool."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a single JSON submission
    #[command(about = "Score one submission (outputs: JSON on stdout)")]
    Score(ScoreArgs),

    /// Score every row of a TSV file
    #[command(about = "Score a TSV of submissions (outputs: assessments.tsv)")]
    Batch(BatchArgs),

    /// Describe a model artifact
    #[command(about = "Print the schema, threshold and vocabularies of a model")]
    Inspect(InspectArgs),

    /// Display version and build information
    #[command(about = "Display version and build information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Score(args)) => score(args),
        Some(Commands::Batch(args)) => batch(args),
        Some(Commands::Inspect(args)) => inspect(args),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => match Cli::command().print_help() {
            Ok(()) => {
                println!();
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Loads the artifact exactly once. Any failure here ends the process before a
/// single submission is looked at.
fn load_scorer(args: &ModelArgs) -> Result<Scorer, Box<dyn std::error::Error>> {
    let model = ModelArtifact::load(&args.model).map_err(|e| {
        format!(
            "Could not load model from '{}': {e}. A trained model artifact is required before any submission can be scored.",
            args.model.display()
        )
    })?;
    let scorer = Scorer::new(Arc::new(model));
    Ok(match args.threshold {
        Some(threshold) => scorer.with_threshold(threshold)?,
        None => scorer,
    })
}

fn score(args: ScoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    let scorer = load_scorer(&args.model)?;

    let bytes = match &args.input {
        Some(path) => fs::read(path)?,
        None => {
            let mut buffer = Vec::new();
            io::stdin().read_to_end(&mut buffer)?;
            buffer
        }
    };

    // A malformed submission, invalid UTF-8 included, is still an answer.
    let response = scorer.handle_parsed(&RawSubmission::from_json_slice(&bytes));

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &response)?;
    writeln!(out)?;
    Ok(())
}

fn batch(args: BatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let scorer = load_scorer(&args.model)?;
    let rows = load_submissions(&args.input)?;

    let start = Instant::now();
    let responses = scorer.handle_rows(&rows);
    let rejected = responses.iter().filter(|r| r.is_error()).count();
    log::info!(
        "Scored {} submissions in {:.2?} ({} rejected)",
        responses.len(),
        start.elapsed(),
        rejected
    );

    save_assessments(&args.output, &responses)?;
    println!("Assessments saved to: {}", args.output.display());
    Ok(())
}

fn inspect(args: InspectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let model = ModelArtifact::load(&args.model)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    describe_model(&mut out, &model, &args.model)?;
    out.flush()?;
    Ok(())
}

fn describe_model<W: Write>(out: &mut W, model: &ModelArtifact, path: &Path) -> io::Result<()> {
    writeln!(out, "Model:      {} ({})", model.metadata.name, path.display())?;
    writeln!(out, "Schema:     {}", model.metadata.schema)?;
    writeln!(out, "Link:       {:?}", model.config.link_function)?;
    writeln!(out, "Threshold:  {}", model.config.threshold)?;
    match &model.calibration {
        Some(c) => writeln!(out, "Calibrated: slope {}, offset {}", c.slope, c.offset)?,
        None => writeln!(out, "Calibrated: no")?,
    }
    writeln!(out, "Intercept:  {}", model.coefficients.intercept)?;
    writeln!(out, "Columns:")?;
    for term in &model.coefficients.terms {
        match term {
            FeatureTerm::Numeric {
                column,
                coefficient,
                ..
            } => writeln!(out, "  {column:<16} numeric      {coefficient}")?,
            FeatureTerm::Categorical { column, .. } => {
                let vocabulary = model.vocabulary(column).unwrap_or_default().join(", ");
                writeln!(out, "  {column:<16} categorical  [{vocabulary}]")?
            }
        }
    }
    Ok(())
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("SCREENRISK_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("screenrisk {version}");
    if build_timestamp > 0 {
        println!("Built at unix time {build_timestamp}");
    }
}
