//! pdfveil - Command-line interface
//!
//! Redacts text matching configured patterns from PDF content streams,
//! optionally painting opaque boxes over the removed glyph runs.

use std::path::PathBuf;
use std::process;

use clap::{Arg, ArgAction, Command};
use pdfveil::config::CensorConfig;
use pdfveil::pipeline::{Pipeline, RedactionJob};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();

    let log_level = matches
        .get_one::<String>("verbose")
        .map(String::as_str)
        .unwrap_or("info");
    init_logging(log_level);

    info!("🚀 pdfveil v{} - Starting...", env!("CARGO_PKG_VERSION"));

    let inputs: Vec<PathBuf> = matches
        .get_many::<String>("input")
        .unwrap_or_default()
        .map(PathBuf::from)
        .collect();
    let output = matches.get_one::<String>("output").map(PathBuf::from);
    let out_dir = matches.get_one::<String>("out-dir").map(PathBuf::from);
    let rules_path = matches
        .get_one::<String>("rules")
        .map(PathBuf::from)
        .unwrap_or_default();
    let force = matches.get_flag("force");
    let dry_run = matches.get_flag("dry-run");

    if inputs.len() > 1 && output.is_some() {
        error!("❌ --output accepts a single input; use --out-dir for batches");
        process::exit(1);
    }

    for input in &inputs {
        if !input.exists() {
            error!("❌ Input file does not exist: {}", input.display());
            process::exit(1);
        }
    }

    let config = match CensorConfig::from_file(&rules_path) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Failed to load rules file: {}", e);
            process::exit(1);
        }
    };
    info!("📋 Loaded {} censor rule(s)", config.rules.len());

    let jobs = match build_jobs(inputs, output, out_dir) {
        Ok(jobs) => jobs,
        Err(message) => {
            error!("❌ {}", message);
            process::exit(1);
        }
    };

    if !force && !dry_run {
        for job in &jobs {
            if job.output.exists() {
                error!("❌ Output file already exists: {}", job.output.display());
                error!("   Use --force to overwrite existing files");
                process::exit(1);
            }
        }
    }

    if dry_run {
        info!("🔍 Dry run mode - no files will be written");
    }

    let pipeline = Pipeline::new(config, dry_run);
    let start_time = std::time::Instant::now();
    let summary = pipeline.execute(jobs).await;
    let duration = start_time.elapsed();

    info!("📊 Processing Summary:");
    info!("   Documents: {} processed, {} failed", summary.processed, summary.failed);
    info!("   Total Time: {:.2?}", duration);

    if summary.failed > 0 {
        error!("❌ {} document(s) failed", summary.failed);
        process::exit(1);
    }
    info!("✅ Redaction completed successfully");
}

fn build_cli() -> Command {
    Command::new("pdfveil")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Selective redaction of PDF content streams")
        .long_about(
            "Removes text matching configured patterns from PDF page content \
             streams, including text drawn inside nested Form XObjects, and \
             paints opaque boxes over the removed glyph runs. Document \
             structure, images and vector graphics are preserved.",
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .action(ArgAction::Append)
                .help("Input PDF file path (repeatable for batches)")
                .required(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output PDF file path (single input only)")
                .conflicts_with("out-dir"),
        )
        .arg(
            Arg::new("out-dir")
                .long("out-dir")
                .value_name("DIR")
                .help("Directory for batch outputs, named after the inputs"),
        )
        .arg(
            Arg::new("rules")
                .short('r')
                .long("rules")
                .value_name("FILE")
                .help("Censor rules file (JSON/YAML)")
                .required(true),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .action(ArgAction::SetTrue)
                .help("Force overwrite existing output files"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Process documents without writing output"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .value_name("LEVEL")
                .value_parser(["error", "warn", "info", "debug", "trace"])
                .default_value("info")
                .help("Set logging verbosity"),
        )
}

fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!("pdfveil={}", level)))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

fn build_jobs(
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    out_dir: Option<PathBuf>,
) -> Result<Vec<RedactionJob>, String> {
    let mut jobs = Vec::with_capacity(inputs.len());
    for input in inputs {
        let output = if let Some(path) = &output {
            path.clone()
        } else if let Some(dir) = &out_dir {
            let name = input
                .file_name()
                .ok_or_else(|| format!("Input has no file name: {}", input.display()))?;
            dir.join(name)
        } else {
            let mut renamed = input.clone();
            renamed.set_extension("redacted.pdf");
            renamed
        };
        if output == input {
            return Err(format!(
                "Output would overwrite the input: {}",
                input.display()
            ));
        }
        jobs.push(RedactionJob { input, output });
    }
    Ok(jobs)
}
