use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keytrellis::analysis::FileAnalysis;
use keytrellis::config::AppConfig;
use keytrellis::key::describe;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "keytrellis",
    version,
    about = "Key and modulation finder for pitch-class duration profiles"
)]
struct Cli {
    /// Path to a TOML config file (defaults to the XDG config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the key(s) of segment files (directories are scanned recursively)
    Analyze {
        /// Segment files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// Weight kept by an observation when the key changes, in (0, 1]
        #[arg(long)]
        penalty: Option<f64>,

        /// Share of the winning path a key needs to be reported, in [0, 1]
        #[arg(long)]
        tolerance: Option<f64>,

        /// Score by duration instead of pitch-class presence
        #[arg(long)]
        no_flatten: bool,

        /// Profile to run (repeatable; default: config selection or all)
        #[arg(short, long = "profile")]
        profiles: Vec<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Score a single segment against all 24 keys
    Score {
        /// Twelve weights, C to B (rationals such as 1/4 are accepted)
        #[arg(num_args = 12, required = true, allow_hyphen_values = true)]
        weights: Vec<String>,

        /// Profile to score against
        #[arg(short, long, default_value = "temperley")]
        profile: String,

        /// Reduce the segment to pitch-class presence first
        #[arg(long)]
        flatten: bool,
    },

    /// List the available key profiles
    Profiles,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    let registry = config.registry().context("Invalid custom profile in config")?;

    match cli.command {
        Commands::Analyze { paths, jobs, penalty, tolerance, no_flatten, profiles, json } => {
            // CLI flags > config > defaults
            if let Some(p) = penalty {
                config.penalty = p;
            }
            if let Some(t) = tolerance {
                config.modulation_tolerance = t;
            }
            if no_flatten {
                config.flatten = false;
            }
            if !profiles.is_empty() {
                config.profiles = profiles;
            }

            let template = config
                .build_aggregator(&registry)
                .context("Invalid key finder configuration")?;
            let files = keytrellis::analysis::collect_segment_files(&paths)
                .context("Failed to collect segment files")?;
            if files.is_empty() {
                anyhow::bail!("No segment files found (looked for .json, .txt, .csv)");
            }

            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };
            let batch = keytrellis::analysis::analyze_files(&files, &template, workers)
                .context("Analysis failed")?;

            if json {
                let out = serde_json::to_string_pretty(&batch.analyses)
                    .context("Failed to serialize results")?;
                println!("{}", out);
            } else {
                for analysis in &batch.analyses {
                    print_analysis(analysis, cli.verbose > 0);
                }
                println!(
                    "Analysis complete: {} analyzed, {} failed",
                    batch.analyses.len(),
                    batch.failed
                );
            }
        }

        Commands::Score { weights, profile, flatten } => {
            let profile = registry
                .get(&profile)
                .with_context(|| format!("Unknown key profile: {}", profile))?;
            let segment = parse_weights(&weights)?;

            let scores = keytrellis::scorer::score_segment(&segment, profile, flatten);
            println!("Scores against {}:", profile.name());
            println!();
            println!("{:<10} {:>10}", "Key", "Score");
            println!("{}", "-".repeat(21));
            for (key, score) in keytrellis::scorer::ranked(&scores) {
                println!("{:<10} {:>10.3}", key.to_string(), score);
            }
        }

        Commands::Profiles => {
            println!("{:<24} {:<20} Templates (tonic first)", "Profile", "Aliases");
            println!("{}", "-".repeat(100));
            for profile in registry.profiles() {
                println!(
                    "{:<24} {:<20} major {}",
                    profile.name(),
                    registry.aliases(profile).join(", "),
                    format_template(profile.major())
                );
                println!("{:<45} minor {}", "", format_template(profile.minor()));
            }
        }
    }

    Ok(())
}

/// Print one file's detected keys, with per-profile votes when verbose.
fn print_analysis(analysis: &FileAnalysis, verbose: bool) {
    println!(
        "{}: {} ({}/{} profiles, {} of {} segments sounding)",
        analysis.path.display(),
        describe(&analysis.result.winner),
        analysis.result.agreement(),
        analysis.result.votes.len(),
        analysis.sounding,
        analysis.segments
    );

    for m in &analysis.modulations {
        println!(
            "    segment {:>4}: {} -> {}",
            m.segment,
            m.from.short_name(),
            m.to.short_name()
        );
    }

    if verbose {
        for vote in &analysis.result.votes {
            println!("    {:<24} {}", vote.profile, describe(&vote.keys));
        }
    }
}

/// Parse the `score` subcommand's twelve weights as one text segment.
fn parse_weights(weights: &[String]) -> Result<keytrellis::durations::Durations> {
    keytrellis::segments::parse_text(&weights.join(" "))
        .context("Invalid weights")?
        .into_iter()
        .next()
        .context("No weights given")
}

fn format_template(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{:.2}", v))
        .collect::<Vec<_>>()
        .join(" ")
}
