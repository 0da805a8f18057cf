use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, subscriber::set_global_default, Level};
use tracing_subscriber::EnvFilter;

use rulesketch::{dedup_records, io, Deduplicator, Distiller, RulesketchConfig, Verdict};

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact()
        .finish();

    let _ = set_global_default(subscriber);
}

fn main() {
    let opts = Opts::parse();
    init_tracing(opts.verbose.saturating_add(1).saturating_sub(opts.quiet));
    if let Err(e) = run(opts) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(opts: Opts) -> anyhow::Result<()> {
    match opts.command {
        Command::Distill {
            results_dir,
            output,
            seed_store,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let mut dedup = Deduplicator::new(config.dedup)?;
            if let Some(store) = seed_store {
                let texts = io::load_seed_store(&store, &config.distill.text_field)
                    .with_context(|| format!("loading seed store {}", store.display()))?;
                let added = dedup.seed(texts.iter().map(String::as_str));
                info!(added, "seeded deduplicator");
            }
            let records = io::load_batch_dir(&results_dir)
                .with_context(|| format!("reading batches from {}", results_dir.display()))?;
            let mut distiller = Distiller::with_deduplicator(dedup, config.distill)?;
            let database = distiller.distill(records)?;
            io::write_json(&output, &database)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "{} rules from {} domains ({} multi-source) -> {}",
                database.statistics.total_rules,
                database.statistics.unique_domains,
                database.statistics.multi_source_rules,
                output.display()
            );
        }
        Command::Dedup {
            input,
            output,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let mut dedup = Deduplicator::new(config.dedup)?;
            let classifier = config.classifier.build();
            let records = io::load_records_file(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let outcome = dedup_records(
                records,
                &mut dedup,
                classifier.as_ref(),
                &config.distill.text_field,
            );
            io::write_json(&output, &outcome)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "unique: {}, duplicates: {}, rejected: {}",
                outcome.unique.len(),
                outcome.duplicates.len(),
                outcome.rejected.len()
            );
        }
        Command::Check { texts, config } => {
            let config = load_config(config.as_deref())?;
            let mut dedup = Deduplicator::new(config.dedup)?;
            for (i, text) in texts.iter().enumerate() {
                let key = format!("#{}", i + 1);
                let verdict = dedup.is_duplicate(text, Some(key.as_str()));
                let line = match verdict {
                    Verdict::Unique { .. } => "UNIQUE".to_owned(),
                    Verdict::Exact { entry } => format!(
                        "DUPLICATE of {} (exact)",
                        dedup.key(entry).unwrap_or("?")
                    ),
                    Verdict::Near { entry, score } => format!(
                        "DUPLICATE of {} (score {score})",
                        dedup.key(entry).unwrap_or("?")
                    ),
                };
                println!("{key}: {line}");
            }
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RulesketchConfig> {
    match path {
        Some(path) => RulesketchConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(RulesketchConfig::default()),
    }
}

#[derive(Parser)]
#[command(version, about = "Near-duplicate detection and distillation for rule texts")]
pub struct Opts {
    /// Increase verbosity (-v, -vv). Default INFO.
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Decrease verbosity (-q).
    #[arg(short = 'q', action = clap::ArgAction::Count, global = true)]
    pub quiet: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Merge every batch in a directory into one rules database
    Distill {
        /// Directory of *.json batches
        results_dir: PathBuf,
        /// Output database path
        output: PathBuf,
        /// JSONL store of already known rules
        #[arg(long)]
        seed_store: Option<PathBuf>,
        /// TOML configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Split one record file into unique, duplicate and rejected records
    Dedup {
        /// Batch file (array or {"rules": [...]})
        input: PathBuf,
        /// Output path
        output: PathBuf,
        /// TOML configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Check texts against each other, in order
    Check {
        /// Texts to check
        #[arg(required = true)]
        texts: Vec<String>,
        /// TOML configuration
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
