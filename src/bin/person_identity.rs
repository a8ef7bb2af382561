//! person-identity CLI
//!
//! Drives the review cycle against a data directory:
//!
//! ```text
//! person-identity init
//! person-identity bootstrap generate     # writes out/person_alias_map_bootstrap.csv
//! # ... fill in the decision column ...
//! person-identity bootstrap apply        # appends accepted aliases to the ledger
//! person-identity status
//! ```
//!
//! Exit codes: 0 on success, 2 when a required input is missing, 1 for any
//! other failure.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use person_identity::{
    apply, generate, init_ledger, status, ArtifactKind, IdentityError, RunContext, RunPaths,
};

#[derive(Parser, Debug)]
#[command(name = "person-identity")]
#[command(about = "Resolve competitor name spellings to stable person identities")]
struct Cli {
    /// Data directory holding out/ and overrides/
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Resolver configuration (default: <root>/resolver.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Observation table (default: <root>/out/observations.csv)
    #[arg(long, global = true)]
    observations: Option<PathBuf>,

    /// Alias ledger (default: <root>/overrides/person_aliases.csv)
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Frozen marker (default: <root>/overrides/person_aliases.lock)
    #[arg(long, global = true)]
    frozen_marker: Option<PathBuf>,

    /// Event override table (default: <root>/overrides/overrides.toml)
    #[arg(long, global = true)]
    overrides: Option<PathBuf>,

    /// Quarantine table (default: <root>/out/persons_quarantine.csv)
    #[arg(long, global = true)]
    quarantine: Option<PathBuf>,

    /// Print summaries as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty alias ledger
    Init,

    /// Report ledger counts and frozen state
    Status,

    /// Exact-key clusters
    Bootstrap {
        #[command(subcommand)]
        step: Step,
    },

    /// Surname-bucket fuzzy suggestions
    Fuzzy {
        #[command(subcommand)]
        step: Step,
    },

    /// Names with no ledger entry
    Unmapped {
        #[command(subcommand)]
        step: Step,
    },

    /// Splits of quarantined identities
    Quarantine {
        #[command(subcommand)]
        step: Step,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Step {
    /// Write the review artifact
    Generate,
    /// Append reviewed decisions to the ledger
    Apply,
}

impl Cli {
    fn paths(&self) -> RunPaths {
        let mut paths = RunPaths::under(&self.root);
        let flags = [
            (&self.config, &mut paths.config),
            (&self.observations, &mut paths.observations),
            (&self.ledger, &mut paths.ledger),
            (&self.frozen_marker, &mut paths.frozen_marker),
            (&self.overrides, &mut paths.overrides),
            (&self.quarantine, &mut paths.quarantine),
        ];
        for (flag, slot) in flags {
            if let Some(path) = flag {
                slot.clone_from(path);
            }
        }
        paths
    }
}

fn print<T: serde::Serialize + std::fmt::Display>(value: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{value}");
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let ctx = RunContext::load(cli.paths()).context("failed to load run context")?;

    let (kind, step) = match cli.command {
        Command::Init => {
            let path = init_ledger(&ctx)?;
            println!("initialised {}", path.display());
            return Ok(());
        }
        Command::Status => return print(&status(&ctx)?, cli.json),
        Command::Bootstrap { step } => (ArtifactKind::Bootstrap, step),
        Command::Fuzzy { step } => (ArtifactKind::Fuzzy, step),
        Command::Unmapped { step } => (ArtifactKind::Unmapped, step),
        Command::Quarantine { step } => (ArtifactKind::Quarantine, step),
    };

    match step {
        Step::Generate => print(&generate(&ctx, kind)?, cli.json),
        Step::Apply => print(&apply(&ctx, kind, Utc::now())?, cli.json),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let identity = err.chain().find_map(|e| e.downcast_ref::<IdentityError>());
            if let Some(identity) = identity {
                eprintln!("hint: {}", identity.remediation());
                if identity.is_missing_input() {
                    return ExitCode::from(2);
                }
            }
            ExitCode::FAILURE
        }
    }
}
