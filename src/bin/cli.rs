//! FOP Surface CLI
//!
//! Runs the surface job and inspects what it stored.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use fop_surface::prelude::*;

/// Futures option implied volatility surface job
#[derive(Parser)]
#[command(name = "fop-surface")]
#[command(version)]
#[command(about = "Builds a futures option implied vol matrix and syncs it into the surface store")]
struct Cli {
    /// Verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Override the mandate id
    #[arg(short, long, global = true)]
    mandate: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the option chain, build the matrix and replace the stored surface
    Run {
        /// Override the option exchange
        #[arg(long)]
        exchange: Option<String>,

        /// Serve market data from a recorded replay book instead of the bridge
        #[arg(long, conflicts_with = "record")]
        replay: Option<PathBuf>,

        /// Record every market data response to this file
        #[arg(long)]
        record: Option<PathBuf>,

        /// Build and print the matrix without touching the store
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the stored surface for the mandate
    Show {
        #[arg(short, long, value_enum, default_value = "text")]
        format: ShowFormat,
    },

    /// Register the broker contract id of the mandate's underlying
    Register {
        /// Broker contract id
        #[arg(long)]
        contract_id: i64,
    },

    /// Write a default configuration file
    Init {
        #[arg(short, long, default_value = "surface.toml")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ShowFormat {
    Text,
    Json,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Tracing subscriber already installed");
    }
}

fn load_config(cli: &Cli) -> SurfaceResult<SurfaceConfig> {
    let mut config = match &cli.config {
        Some(path) => SurfaceConfig::load(path)?,
        None => SurfaceConfig::default(),
    };

    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(mandate) = &cli.mandate {
        config.mandate_id = mandate.clone();
    }

    Ok(config)
}

fn print_matrix(matrix: &VolMatrix) {
    print!("{:>10}", "strike");
    for e in &matrix.expiries {
        print!("{:>12}", e.format("%Y-%m-%d"));
    }
    println!();

    for (si, strike) in matrix.strikes.iter().enumerate() {
        print!("{:>10.2}", strike);
        for ei in 0..matrix.expiries.len() {
            print!("{:>11.2}%", matrix.vols[[si, ei]] * 100.0);
        }
        println!();
    }
}

fn run_job(
    config: SurfaceConfig,
    replay: Option<&Path>,
    record: Option<&Path>,
    dry_run: bool,
) -> SurfaceResult<()> {
    let mut store = SurfaceStore::open(&config.db_path)?;
    let today = Local::now().date_naive();
    let job = SurfaceJob::new(config);

    let source: Box<dyn MarketDataSource> = match replay {
        Some(path) => Box::new(ReplaySource::from_file(path)?),
        None => {
            let cfg = job.config();
            Box::new(BridgeClient::new(&cfg.host, cfg.port, cfg.client_id)?)
        }
    };

    // The source is released before the store is written
    let build = match record {
        Some(path) => {
            let mut recorder = Recorder::new(source);
            let contract_id = job.contract_id(&store)?;
            let result = job.build(&mut recorder, contract_id, today);
            recorder.into_book().save(path)?;
            result?
        }
        None => {
            let mut source = source;
            let contract_id = job.contract_id(&store)?;
            job.build(&mut source, contract_id, today)?
        }
    };

    info!(
        "Built {} ({} contracts, {} batches, {} missing quotes)",
        build.underlying.descriptor.local_symbol,
        build.contracts_requested,
        build.batches,
        build.missing_quotes
    );

    if dry_run {
        print_matrix(&build.matrix);
        return Ok(());
    }

    let mandate = &job.config().mandate_id;
    let written = store.replace_surface(mandate, &build.matrix, &build.security_ids()?, Utc::now())?;

    println!(
        "{}: {} strikes, {} expirations, {} implied vols written",
        mandate, written.strikes, written.expirations, written.implied_vols
    );
    Ok(())
}

fn show(config: &SurfaceConfig, format: ShowFormat) -> SurfaceResult<()> {
    let store = SurfaceStore::open(&config.db_path)?;

    let Some(stored) = store.load_surface(&config.mandate_id)? else {
        println!("No surface stored for {}", config.mandate_id);
        return Ok(());
    };

    match format {
        ShowFormat::Json => println!("{}", serde_json::to_string_pretty(&stored)?),
        ShowFormat::Text => {
            println!("{} (updated {})", stored.mandate_id, stored.updated_at);
            print_matrix(&stored.matrix);
        }
    }
    Ok(())
}

fn execute(cli: Cli) -> SurfaceResult<()> {
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Run { exchange, replay, record, dry_run } => {
            if let Some(exchange) = exchange {
                config.option_exchange = exchange;
            }
            config.validate()?;
            run_job(config, replay.as_deref(), record.as_deref(), dry_run)
        }
        Commands::Show { format } => show(&config, format),
        Commands::Register { contract_id } => {
            let store = SurfaceStore::open(&config.db_path)?;
            store.register_security(&config.mandate_id, contract_id)?;
            println!("Registered {} -> {}", config.mandate_id, contract_id);
            Ok(())
        }
        Commands::Init { output } => {
            config.save(&output)?;
            println!("Configuration written to {}", output.display());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
