use booklite::catalog::{CatalogEntry, Response, catalog, find_entry};
use booklite::config::AppConfig;
use booklite::errors::DbError;
use booklite::query::ExplainVerbosity;
use booklite::{Database, logger};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "booklite", version, about = "Run the books query catalog against an in-memory store", long_about = None)]
struct Cli {
    #[arg(long, global = true, help = "Path to a config file (TOML). Falls back to $BOOKLITE_CONFIG, then ./booklite.toml.")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Load books from this JSON or NDJSON file instead of the built-in sample")]
    seed: Option<PathBuf>,
    #[arg(long, global = true, value_name = "COUNT", help = "Append COUNT generated books")]
    random: Option<usize>,
    #[arg(long, global = true, value_name = "SEED", help = "Seed for generated books")]
    random_seed: Option<u64>,
    #[arg(long, global = true, help = "error|warn|info|debug|trace")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "List catalog entries")]
    List,
    #[command(about = "Print an entry as a shell call and as a command document")]
    Show {
        #[arg(help = "Entry name, e.g. books-by-genre")]
        name: String,
    },
    #[command(about = "Run one entry and print its result")]
    Run {
        name: String,
        #[arg(long, help = "Explain verbosity for explain entries: queryPlanner|executionStats|allPlansExecution")]
        verbosity: Option<String>,
    },
    #[command(name = "run-all", about = "Run every entry in listing order against one database")]
    RunAll,
}

fn settings(cli: &Cli) -> Result<AppConfig, DbError> {
    let mut cfg = AppConfig::load(cli.config.as_deref())?;
    // command-line flags win over every other layer
    if let Some(p) = &cli.seed {
        cfg.seed_file = Some(p.clone());
    }
    if let Some(n) = cli.random {
        cfg.random_count = Some(n);
    }
    if let Some(s) = cli.random_seed {
        cfg.random_seed = Some(s);
    }
    if let Some(l) = &cli.log_level {
        cfg.log_level = Some(l.clone());
    }
    cfg.validate()?;
    Ok(cfg)
}

fn print_json(value: &impl serde::Serialize) -> Result<(), DbError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_response(response: &Response) -> Result<(), DbError> {
    match response {
        Response::Documents(docs) => {
            for d in docs {
                println!("{}", serde_json::to_string(d)?);
            }
            println!("({} documents)", docs.len());
        }
        Response::Updated(r) => print_json(r)?,
        Response::Deleted(r) => print_json(r)?,
        Response::IndexCreated { name, created } => {
            println!("{name}{}", if *created { "" } else { " (already exists)" });
        }
        Response::Explain(plan) => print_json(plan)?,
    }
    Ok(())
}

fn with_verbosity(mut entry: CatalogEntry, verbosity: ExplainVerbosity) -> CatalogEntry {
    use booklite::catalog::{Operation, Request};
    if let Operation::Explain { filter, options, .. } = entry.request.operation().clone() {
        let op = Operation::Explain { filter, options, verbosity };
        entry.request = Request::new(entry.request.collection().to_string(), op);
    }
    entry
}

fn run(cli: &Cli) -> Result<(), DbError> {
    let cfg = settings(cli)?;
    logger::init_from_config(&cfg)?;
    match &cli.command {
        Commands::List => {
            for e in catalog()? {
                println!("{:<22} {:<12} {}", e.name, e.request.kind().as_str(), e.description);
            }
        }
        Commands::Show { name } => {
            let e = find_entry(name)?;
            println!("{}", e.description);
            println!("{}", e.request.to_shell()?);
            print_json(&e.request.to_command())?;
        }
        Commands::Run { name, verbosity } => {
            let db = Database::from_config(&cfg)?;
            let mut entry = find_entry(name)?;
            let verbosity: ExplainVerbosity = match verbosity {
                Some(v) => v.parse()?,
                None => cfg.explain_verbosity()?,
            };
            entry = with_verbosity(entry, verbosity);
            println!("{}", entry.request.to_shell()?);
            print_response(&db.run(&entry.request)?)?;
        }
        Commands::RunAll => {
            let db = Database::from_config(&cfg)?;
            let verbosity = cfg.explain_verbosity()?;
            for entry in catalog()? {
                let entry = with_verbosity(entry, verbosity);
                println!("== {} ==", entry.name);
                println!("{}", entry.request.to_shell()?);
                print_response(&db.run(&entry.request)?)?;
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
