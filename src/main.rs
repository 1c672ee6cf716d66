// src/main.rs — koi-learn entry point

use clap::Parser;

use koi_learn::cli::{self, Cli, Commands};
use koi_learn::infra::config::Config;
use koi_learn::infra::logger;

fn main() {
    // Initialize logging (respects RUST_LOG)
    logger::init_logging("warn");

    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config (falls back to defaults if no config.toml)
    let loaded = match cli.config {
        Some(ref path) => Config::load_from(std::path::Path::new(path)),
        None => Config::load(),
    };
    let db_path = cli::resolve_db_path(cli.db.as_deref());

    // The hook must always answer the host, even with a broken config
    if let Commands::Hook = cli.command {
        let config = loaded.unwrap_or_else(|e| {
            tracing::warn!("using default config: {e}");
            Config::default()
        });
        return cli::hook::run_hook(&db_path, &config);
    }

    let config = loaded?;
    let memory = cli::open_memory(&db_path)?;
    match cli.command {
        Commands::Hook => Ok(()),
        Commands::Learn {
            days,
            session,
            json,
        } => cli::learn::run_learn(&memory, &config, days, session.as_deref(), json),
        Commands::Thresholds { reset, reset_all } => {
            cli::status::show_thresholds(&memory, &config, reset.as_deref(), reset_all)
        }
        Commands::Patterns { limit } => cli::status::show_patterns(&memory, limit),
        Commands::Predict { session } => cli::status::show_prediction(&memory, &config, &session),
        Commands::Status => cli::status::show_status(&db_path, &memory),
    }
}
