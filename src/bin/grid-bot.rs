// Grid Profit Engine - CLI
// Single entry point: workspace setup, the engine loop, state inspection and book maintenance

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use grid_profit_engine::{Config, ConfigError};

// Load command modules from cli directory
#[path = "../cli/maintenance_commands.rs"]
mod maintenance_commands;
#[path = "../cli/run_commands.rs"]
mod run_commands;
#[path = "../cli/state_commands.rs"]
mod state_commands;

#[derive(Parser)]
#[command(name = "grid-bot")]
#[command(version)]
#[command(about = "Grid trading profit engine: paired sells, FIFO profit and profit splitting", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and create the data directory
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Run the engine loop
    Run {
        /// Run a single iteration and exit
        #[arg(long)]
        once: bool,

        /// Do not place the start-up buy ladder
        #[arg(long)]
        no_bootstrap: bool,
    },

    /// Print the grid ladder for the active bounds
    Levels {
        /// Only show the N buy levels nearest below this price
        #[arg(long)]
        below: Option<Decimal>,

        #[arg(short, long, default_value = "10")]
        count: usize,
    },

    /// Print every state file
    Status,

    /// Profit split pool management
    #[command(subcommand)]
    Split(SplitCommands),

    /// Cancel every open order, then preview or place a new buy/sell grid
    Regrid {
        /// Lower bound (defaults to the active bounds)
        #[arg(long)]
        low: Option<Decimal>,

        /// Upper bound (defaults to the active bounds)
        #[arg(long)]
        high: Option<Decimal>,

        /// Step between levels in percent
        #[arg(long)]
        step: Option<Decimal>,

        /// USD per order
        #[arg(long)]
        base: Option<Decimal>,

        /// Only cancel the open orders
        #[arg(long)]
        cancel_only: bool,

        /// Place the new grid instead of previewing it
        #[arg(long)]
        apply: bool,
    },

    /// Ladder sells above the market from free base inventory
    SeedSells {
        #[arg(long, default_value = "8")]
        levels: usize,

        #[arg(long, default_value = "1.0")]
        step_pct: Decimal,

        /// Base amount per sell
        #[arg(long, default_value = "30")]
        lot: Decimal,

        /// Print the ladder without placing it
        #[arg(long)]
        dry_run: bool,

        /// Cancel open SEED sells instead of placing new ones
        #[arg(long)]
        cancel_seed: bool,
    },
}

#[derive(Subcommand)]
enum SplitCommands {
    /// Show the split pools
    Status,

    /// Withdraw up to USD from the reinvestment pool
    Pull {
        usd: Decimal,
    },
}

fn init_logging(verbose: bool, config: Option<&Config>) {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.map(|c| c.logging.level.clone()).unwrap_or_else(|| "info".to_string())
    };
    let with_target = config.map(|c| c.logging.with_target).unwrap_or(false);

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(with_target)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Config is read before logging so its level applies; errors are reported after
    let loaded = load_config(&cli.config);
    init_logging(cli.verbose, loaded.as_ref().ok());

    info!("🚀 Grid Profit Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("📁 Config: {}", cli.config);

    match cli.command {
        // Init doesn't require config (it creates it)
        Commands::Init { force } => {
            init_workspace(&cli.config, force)?;
        }
        Commands::Run { once, no_bootstrap } => {
            let config = config_or_exit(loaded);
            run_commands::run_engine(config, once, no_bootstrap).await?;
        }
        Commands::Levels { below, count } => {
            let config = config_or_exit(loaded);
            state_commands::show_levels(&config, below, count)?;
        }
        Commands::Status => {
            let config = config_or_exit(loaded);
            state_commands::show_status(&config)?;
        }
        Commands::Split(cmd) => {
            let config = config_or_exit(loaded);
            match cmd {
                SplitCommands::Status => state_commands::split_status(&config)?,
                SplitCommands::Pull { usd } => state_commands::split_pull(&config, usd)?,
            }
        }
        Commands::Regrid {
            low,
            high,
            step,
            base,
            cancel_only,
            apply,
        } => {
            let config = config_or_exit(loaded);
            let args = maintenance_commands::RegridArgs {
                low,
                high,
                step_pct: step,
                order_usd: base,
                cancel_only,
                apply,
            };
            maintenance_commands::regrid(&config, args).await?;
        }
        Commands::SeedSells {
            levels,
            step_pct,
            lot,
            dry_run,
            cancel_seed,
        } => {
            let config = config_or_exit(loaded);
            let args = maintenance_commands::SeedSellArgs {
                levels,
                step_pct,
                lot,
                dry_run,
                cancel_seed,
            };
            maintenance_commands::seed_sells(&config, args).await?;
        }
    }

    Ok(())
}

fn load_config(path: &str) -> Result<Config, ConfigError> {
    let mut config = Config::from_file(path)?;
    config.apply_env_overrides()?;
    Ok(config)
}

/// Unwrap the loaded config or exit with a helpful error message
fn config_or_exit(loaded: Result<Config, ConfigError>) -> Config {
    match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Configuration Error");
            error!("{}", e);
            if matches!(e, ConfigError::FileRead(_)) {
                error!("");
                error!("💡 Quick fix:");
                error!("   1. Run: grid-bot init");
                error!("   2. Edit config.toml (grid bounds, order sizes, split ratio)");
                error!("   3. Try again");
            }
            std::process::exit(1);
        }
    }
}

fn init_workspace(config_path: &str, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!("🔧 Initializing workspace...");

    let config = Config::default();
    if std::path::Path::new(config_path).exists() && !force {
        info!("⚠️  {} already exists, skipping (use --force to overwrite)", config_path);
    } else {
        config.to_file(config_path)?;
        info!("📝 Created {}", config_path);
    }

    std::fs::create_dir_all(&config.state.data_dir)?;
    info!("💾 State directory: {}", config.state.data_dir.display());

    info!("✅ Workspace initialized successfully!");
    info!("💡 Next steps:");
    info!("   1. Review the [grid] and [split] sections of {}", config_path);
    info!("   2. Run: grid-bot levels");
    info!("   3. Run: grid-bot run --once");
    Ok(())
}
