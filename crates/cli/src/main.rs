mod commands;
mod config;
mod logging;

use anyhow::{bail, Context as _, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use console::style;
use kvmigrate::{ApplyParams, Target};
use std::path::PathBuf;

use commands::*;
use config::Overrides;
use logging::LoggingConfig;

#[derive(Parser)]
#[command(name = "migrate")]
#[command(version)]
#[command(about = "Apply, revert and inspect versioned migrations of a key-value table")]
#[command(after_help = "Any other token is a migration target: a version such as 1.2.3 \
moves up or down to it, a name runs that named migration, and `latest` resets.")]
struct Cli {
    #[command(flatten)]
    options: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalOptions {
    /// Change to this directory before doing anything
    #[arg(long, short = 'd', global = true)]
    dir: Option<PathBuf>,

    /// Configuration file (default: migrate.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Configuration profile (dev, stage, prod, ...)
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Forward operations to a remote endpoint
    #[arg(long, short = 'e', global = true)]
    endpoint: Option<String>,

    /// Resolve and run units without persistent changes
    #[arg(long, global = true)]
    dry: bool,

    /// Skip the confirmation prompt
    #[arg(long, short = 'f', global = true)]
    force: bool,

    /// Re-run trailing failed migrations before moving up
    #[arg(long, global = true)]
    retry_failed: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current version
    Status,

    /// List applied migrations
    List,

    /// List migrations yet to be applied
    Outstanding,

    /// List named migrations available for ad-hoc runs
    Named,

    /// Generate a migration stub for the next version
    Generate {
        /// Version digit to bump (major, minor, patch)
        #[arg(long, short = 'b', default_value = "patch")]
        bump: String,

        /// Description written into the stub
        #[arg(long)]
        description: Option<String>,
    },

    /// Apply the next outstanding migration
    Up,

    /// Revert the last applied migration
    Down,

    /// Reset the table through the reset migration
    Reset,

    /// Re-run the last applied migration
    Repeat,

    /// Apply all outstanding migrations
    All,

    /// Serve the remote invocation endpoint
    Serve {
        /// Host to bind the server to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind the server to
        #[arg(long, short, default_value = "3000")]
        port: u16,
    },

    #[command(external_subcommand)]
    Target(Vec<String>),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("{} {:#}", style("error:").red().bold(), err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let options = cli.options;
    logging::init_logging(LoggingConfig::from_verbosity(options.verbose).with_json(options.log_json))?;

    if let Some(dir) = &options.dir {
        std::env::set_current_dir(dir)
            .with_context(|| format!("Cannot change to directory {}", dir.display()))?;
    }

    let settings = config::load(&Overrides {
        config_path: options.config.clone(),
        profile: options.profile.clone(),
        endpoint: options.endpoint.clone(),
    })?;

    let mut params = ApplyParams::new();
    params.dry = options.dry;
    params.retry_failed = options.retry_failed;

    let ctx = Context::new(settings, params, options.force)?;

    // generate may run before the migrations directory exists
    if !matches!(cli.command, Commands::Generate { .. }) {
        ctx.engine.init().await?;
    }

    match cli.command {
        Commands::Status => inspect::status(&ctx).await?,
        Commands::List => inspect::list(&ctx).await?,
        Commands::Outstanding => inspect::outstanding(&ctx).await?,
        Commands::Named => inspect::named(&ctx).await?,
        Commands::Generate { bump, description } => {
            generate::run(&ctx, &bump, description.as_deref()).await?
        }
        Commands::Up => apply::run(&ctx, Target::Up).await?,
        Commands::Down => apply::run(&ctx, Target::Down).await?,
        Commands::Reset => apply::run(&ctx, Target::Reset).await?,
        Commands::Repeat => apply::run(&ctx, Target::Repeat).await?,
        Commands::All => apply::run(&ctx, Target::All).await?,
        Commands::Serve { host, port } => serve::run(&ctx, &host, port).await?,
        Commands::Target(args) => {
            let [token] = args.as_slice() else {
                bail!("Expected a single migration target, got: {}", args.join(" "));
            };
            apply::run(&ctx, token.parse()?).await?
        }
    }

    Ok(())
}
