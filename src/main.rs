use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use symgraph::cli;
use symgraph::config::{Config, LoggingConfig};

#[derive(Parser)]
#[command(name = "symgraph")]
#[command(author = "Intent Project Team")]
#[command(version)]
#[command(about = "Incremental symbol index and cross-reference graph for multi-language codebases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a project, re-extracting only files that changed
    Index {
        /// Project directory to index
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Ignore stored file hashes and re-extract everything
        #[arg(short, long)]
        rebuild: bool,

        /// Keep running and re-index on file changes
        #[arg(short, long)]
        watch: bool,
    },

    /// Show what transitively depends on a symbol
    Impact {
        /// Symbol id or qualified name
        symbol: String,

        /// Maximum number of hops (defaults to graph.impact_depth)
        #[arg(long)]
        depth: Option<usize>,

        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Show dependencies and dependents of a symbol
    Deps {
        /// Symbol id or qualified name
        symbol: String,

        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Show index statistics
    Stats {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// List supported languages
    Languages,
}

impl Commands {
    fn project(&self) -> &str {
        match self {
            Commands::Index { project, .. }
            | Commands::Impact { project, .. }
            | Commands::Deps { project, .. }
            | Commands::Stats { project } => project.as_str(),
            Commands::Languages => ".",
        }
    }
}

/// Flags win over the configured level; `RUST_LOG` is not consulted
fn init_logging(debug: bool, verbose: bool, logging: &LoggingConfig) {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        logging.level.as_str()
    };
    let filter = EnvFilter::new(format!("warn,symgraph={}", level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.format == "compact" {
        builder.compact().init();
    } else {
        builder.pretty().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_project_dir(cli.command.project())?;
    init_logging(cli.debug, cli.verbose, &config.logging);
    debug!("symgraph v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Index {
            project,
            rebuild,
            watch,
        } => {
            cli::index::index_project(&project, config, rebuild, watch).await?;
        }

        Commands::Impact {
            symbol,
            depth,
            project,
        } => {
            let depth = depth.unwrap_or(config.graph.impact_depth);
            cli::impact::show_impact(&project, &config, &symbol, depth)?;
        }

        Commands::Deps { symbol, project } => {
            cli::deps::show_deps(&project, &config, &symbol)?;
        }

        Commands::Stats { project } => {
            cli::stats::show_stats(&project, &config)?;
        }

        Commands::Languages => {
            cli::languages::list_languages(&config);
        }
    }

    Ok(())
}
