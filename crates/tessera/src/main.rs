//! Tessera CLI - Main entry point

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(version)]
#[command(about = "Tessera template compiler", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file (defaults to ./tessera.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Template search path; repeat to add more (first match wins)
    #[arg(short = 'I', long = "search-path", global = true)]
    pub search_paths: Vec<PathBuf>,

    /// Directory for compiled templates
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Check template modification times on every request
    #[arg(long, global = true)]
    pub debug: bool,

    /// Show debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template to stdout or a file
    Render {
        /// Template name (resolved against the search paths)
        name: String,

        /// JSON file with the template data
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Write output to FILE instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compile a template and print the artifact path
    Compile {
        /// Template name (resolved against the search paths)
        name: String,

        /// Print the compiled program instead of its path
        #[arg(long)]
        print: bool,
    },

    /// Print the token stream of a template file as JSON
    Tokens {
        /// Template file
        file: PathBuf,

        /// Print the flat marker sequence instead of the nested tree
        #[arg(long)]
        flat: bool,
    },

    /// Remove all compiled templates from the cache directory
    Clear,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.global.verbose {
        "tessera=debug"
    } else {
        "tessera=info"
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Render { name, data, output } => {
            commands::render::execute(&cli.global, &name, data.as_deref(), output.as_deref())
        }
        Commands::Compile { name, print } => commands::compile::execute(&cli.global, &name, print),
        Commands::Tokens { file, flat } => commands::tokens::execute(&file, flat),
        Commands::Clear => commands::clear::execute(&cli.global),
    }
}
