//! shmheap CLI - create, inspect and edit shared heaps from the shell.

mod commands;
mod observability;

use anyhow::Result;
use clap::{Parser, Subcommand};
use observability::{TracingConfig, init_tracing};
use std::path::PathBuf;

/// shmheap - Typed persistent heaps in named shared memory.
#[derive(Parser)]
#[command(name = "shmheap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory holding region files (defaults to SHMHEAP_DIR or /dev/shm)
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new heap
    Create {
        /// Region name
        name: String,

        /// Static space in bytes, header words included
        #[arg(long, default_value = "64")]
        static_size: u64,

        /// Initial heap size in bytes
        #[arg(long, default_value = "65536")]
        heap_size: u64,
    },

    /// Show header words and block statistics
    Info {
        /// Region name
        name: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the block layout
    Layout {
        /// Region name
        name: String,

        /// Dump header, every block and the free list
        #[arg(short = 'D', long)]
        detailed: bool,
    },

    /// Print the value at a path
    Get {
        /// Region name
        name: String,

        /// Dotted path such as `users.0.name` (empty for the root)
        #[arg(default_value = "")]
        path: String,

        /// Print as JSON instead of the debug rendering
        #[arg(long)]
        json: bool,

        /// Elements shown per collection in the debug rendering
        #[arg(short, long, default_value = "16")]
        max_elements: usize,
    },

    /// Store a JSON value at a path
    Set {
        /// Region name
        name: String,

        /// Dotted path (empty for the root)
        path: String,

        /// JSON text of the value
        value: String,
    },

    /// Delete the value at a path
    Delete {
        /// Region name
        name: String,

        /// Dotted path (empty for the root)
        path: String,
    },

    /// Export the value at a path in stream format
    Export {
        /// Region name
        name: String,

        /// Dotted path (empty for the root)
        #[arg(default_value = "")]
        path: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a value in stream format and store it at a path
    Import {
        /// Region name
        name: String,

        /// Dotted path (empty for the root)
        #[arg(default_value = "")]
        path: String,

        /// Input file (stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Remove a heap
    Destroy {
        /// Region name
        name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&TracingConfig::from_env(cli.verbose))?;

    let config = commands::heap_config(cli.dir);
    match cli.command {
        Commands::Create {
            name,
            static_size,
            heap_size,
        } => commands::create::run(&config, &name, static_size, heap_size),
        Commands::Info { name, json } => commands::inspect::info(&config, &name, json),
        Commands::Layout { name, detailed } => commands::inspect::layout(&config, &name, detailed),
        Commands::Get {
            name,
            path,
            json,
            max_elements,
        } => commands::value::get(&config, &name, &path, json, max_elements),
        Commands::Set { name, path, value } => commands::value::set(&config, &name, &path, &value),
        Commands::Delete { name, path } => commands::value::delete(&config, &name, &path),
        Commands::Export { name, path, output } => {
            commands::transfer::export(&config, &name, &path, output.as_deref())
        }
        Commands::Import { name, path, input } => {
            commands::transfer::import(&config, &name, &path, input.as_deref())
        }
        Commands::Destroy { name } => commands::create::destroy(&config, &name),
    }
}
