pub mod history;
pub mod import;
pub mod schema;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use datamapper_core::SourceFormat;

#[derive(Parser)]
#[command(
    name = "dmap",
    about = "Map XML and JSON documents onto a schema and store the records",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import a document into the database
    Import {
        /// Document to import
        file: PathBuf,
        /// Schema definition (JSON); the built-in RSS schema by default
        #[arg(long)]
        schema: Option<PathBuf>,
        /// SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
        /// Input format (xml or json); guessed from the extension by default
        #[arg(long)]
        format: Option<SourceFormat>,
        /// Tag for the top-level JSON value, matched against entity names
        #[arg(long)]
        root_tag: Option<String>,
        /// Resolve ambiguous names to the first candidate instead of failing
        #[arg(long)]
        first_match: bool,
        /// Map the document without writing to the database
        #[arg(long)]
        dry_run: bool,
        /// Print the import report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Show the entities and fields of a schema
    Schema {
        /// Schema definition (JSON); the built-in RSS schema by default
        #[arg(long)]
        schema: Option<PathBuf>,
    },
    /// List past imports
    History {
        /// SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
        /// Schema definition (JSON); the built-in RSS schema by default
        #[arg(long)]
        schema: Option<PathBuf>,
    },
}
