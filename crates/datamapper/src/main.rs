use anyhow::Result;
use clap::Parser;

use datamapper::cli::import::ImportOptions;
use datamapper::cli::{Cli, Commands};
use datamapper::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    dispatch(cli.command).await
}

async fn dispatch(command: Commands) -> Result<()> {
    let env = Config::from_env();

    match command {
        Commands::Import {
            file,
            schema,
            db,
            format,
            root_tag,
            first_match,
            dry_run,
            json,
        } => {
            let config = env.with_overrides(db.as_deref(), schema.as_deref());
            let options = ImportOptions {
                format,
                root_tag,
                first_match,
                dry_run,
                json,
            };
            datamapper::cli::import::run(&config, &file, &options).await
        }
        Commands::Schema { schema } => {
            datamapper::cli::schema::run(&env.with_overrides(None, schema.as_deref()))
        }
        Commands::History { db, schema } => {
            let config = env.with_overrides(db.as_deref(), schema.as_deref());
            datamapper::cli::history::run(&config).await
        }
    }
}
