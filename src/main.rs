use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlx::PgPool;

mod coerce;
mod commands;
mod config;
mod model;
mod protocol;
mod registry;

#[derive(Debug, Parser)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Serve { port: Option<u16> },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let cli = Cli::parse();

    let path = match cli.config.as_deref() {
        Some(x) => x,
        None => Path::new("config.toml"),
    };
    let config = config::load(path)?;

    let pool = PgPool::connect(&config.database_url).await?;
    sqlx::migrate!().run(&pool).await?;

    match cli.command {
        Command::Serve { port } => {
            let registry = Arc::new(registry::PgDeviceRegistry::new(pool.clone()));
            let queue = Arc::new(commands::PgCommandQueue::new(pool.clone()));
            let decoder = web::Data::new(protocol::osmand::OsmAndDecoder::new(registry, queue));
            HttpServer::new(move || {
                App::new()
                    .wrap(Logger::default())
                    .app_data(decoder.clone())
                    .service(protocol::service)
            })
            .bind(("0.0.0.0", port.unwrap_or(config.http_port)))?
            .run()
            .await?;
        }
    };

    Ok(())
}
