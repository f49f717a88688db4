mod cli;
mod config;
mod downloader;
mod errors;
mod utils;

use clap::Parser;
use cli::Cli;
use errors::Result;
use utils::logger::Logger;

#[tokio::main]
async fn main() -> Result<()> {
    Logger::init()?;

    let cli = Cli::parse();
    cli.execute().await
}
