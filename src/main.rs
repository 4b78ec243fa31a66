use anyhow::Result;
use clap::Parser;
use live_pager::{logging, Cli, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::try_from(Cli::parse())?;
    logging::init(&config.log)?;
    live_pager::run(config).await
}
