//! prom-light server entry point.

use clap::Parser;
use prom_light::cli::{self, ServerCli};
use prom_light::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ServerCli::parse();
    cli::execute_server(cli).await
}
